//! Two-phase local state for interactions that have not reached the store yet.
//!
//! `apply_optimistic` records a pending change and returns the feed with the
//! change already visible. `reconcile` folds in server projections, commit
//! acknowledgements and failures. A committed change is dropped once the
//! server projection shows its effect, and until then it is applied only when
//! the projection does not already reflect it, so counts never double.

use std::collections::BTreeSet;

use crate::counters::LikeOutcome;
use crate::feed::FeedEntry;

/// Handle of one pending local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAction {
    ToggleLike { content_id: String },
    AddComment { content_id: String },
}

impl LocalAction {
    pub fn content_id(&self) -> &str {
        match self {
            LocalAction::ToggleLike { content_id } | LocalAction::AddComment { content_id } => content_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A fresh feed projection from the live subscription.
    Projection(Vec<FeedEntry>),
    LikeCommitted { ticket: Ticket, outcome: LikeOutcome },
    CommentCommitted { ticket: Ticket },
    /// The mutation failed; its local effect is rolled back.
    Failed { ticket: Ticket },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Like { target: bool },
    Comment { expected_total: u64 },
}

#[derive(Debug, Clone)]
struct PendingChange {
    ticket: Ticket,
    content_id: String,
    kind: PendingKind,
    committed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OptimisticFeed {
    server: Vec<FeedEntry>,
    pending: Vec<PendingChange>,
    next_ticket: u64,
}

impl OptimisticFeed {
    pub fn new(server: Vec<FeedEntry>) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }

    /// Number of local changes not yet settled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The server projection with pending local changes applied.
    pub fn view(&self) -> Vec<FeedEntry> {
        self.server.iter().cloned().map(|entry| self.overlay(entry)).collect()
    }

    pub fn apply_optimistic(&mut self, action: LocalAction) -> (Ticket, Vec<FeedEntry>) {
        let displayed = self
            .server
            .iter()
            .find(|entry| entry.id == action.content_id())
            .cloned()
            .map(|entry| self.overlay(entry));
        let kind = match &action {
            LocalAction::ToggleLike { .. } => PendingKind::Like {
                target: !displayed.as_ref().is_some_and(|entry| entry.viewer_has_liked),
            },
            LocalAction::AddComment { .. } => PendingKind::Comment {
                expected_total: displayed.as_ref().map_or(0, |entry| entry.comments) + 1,
            },
        };
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.pending.push(PendingChange {
            ticket,
            content_id: action.content_id().to_string(),
            kind,
            committed: false,
        });
        (ticket, self.view())
    }

    pub fn reconcile(&mut self, event: ServerEvent) -> Vec<FeedEntry> {
        match event {
            ServerEvent::Projection(entries) => self.server = entries,
            ServerEvent::LikeCommitted { ticket, outcome } => {
                if let Some(change) = self.pending.iter_mut().find(|c| c.ticket == ticket) {
                    change.committed = true;
                    change.kind = PendingKind::Like { target: outcome.liked };
                }
            }
            ServerEvent::CommentCommitted { ticket } => {
                if let Some(change) = self.pending.iter_mut().find(|c| c.ticket == ticket) {
                    change.committed = true;
                }
            }
            ServerEvent::Failed { ticket } => {
                log::debug!("rolling back optimistic change {ticket:?}");
                self.pending.retain(|c| c.ticket != ticket);
            }
        }
        self.prune();
        self.view()
    }

    fn overlay(&self, mut entry: FeedEntry) -> FeedEntry {
        for change in self.pending.iter().filter(|c| c.content_id == entry.id) {
            match change.kind {
                PendingKind::Like { target } => {
                    if entry.viewer_has_liked != target {
                        entry.viewer_has_liked = target;
                        entry.likes = if target {
                            entry.likes + 1
                        } else {
                            entry.likes.saturating_sub(1)
                        };
                    }
                }
                PendingKind::Comment { expected_total } => {
                    if entry.comments < expected_total {
                        entry.comments += 1;
                    }
                }
            }
        }
        entry
    }

    /// Drops committed changes whose effect the server projection already shows.
    fn prune(&mut self) {
        let mut settled = BTreeSet::new();
        for (index, change) in self.pending.iter().enumerate() {
            if !change.committed {
                continue;
            }
            let Some(server) = self.server.iter().find(|entry| entry.id == change.content_id) else {
                settled.insert(change.ticket);
                continue;
            };
            let reflected = match change.kind {
                PendingKind::Comment { expected_total } => server.comments >= expected_total,
                PendingKind::Like { .. } => {
                    // The latest like change on the item decides what the server must show.
                    let latest = self.pending[index..]
                        .iter()
                        .rev()
                        .find(|c| c.content_id == change.content_id && matches!(c.kind, PendingKind::Like { .. }));
                    match latest {
                        Some(PendingChange {
                            kind: PendingKind::Like { target },
                            committed: true,
                            ..
                        }) => server.viewer_has_liked == *target,
                        _ => false,
                    }
                }
            };
            if reflected {
                settled.insert(change.ticket);
            }
        }
        self.pending.retain(|c| !settled.contains(&c.ticket));
    }
}
