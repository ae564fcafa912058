use std::cmp::Ordering;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;

use crate::config::ConversationSettings;
use crate::id::conversation_id;
use crate::profiles::ProfileCard;
use crate::types::Conversation;

const FALLBACK_TIME_FORMAT: &str = "%H:%M";

/// One friend in the viewer's friends list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendSummary {
    pub counterpart: ProfileCard,
    pub conversation_id: String,
    pub last_message_text: String,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Local time of the last message, empty when there is none.
    pub time_label: String,
    pub unread: bool,
}

/// The friends list plus the incoming request badge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FriendsOverview {
    pub friends: Vec<FriendSummary>,
    pub pending_requests: usize,
}

/// Turns a friend card and their conversation document into a summary row.
#[derive(Debug, Clone)]
pub struct SummaryFormatter {
    placeholder_text: String,
    time_format: String,
    offset: FixedOffset,
    default_avatar_url: String,
}

impl SummaryFormatter {
    pub fn from_settings(settings: &ConversationSettings) -> Self {
        let time_format = if StrftimeItems::new(&settings.time_format).any(|item| matches!(item, Item::Error)) {
            log::warn!(
                "invalid time format '{}', falling back to {FALLBACK_TIME_FORMAT}",
                settings.time_format
            );
            FALLBACK_TIME_FORMAT.to_string()
        } else {
            settings.time_format.clone()
        };
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            log::warn!("utc offset of {} minutes is out of range, using UTC", settings.utc_offset_minutes);
            Utc.fix()
        });
        Self {
            placeholder_text: settings.placeholder_text.clone(),
            time_format,
            offset,
            default_avatar_url: settings.default_avatar_url.clone(),
        }
    }

    pub fn time_label(&self, at: &DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format(&self.time_format).to_string()
    }

    pub fn summarize(&self, viewer_id: &str, mut counterpart: ProfileCard, conversation: Option<&Conversation>) -> FriendSummary {
        if counterpart.avatar_url.is_empty() {
            counterpart.avatar_url = self.default_avatar_url.clone();
        }
        let id = conversation_id(viewer_id, &counterpart.user_id);
        let last_message_at = conversation.and_then(|c| c.last_message_at);
        let last_message_text = conversation
            .and_then(|c| c.last_message_text.clone())
            .unwrap_or_else(|| self.placeholder_text.clone());
        FriendSummary {
            counterpart,
            conversation_id: id,
            last_message_text,
            time_label: last_message_at.as_ref().map(|at| self.time_label(at)).unwrap_or_default(),
            last_message_at,
            unread: conversation.is_some_and(|c| c.unread_by.contains(viewer_id)),
        }
    }
}

/// Most recent conversation first; friends without messages last, by name.
pub fn sort_friends(friends: &mut [FriendSummary]) {
    friends.sort_by(|a, b| {
        let by_time = match (&a.last_message_at, &b.last_message_at) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time
            .then_with(|| a.counterpart.display_name.cmp(&b.counterpart.display_name))
            .then_with(|| a.counterpart.user_id.cmp(&b.counterpart.user_id))
    });
}
