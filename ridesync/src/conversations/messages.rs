use std::sync::Arc;

use serde_json::{Value, json};

use crate::errors::{SyncError, ValidationError};
use crate::id::conversation_id;
use crate::store::{DocRef, DocumentStore, Fields, WritePlan, server_timestamp};
use crate::types::{Conversation, decode};
use crate::validators::{check_identifier, check_text};

pub const MAX_MESSAGE_LEN: usize = 2000;

/// Writes to the conversation summary document shared by two users.
pub struct ConversationLog<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> ConversationLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records `text` as the latest message from `from` to `to`, marking it unread for `to`.
    pub async fn record_message(&self, from: &str, to: &str, text: &str) -> Result<Conversation, SyncError> {
        check_identifier("from", from)?;
        check_identifier("to", to)?;
        if from == to {
            return Err(SyncError::invalid_state("cannot message yourself"));
        }
        let mut issues = Vec::new();
        check_text(&mut issues, "text", text, MAX_MESSAGE_LEN);
        ValidationError::new(issues).into_result()?;

        let id = conversation_id(from, to);
        let reference = DocRef::of::<Conversation>(&id);
        let mut participants = [from, to];
        participants.sort_unstable();

        let mut fields = Fields::new();
        fields.insert("participants".into(), json!(participants));
        fields.insert("last_message_text".into(), json!(text.trim()));
        fields.insert("last_message_at".into(), server_timestamp());
        fields.insert("last_sender_id".into(), json!(from));
        fields.insert("unread_by".into(), json!([to]));

        self.store.set(&reference, fields).await?;
        decode(&self.store.get_or_error(&reference).await?)
    }

    /// Clears the viewer's unread flag on the conversation with `other`.
    ///
    /// Marking a conversation that does not exist yet is a no-op.
    pub async fn mark_read(&self, viewer_id: &str, other_id: &str) -> Result<(), SyncError> {
        let reference = DocRef::of::<Conversation>(conversation_id(viewer_id, other_id));
        self.store
            .run_transaction(std::slice::from_ref(&reference), |reads| {
                let Some(mut conversation) = reads.decode::<Conversation>(&reference)? else {
                    return Ok((WritePlan::new(), ()));
                };
                if !conversation.unread_by.remove(viewer_id) {
                    return Ok((WritePlan::new(), ()));
                }
                let mut fields = Fields::new();
                fields.insert(
                    "unread_by".into(),
                    Value::Array(conversation.unread_by.into_iter().map(Value::String).collect()),
                );
                Ok((WritePlan::new().update(reference.clone(), fields), ()))
            })
            .await
    }
}
