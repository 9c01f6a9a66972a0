use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::debug;

use farebot_core::{ConversationId, ConversationState};

/// In-memory conversation state, one entry per conversation id.
///
/// The outer map lock is held only for lookup and insertion; per-turn work
/// happens under the per-conversation mutex, so concurrent turns for the
/// same conversation serialize while distinct conversations proceed in
/// parallel.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationState>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the state handle for a conversation, creating it on first use.
    pub fn get_or_create(&self, conversation_id: ConversationId) -> Arc<Mutex<ConversationState>> {
        if let Some(existing) = self
            .conversations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&conversation_id)
        {
            return Arc::clone(existing);
        }

        let mut conversations =
            self.conversations.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(conversations.entry(conversation_id).or_insert_with(|| {
            debug!(%conversation_id, "conversation created");
            Arc::new(Mutex::new(ConversationState::new(conversation_id)))
        }))
    }

    pub fn get(&self, conversation_id: ConversationId) -> Option<Arc<Mutex<ConversationState>>> {
        self.conversations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&conversation_id)
            .map(Arc::clone)
    }

    /// Removes a conversation, waiting out any turn still holding its lock.
    pub async fn end(&self, conversation_id: ConversationId) {
        let handle = self
            .conversations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&conversation_id);

        if let Some(handle) = handle {
            // A turn in flight keeps the state alive through its own Arc;
            // taking the lock here means removal lands after it finishes.
            let _guard = handle.lock().await;
            debug!(%conversation_id, "conversation ended");
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
