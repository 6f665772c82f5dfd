use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use ferry_core::output::OutputSink;
use ferry_core::types::{ConversationId, SessionId};

use crate::context::TurnContext;

/// One user request and everything the agent did for it.
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub context: TurnContext,
}

impl Conversation {
    pub fn new(user_message: impl Into<String>, sink: Arc<dyn OutputSink>, incomplete_prompt: &str) -> Self {
        let id = ConversationId::new();
        Self {
            context: TurnContext::new(id.clone(), user_message, sink, incomplete_prompt),
            id,
            created_at: Utc::now(),
        }
    }

    /// Mark the paused turn as acknowledged so the next run resumes tool
    /// execution.
    pub fn acknowledge(&mut self) {
        self.context.is_continue = true;
    }

    pub fn is_paused(&self) -> bool {
        self.context.paused
    }
}

pub type SharedConversation = Arc<tokio::sync::Mutex<Conversation>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Conversations {
    by_id: HashMap<ConversationId, SharedConversation>,
    latest: Option<ConversationId>,
}

/// A client connection's state: the conversations it has started.
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    conversations: Mutex<Conversations>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            conversations: Mutex::new(Conversations::default()),
        }
    }

    /// Start a conversation; it becomes the latest one.
    ///
    /// Older conversations that are idle and not waiting for acknowledgement
    /// are dropped. A conversation whose turn is still running (its lock is
    /// held) is kept.
    pub fn new_conversation(
        &self,
        user_message: impl Into<String>,
        sink: Arc<dyn OutputSink>,
        incomplete_prompt: &str,
    ) -> SharedConversation {
        let conversation = Conversation::new(user_message, sink, incomplete_prompt);
        let id = conversation.id.clone();
        let shared = Arc::new(tokio::sync::Mutex::new(conversation));

        let mut conversations = lock(&self.conversations);
        let before = conversations.by_id.len();
        conversations.by_id.retain(|_, existing| match existing.try_lock() {
            Ok(conversation) => conversation.is_paused(),
            Err(_) => true,
        });
        let pruned = before - conversations.by_id.len();
        if pruned > 0 {
            debug!(session = %self.id, pruned, "Dropped finished conversations");
        }
        conversations.by_id.insert(id.clone(), shared.clone());
        debug!(session = %self.id, conversation = %id, "Conversation created");
        conversations.latest = Some(id);
        shared
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<SharedConversation> {
        lock(&self.conversations).by_id.get(id).cloned()
    }

    /// The most recently started conversation still held by the session.
    pub fn latest_conversation(&self) -> Option<SharedConversation> {
        let conversations = lock(&self.conversations);
        let id = conversations.latest.as_ref()?;
        conversations.by_id.get(id).cloned()
    }

    pub fn remove_conversation(&self, id: &ConversationId) -> bool {
        let mut conversations = lock(&self.conversations);
        if conversations.latest.as_ref() == Some(id) {
            conversations.latest = None;
        }
        conversations.by_id.remove(id).is_some()
    }

    pub fn conversation_count(&self) -> usize {
        lock(&self.conversations).by_id.len()
    }
}

/// Registry of live sessions.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        lock(&self.sessions).insert(session.id.clone(), session.clone());
        debug!(session = %session.id, "Session created");
        session
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        lock(&self.sessions).get(id).cloned()
    }

    pub fn delete_session(&self, id: &SessionId) -> bool {
        let removed = lock(&self.sessions).remove(id).is_some();
        if removed {
            debug!(session = %id, "Session deleted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::output::NullSink;

    #[test]
    fn test_session_lifecycle() {
        let manager = SessionManager::new();
        let session = manager.new_session();
        assert_eq!(manager.len(), 1);
        assert!(manager.get_session(&session.id).is_some());

        assert!(manager.delete_session(&session.id));
        assert!(!manager.delete_session(&session.id));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_latest_conversation_tracks_newest() {
        let manager = SessionManager::new();
        let session = manager.new_session();
        let first = session.new_conversation("one", Arc::new(NullSink), "more");
        let second = session.new_conversation("two", Arc::new(NullSink), "more");

        let latest = session.latest_conversation().unwrap();
        assert!(Arc::ptr_eq(&latest, &second));

        // The first turn never ran, so it is idle and unpaused.
        let first_id = first.lock().await.id.clone();
        assert!(session.conversation(&first_id).is_none());
        assert_eq!(session.conversation_count(), 1);

        let second_id = second.lock().await.id.clone();
        assert!(session.remove_conversation(&second_id));
        assert!(session.latest_conversation().is_none());
    }

    #[tokio::test]
    async fn test_superseded_conversations_are_pruned_unless_paused_or_running() {
        let session = SessionManager::new().new_session();
        let paused = session.new_conversation("drop tmp", Arc::new(NullSink), "more");
        paused.lock().await.context.paused = true;
        let running = session.new_conversation("count rows", Arc::new(NullSink), "more");
        let guard = running.lock().await;

        for i in 0..5 {
            session.new_conversation(format!("q{}", i), Arc::new(NullSink), "more");
        }
        // paused + running + the latest one
        assert_eq!(session.conversation_count(), 3);
        assert!(session.conversation(&guard.id).is_some());
        assert!(session.conversation(&paused.lock().await.id).is_some());

        drop(guard);
        session.new_conversation("last", Arc::new(NullSink), "more");
        assert_eq!(session.conversation_count(), 2);
    }

    #[test]
    fn test_acknowledge_sets_continue() {
        let mut conv = Conversation::new("q", Arc::new(NullSink), "more");
        assert!(!conv.context.is_continue);
        conv.acknowledge();
        assert!(conv.context.is_continue);
    }
}
