use crate::domain::ids::conversation_id_for;

/// Maps a (provider account, peer address) pair to the conversation it belongs to.
pub trait ConversationResolver: Send + Sync + std::fmt::Debug {
    /// Returns `None` when the pair belongs to no known conversation.
    fn resolve(&self, account_id: &str, peer_address: &str) -> Option<String>;
}

/// Derives one conversation per account and peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedConversationResolver;

impl ConversationResolver for DerivedConversationResolver {
    fn resolve(&self, account_id: &str, peer_address: &str) -> Option<String> {
        if peer_address.is_empty() {
            return None;
        }
        Some(conversation_id_for(account_id, peer_address))
    }
}
