//! Newtype identifiers for conversations and usage events.

use pipeline::string_id;
use uuid::Uuid;

string_id! {
    /// Identifies a conversation across `prompt` / `continue_prompt` round trips.
    ///
    /// Backends may supply their own ids (e.g. a vendor thread id); locally
    /// created conversations use a random UUID.
    ConversationId
}

string_id! {
    /// Correlates the start and end events of one tracked call.
    UsageEventId
}

impl ConversationId {
    /// Generates a new random conversation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl UsageEventId {
    /// Generates a new random event identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
