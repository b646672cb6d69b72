// Event types for async communication with the UI

use crate::protocol::CompletionMetadata;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The backend accepted the request; carries its status text
    Started(Option<String>),
    /// Generation finished; rendering may still be catching up
    Completed {
        message: Option<String>,
        metadata: Option<CompletionMetadata>,
    },
    /// Generation failed with a user-facing message
    Failed(String),
}
