//! Email-scoped assistants: a conversational session and a reply drafter.

pub mod conversation;
pub mod reply;

pub use conversation::{ConversationAgent, ConversationSession};
pub use reply::{ReplyDraft, ReplyDrafter};
