pub mod conversation;
pub mod message;

pub use conversation::{ConversationSummary, DisplayInfo, LastMessage, Members, Position};
pub use message::{
    DeleteMode, DeleteOutcome, Disposition, MediaRef, Message, MessageKind, MessageStatus,
    NewMessage, SystemMeta,
};
