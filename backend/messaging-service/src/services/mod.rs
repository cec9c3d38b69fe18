pub mod messaging_service;

pub use messaging_service::{
    BlockState, ConversationEntry, ConversationPage, HistoryEntry, HistoryPage, MessagingService,
    PageRequest, Pagination, SendMessageRequest, SendReceipt, UnreadSummary,
};
