pub mod action;
pub mod chat;
pub mod turn;

pub use action::{Action, ContextPolicy, IndexName};
pub use chat::{ChatRequest, ChatRequestError, ChatResponse, MessageResponse, StreamLine};
pub use turn::{SessionLog, Turn};
