pub mod chat;
pub mod health;
pub mod metrics;

pub use chat::{chat, reset_campaign};
pub use health::health_check;
pub use metrics::metrics;
