/// Caption and text message rendering
pub mod caption;
/// Delivery routing with per-category fallbacks
pub mod router;
/// Messaging sink trait and errors
pub mod sink;
/// Teloxide-backed sink
pub mod telegram;

pub use router::DeliveryRouter;
pub use sink::{MessagingSink, SendMethod, SinkError};
pub use telegram::TelegramSink;
