pub mod audit;
pub mod buffer;
pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod telegram;
pub mod transport;

pub use audit::ChangeLog;
pub use buffer::NotificationBuffer;
pub use dead_letter::{DeadLetter, DeadLetterStore, JsonFileDeadLetters, MemoryDeadLetters};
pub use dispatcher::{
    DispatchReport, Dispatcher, DispatcherSettings, RetryPassReport, MAX_RATE_LIMIT_WAITS,
};
pub use error::{DeadLetterError, TransportError};
pub use format::{format_event, format_price};
pub use telegram::TelegramTransport;
pub use transport::{ChatTransport, LogTransport, MemoryTransport, OutgoingMessage};
