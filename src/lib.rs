//! # IPK24-CHAT client
//!
//! A client for a text-chat protocol offering two wire bindings over one
//! message taxonomy: a line-oriented text binding over TCP, and a
//! length-tagged binary binding over UDP with its own stop-and-wait
//! reliability layer.

pub mod cli;
pub mod codec;
pub mod error;
pub mod fsm;
pub mod input_reader;
pub mod mailbox;
pub mod message;
pub mod reactor;
pub mod signal;
pub mod transport;

pub use cli::Args;
pub use error::ChatError;
pub use fsm::Fsm;
pub use mailbox::Mailbox;
pub use message::Message;
pub use reactor::Reactor;
pub use transport::{Binding, Transport};

/// The current version of the client.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values, matching the CLI flag table.
pub mod defaults {
    /// Default server port.
    pub const PORT: u16 = 4567;

    /// Default datagram confirmation timeout, in milliseconds.
    pub const TIMEOUT_MS: u64 = 250;

    /// Default datagram retry budget.
    pub const MAX_RETRIES: u32 = 3;
}
