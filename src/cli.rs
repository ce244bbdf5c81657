//! Command-line argument parsing.
//!
//! Mirrors the external interface table: transport selection and server
//! host are required, the rest have defaults matching the original
//! protocol's commonly deployed server configuration.

use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, ValueEnum};

use crate::defaults;
use crate::transport::Binding;

/// Defines the help-message color palette.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Selects which wire binding the client speaks; aliases the `-t` flag's
/// two accepted spellings onto the transport-layer `Binding` enum.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl From<TransportKind> for Binding {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Tcp => Binding::Stream,
            TransportKind::Udp => Binding::Datagram,
        }
    }
}

/// IPK24-CHAT client — connects to a chat server over TCP or UDP.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Transport protocol to use.
    #[arg(short = 't', long = "transport", value_enum)]
    pub transport: TransportKind,

    /// Server host name or IP address.
    #[arg(short = 's', long = "server")]
    pub server: String,

    /// Server port.
    #[arg(short = 'p', long = "port", default_value_t = defaults::PORT)]
    pub port: u16,

    /// Datagram confirmation timeout, in milliseconds. Ignored for TCP.
    #[arg(short = 'd', long = "timeout", default_value_t = defaults::TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Maximum number of datagram retransmissions. Ignored for TCP.
    #[arg(short = 'r', long = "retries", default_value_t = defaults::MAX_RETRIES)]
    pub max_retries: u32,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress the colorized stdout diagnostic layer.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Write detailed logs to this file instead of the default rolling
    /// file, or to "stderr" for plain stderr logging.
    #[arg(long = "log-file")]
    pub log_file: Option<String>,
}

impl Args {
    pub fn binding(&self) -> Binding {
        self.transport.into()
    }
}
