//! Entry point: parses arguments, wires the Transport/Mailbox/Reactor/FSM/
//! Input reader together, and runs the session to completion.
//!
//! ## Architecture
//!
//! Three threads communicate only through the Mailbox's queues and three
//! crossbeam-channel notification pipes:
//! 1. **Main** thread runs the FSM loop until the session reaches End.
//! 2. **Reactor** thread runs the I/O event loop (plus, for the datagram
//!    binding, the stop-and-wait reliability engine).
//! 3. **Input reader** thread blocks on stdin with a 1-second poll.
//!
//! On shutdown the main thread flips both auxiliary threads' atomic stop
//! flags and joins them before the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use ipk_chat_client::cli::Args;
use ipk_chat_client::fsm::Fsm;
use ipk_chat_client::mailbox::Mailbox;
use ipk_chat_client::reactor::Reactor;
use ipk_chat_client::transport::{self, TransportConfig};
use ipk_chat_client::{input_reader, signal};

mod logging;
use logging::ColorizedFormatter;

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("ERR: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let _log_guard = init_logging(&args)?;

    let binding = args.binding();
    let config = TransportConfig {
        host: args.server.clone(),
        port: args.port,
        timeout_ms: args.timeout_ms,
        max_retries: args.max_retries,
    };

    let mut boxed_transport = transport::create(binding, config);
    boxed_transport
        .open()
        .with_context(|| format!("connecting to {}:{}", args.server, args.port))?;

    let (notify_tx, notify_rx) = unbounded();
    let (stdin_tx, stdin_rx) = unbounded();
    let (signal_tx, signal_rx) = unbounded();

    let mailbox = Arc::new(Mailbox::new(notify_tx));
    signal::install(signal_tx.clone())?;

    let reactor_stop = Arc::new(AtomicBool::new(false));
    let input_stop = Arc::new(AtomicBool::new(false));

    let mut reactor = Reactor::new(
        mailbox.clone(),
        boxed_transport,
        binding,
        args.timeout_ms,
        args.max_retries,
        stdin_rx,
        notify_rx,
        signal_rx,
        reactor_stop.clone(),
    );
    let reactor_handle = thread::spawn(move || reactor.run());
    let input_handle = input_reader::spawn(stdin_tx, signal_tx, input_stop.clone());

    info!(?binding, host = %args.server, port = args.port, "session starting");
    let mut fsm = Fsm::new(&mailbox);
    fsm.run();
    info!("session ended");

    reactor_stop.store(true, Ordering::SeqCst);
    input_stop.store(true, Ordering::SeqCst);
    let _ = reactor_handle.join();
    let _ = input_handle.join();

    Ok(())
}

/// Configures a detailed rotating-file (or stderr) layer plus a clean,
/// colorized stdout layer gated by `-q`. Verbosity (`-v`/`-vv`) controls
/// both layers identically. The returned guard must be held for the
/// process lifetime: dropping it stops the non-blocking file writer.
fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;
    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("ipk-chat-client.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "ipk-chat-client.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_log_layer).with(stdout_log).init();

    Ok(guard)
}
