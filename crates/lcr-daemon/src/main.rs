// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live Components Runtime daemon (lcrd)
//!
//! Accepts duplex connections on a TCP socket and serves the component
//! runtime over them. Component types are registered by embedding the
//! library; the bare binary is primarily useful for protocol-level smoke
//! testing and as the template an embedder's own `main` starts from.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use lcr_core::{SystemClock, UuidIdGen};
use lcr_daemon::{multiplexer, Runtime, RuntimeConfig};
use lcr_observability::null_sink;
use lcr_storage::NullPersistenceSink;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

const DEFAULT_LISTEN: &str = "127.0.0.1:9170";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("lcrd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("lcrd {}", env!("CARGO_PKG_VERSION"));
                println!("Live Components Runtime daemon - serves component state over duplex connections");
                println!();
                println!("USAGE:");
                println!("    lcrd");
                println!();
                println!("Listens on LCRD_LISTEN (default {DEFAULT_LISTEN}).");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: lcrd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    setup_logging();

    let runtime = Runtime::new(
        SystemClock,
        UuidIdGen,
        RuntimeConfig::default(),
        null_sink(),
        Arc::new(NullPersistenceSink),
    );
    let background = runtime.spawn_background();

    let addr = std::env::var("LCRD_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "daemon ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = multiplexer::run_tcp(Arc::clone(&runtime), listener) => {}
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // hard-bounded emergency sweep, then stop
    let unmounted = runtime.emergency_shutdown().await;
    info!(unmounted = unmounted.len(), "emergency cleanup complete");
    for handle in background {
        handle.abort();
    }
    info!("daemon stopped");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
