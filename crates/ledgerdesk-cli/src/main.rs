//! Ledgerdesk - a terminal administration console for the ledger API.
//!
//! Operators sign in, manage customers, currencies, users and financial
//! records, and are signed out automatically when the session ends.

mod command;
mod console;
mod login;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgerdesk_core::auth::{Navigator, SessionGuard, SessionStore};
use ledgerdesk_core::{ApiClient, Config, FileStorage, SessionStorage};

use console::{Console, SessionEnd};

const LOG_FILE_PREFIX: &str = "ledgerdesk.log";

/// Sends the guard's redirects to the command loop
struct ConsoleNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str) {
        // Receiver gone means the console is already shutting down
        let _ = self.tx.send(path.to_string());
    }
}

/// Initialize logging to a daily file in the data directory.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=ledgerdesk_core=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let _log_guard = init_tracing(&data_dir);
    info!(api = %config.api_base_url, "Ledgerdesk starting");

    let storage = FileStorage::open(&data_dir)?;
    let watcher = storage.watch(config.guard.storage_poll_interval());
    let storage: Arc<dyn SessionStorage> = Arc::new(storage);
    let session = SessionStore::new(Arc::clone(&storage));

    let (nav_tx, mut navigations) = mpsc::unbounded_channel();
    let navigator = Arc::new(ConsoleNavigator { tx: nav_tx });
    let guard = SessionGuard::new(Arc::clone(&storage), navigator, config.guard.clone());

    let mut client = ApiClient::new(&config.api_base_url)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let result = run(&mut input, &mut config, &mut client, &session, &guard, &mut navigations).await;

    guard.stop();
    watcher.abort();
    info!("Ledgerdesk shutting down");
    result
}

/// Alternate between the login prompt and the console until the operator quits
async fn run(
    input: &mut login::Input,
    config: &mut Config,
    client: &mut ApiClient,
    session: &SessionStore,
    guard: &SessionGuard,
    navigations: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    loop {
        let identity = match session.user().filter(|_| session.is_authenticated()) {
            Some(identity) => {
                info!(user = %identity.email, "Resuming stored session");
                identity
            }
            None => {
                client.set_token(None);
                match login::sign_in(input, config, client, session).await? {
                    Some(identity) => identity,
                    None => return Ok(()),
                }
            }
        };

        // Redirects left over from the previous session
        while navigations.try_recv().is_ok() {}

        client.set_token(session.token());
        guard.start();
        if !guard.intercept_unauthorized(client) {
            warn!("Unauthorized hook was already installed");
        }

        let end = Console::new(client, guard, identity).run(input, navigations).await;
        guard.stop();
        match end? {
            SessionEnd::Quit => return Ok(()),
            SessionEnd::SignedOut(reason) => info!(?reason, "Session ended"),
        }
    }
}
