//! # Price List CLI
//!
//! Interactive terminal front-end for the materials price list. Reads
//! commands from stdin, applies remote snapshots as they arrive, and redraws
//! the table, charts and summary after every change.
//!
//! Configuration comes from the environment (see `config.rs`); diagnostics go
//! to stderr and are filtered with `RUST_LOG`.

mod commands;
mod config;
mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pricelist_core::app::{Confirm, PriceListApp};
use pricelist_core::local::{FileStorage, LocalFallbackStore};
use pricelist_core::presentation::DashboardPresenter;
use pricelist_core::remote::{FirestoreRemote, InMemoryRemote, RemoteStore, SyncEvent};

use crate::commands::{Command, HELP};
use crate::config::{CliConfig, RemoteChoice};
use crate::render::{format_status, render_dashboard, StatusLine, TerminalRenderer, ToastNotifier};

type InputLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Asks yes/no questions on the same stdin the command loop reads.
struct StdinConfirm {
    lines: InputLines,
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(answer)) => {
                matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "ya")
            }
            _ => false,
        }
    }
}

enum Action {
    Sync(SyncEvent),
    Line(Option<String>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pricelist=info,pricelist_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_env()?;

    let storage = FileStorage::open(&config.data_dir)
        .with_context(|| format!("Failed to open local storage in {}", config.data_dir.display()))?;
    let local = LocalFallbackStore::new(Box::new(storage));

    let remote: Option<Arc<dyn RemoteStore>> = match &config.remote {
        RemoteChoice::Firestore(firestore) => {
            info!(
                "using Firestore project {} collection {}",
                firestore.project_id, firestore.collection
            );
            let firestore = FirestoreRemote::new(firestore.clone())
                .context("Failed to set up the Firestore client")?;
            Some(Arc::new(firestore) as Arc<dyn RemoteStore>)
        }
        RemoteChoice::Memory => {
            let cached = local.load().context("Failed to read the local cache")?;
            info!("using an in-process remote seeded with {} cached materials", cached.len());
            Some(Arc::new(InMemoryRemote::seeded(cached)) as Arc<dyn RemoteStore>)
        }
        RemoteChoice::Off => None,
    };

    let lines: InputLines = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let status = StatusLine::default();

    let mut app = PriceListApp::new(
        remote,
        local,
        Arc::new(StdinConfirm {
            lines: Arc::clone(&lines),
        }),
        Arc::new(ToastNotifier::new(status.clone())),
    );
    app.subscribe_view(Box::new(DashboardPresenter::new(TerminalRenderer)));
    app.start().await;

    println!("Type 'help' for commands.");

    loop {
        prompt(&status);
        let action = tokio::select! {
            event = app.next_sync_event() => Action::Sync(event),
            line = async { lines.lock().await.next_line().await } => {
                Action::Line(line.context("Failed to read from stdin")?)
            }
        };

        match action {
            Action::Sync(event) => {
                println!();
                app.apply_sync_event(event);
            }
            Action::Line(None) => break,
            Action::Line(Some(line)) => match Command::parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => execute(&mut app, command).await,
                Ok(None) => {}
                Err(e) => println!("{}", e),
            },
        }
    }

    info!("session ended");
    Ok(())
}

fn prompt(status: &StatusLine) {
    for message in status.take_visible(Instant::now()) {
        println!("{}", format_status(&message));
    }
    print!("pricelist> ");
    let _ = std::io::stdout().flush();
}

/// Run one command. Failures are already shown by the app's notifier.
async fn execute(app: &mut PriceListApp, command: Command) {
    debug!("executing {:?}", command);

    match command {
        Command::Add(input) => {
            let _ = app.add_material(&input).await;
        }
        Command::SetField { target, field, value } => match target.resolve(&app.dashboard()) {
            Ok(id) => {
                let _ = app.edit_field(&id, field, &value).await;
            }
            Err(e) => println!("{}", e),
        },
        Command::Edit {
            target,
            name,
            price,
            unit,
        } => match target.resolve(&app.dashboard()) {
            Ok(id) => {
                let _ = app.edit_material(&id, &name, &price, &unit).await;
            }
            Err(e) => println!("{}", e),
        },
        Command::Delete(target) => match target.resolve(&app.dashboard()) {
            Ok(id) => {
                let _ = app.delete_material(&id).await;
            }
            Err(e) => println!("{}", e),
        },
        Command::Apply(values) => {
            let (markup, margin) = values.unwrap_or_else(|| {
                let settings = app.settings();
                (
                    settings.default_markup.to_string(),
                    settings.profit_margin.to_string(),
                )
            });
            let _ = app.apply_margins(&markup, &margin).await;
        }
        Command::Settings(None) => {
            let settings = app.settings();
            println!(
                "Default markup: {}%  Profit margin: {}%",
                settings.default_markup.normalize(),
                settings.profit_margin.normalize()
            );
        }
        Command::Settings(Some((markup, margin))) => {
            let _ = app.set_settings(&markup, &margin);
        }
        Command::Export(dir) => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let _ = app.export_to(&dir);
        }
        Command::Import(path) => {
            let _ = app.import_file(&path).await;
        }
        Command::Clear => {
            let _ = app.clear_all(true).await;
        }
        Command::Sample => {
            let _ = app.add_sample_data().await;
        }
        Command::Retry => {
            let _ = app.retry_pending().await;
        }
        Command::Show => print!("{}", render_dashboard(&app.dashboard())),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}
