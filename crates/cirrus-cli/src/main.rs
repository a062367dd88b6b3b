//! Cirrus CLI - Command-line client for CloudNotes synchronization
//!
//! Local note capture plus one-shot and continuous synchronization with a
//! CloudNotes server.

use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use cirrus_core::config::ServiceConfig;
use cirrus_core::notify::{SyncEvent, SyncNotifier};
use cirrus_core::remote::HttpNotesClient;
use cirrus_core::sync::{InstantSync, PeriodicSync, SyncPeriod, SyncReport};
use cirrus_core::{LocalNote, NoteId, NoteStore, Synchronizer};
use serde::Serialize;
use thiserror::Error;

/// Keyring service name under which passwords are stored.
const KEYRING_SERVICE: &str = "cirrus";

#[derive(Parser)]
#[command(name = "cirrus")]
#[command(about = "Keep local notes in sync with a CloudNotes server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to the local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Quick capture: cirrus "my note here"
    #[arg(trailing_var_arg = true)]
    note: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content
        content: Vec<String>,
    },
    /// List notes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Store the service password in the system keyring
    Login {
        /// Account name on the server
        #[arg(long)]
        username: Option<String>,
    },
    /// Run one full synchronization pass
    Sync,
    /// Synchronize continuously until interrupted
    Watch {
        /// Automatic sync interval in seconds (0 disables the timer)
        #[arg(long, value_name = "SECONDS")]
        period: Option<i64>,
    },
    /// Check the connection to the server
    Status,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] cirrus_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("No password provided")]
    EmptyPassword,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Keyring error: {0}")]
    Keyring(String),
    #[error(
        "The service is not configured. Set CIRRUS_SERVER_URL and CIRRUS_USERNAME, then run `cirrus login` or set CIRRUS_PASSWORD."
    )]
    NotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cirrus=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add { content }) => run_add(&content, &db_path).await?,
        Some(Commands::List { json }) => run_list(json, &db_path)?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Login { username }) => run_login(username)?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Watch { period }) => run_watch(period, &db_path).await?,
        Some(Commands::Status) => run_status().await?,
        None => {
            if cli.note.is_empty() {
                use clap::CommandFactory;
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, &db_path).await?;
            }
        }
    }

    Ok(())
}

async fn run_add(content_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let store = Arc::new(NoteStore::open(db_path)?);
    let note = store.create_note(&content)?;
    println!("{}", note.id);

    // Push right away when the service is configured; otherwise the note
    // waits for the next sync pass.
    if let Ok(synchronizer) = connect(store) {
        if let Err(error) = synchronizer.create_remote_note(&note).await {
            eprintln!("Instant sync failed ({error}); the note is pushed by the next sync");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteListItem {
    id: String,
    title: String,
    category: String,
    favorite: bool,
    remote_id: Option<i64>,
    modified: Option<i64>,
    synchronized: Option<i64>,
}

fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = NoteStore::open(db_path)?;
    let notes = store.fetch_all_notes()?;

    if as_json {
        let items = notes.iter().map(note_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = Arc::new(NoteStore::open(db_path)?);
    let note = resolve_note_for_delete(&normalized_id, &store)?;

    // The store writes the tombstone in the same transaction when the note
    // is linked.
    let deleted = store.delete_note(&note.id)?;
    println!("{}", deleted.id);

    if let Some(remote_id) = deleted.remote_id.filter(|id| *id > 0) {
        if let Ok(synchronizer) = connect(store) {
            if let Err(error) = synchronizer.delete_remote_note(remote_id).await {
                eprintln!(
                    "Instant delete failed ({error}); the tombstone is retried by the next sync"
                );
            }
        }
    }
    Ok(())
}

fn run_login(username: Option<String>) -> Result<(), CliError> {
    let username = username
        .or_else(|| env::var("CIRRUS_USERNAME").ok())
        .filter(|name| !name.trim().is_empty())
        .ok_or(CliError::NotConfigured)?;

    eprintln!("Password for {username}:");
    let password = read_password()?;

    keyring_entry(&username)?
        .set_password(&password)
        .map_err(|error| CliError::Keyring(error.to_string()))?;
    println!("Password stored for {username}");
    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let store = Arc::new(NoteStore::open(db_path)?);
    let synchronizer = connect(store)?;

    let report = synchronizer.synchronize().await?;
    print_report(&report);
    Ok(())
}

async fn run_watch(period: Option<i64>, db_path: &Path) -> Result<(), CliError> {
    let store = Arc::new(NoteStore::open(db_path)?);
    let notifier = SyncNotifier::new();
    let synchronizer = connect_with_notifier(store, notifier.clone())?;

    // Transient status output, the way a status indicator would render it.
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SyncEvent::RequestFailed { message } = event {
                eprintln!("sync error: {message}");
            }
        }
    });

    // Synchronize once on start, then keep going.
    match synchronizer.synchronize().await {
        Ok(report) => print_report(&report),
        Err(error) => eprintln!("Initial sync failed: {error}"),
    }

    let _instant = InstantSync::spawn(synchronizer.clone());
    let mut periodic = PeriodicSync::new(synchronizer);
    periodic.set_period(resolve_sync_period(period));

    println!("Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    periodic.stop();
    Ok(())
}

async fn run_status() -> Result<(), CliError> {
    let config = service_config_from_env()?;
    let client = HttpNotesClient::new(&config.server_url, &config.username, &config.password)?;

    use cirrus_core::remote::NotesApi;
    match client.check().await {
        Ok(()) => {
            println!("The server is accessible");
            Ok(())
        }
        Err(error) => {
            println!("The server is not accessible: {error}");
            Ok(())
        }
    }
}

// --- Service wiring ------------------------------------------------------

fn connect(store: Arc<NoteStore>) -> Result<Synchronizer, CliError> {
    connect_with_notifier(store, SyncNotifier::new())
}

fn connect_with_notifier(
    store: Arc<NoteStore>,
    notifier: SyncNotifier,
) -> Result<Synchronizer, CliError> {
    let config = service_config_from_env()?;
    tracing::info!(server = %config.server_url, "Connecting to the CloudNotes service");
    let client = HttpNotesClient::new(&config.server_url, &config.username, &config.password)?;
    Ok(Synchronizer::new(store, Arc::new(client), notifier))
}

fn service_config_from_env() -> Result<ServiceConfig, CliError> {
    let server_url = non_empty_env("CIRRUS_SERVER_URL").ok_or(CliError::NotConfigured)?;
    let username = non_empty_env("CIRRUS_USERNAME").ok_or(CliError::NotConfigured)?;
    let password = match non_empty_env("CIRRUS_PASSWORD") {
        Some(password) => password,
        None => keyring_entry(&username)?
            .get_password()
            .map_err(|_| CliError::NotConfigured)?,
    };

    Ok(ServiceConfig::new(server_url, username, password)?)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn keyring_entry(username: &str) -> Result<keyring::Entry, CliError> {
    keyring::Entry::new(KEYRING_SERVICE, username)
        .map_err(|error| CliError::Keyring(error.to_string()))
}

fn resolve_sync_period(period: Option<i64>) -> SyncPeriod {
    let secs = period
        .or_else(|| non_empty_env("CIRRUS_SYNC_PERIOD").and_then(|value| value.parse().ok()))
        .unwrap_or(300);
    SyncPeriod::from_secs(secs)
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CIRRUS_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cirrus")
        .join("cirrus.db")
}

// --- Output helpers ------------------------------------------------------

fn print_report(report: &SyncReport) {
    println!(
        "Sync completed: {} pushed, {} updated remotely, {} deleted remotely, \
         {} pulled, {} updated locally, {} deleted locally, {} tombstones pruned",
        report.remote_created,
        report.remote_updated,
        report.remote_deleted,
        report.local_created,
        report.local_updated,
        report.local_deleted,
        report.tombstones_pruned,
    );
    for entry in &report.errors {
        eprintln!("  failed for {}: {}", entry.entity, entry.error);
    }
}

fn format_note_lines(notes: &[LocalNote]) -> Vec<String> {
    let now = Utc::now().timestamp();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if note.favorite { "*" } else { " " };
            let title: String = note.title.chars().take(40).collect();
            let relative_time = note
                .modified
                .map_or_else(String::new, |time| {
                    format_relative_time(time.timestamp(), now)
                });

            if note.category.is_empty() {
                format!("{short_id:<13} {marker} {title:<40}  {relative_time}")
            } else {
                format!(
                    "{short_id:<13} {marker} {title:<40}  {relative_time:<10}  [{}]",
                    note.category
                )
            }
        })
        .collect()
}

fn note_to_list_item(note: &LocalNote) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        category: note.category.clone(),
        favorite: note.favorite,
        remote_id: note.remote_id,
        modified: note.modified.map(|time| time.timestamp()),
        synchronized: note.synchronized.map(|time| time.timestamp()),
    }
}

fn format_relative_time(timestamp_secs: i64, now_secs: i64) -> String {
    let diff = now_secs.saturating_sub(timestamp_secs);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

// --- Input helpers -------------------------------------------------------

fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

fn read_password() -> Result<String, CliError> {
    let mut buffer = String::new();
    io::stdin().read_line(&mut buffer)?;
    normalize_content(&buffer).ok_or(CliError::EmptyPassword)
}

fn resolve_note_for_delete(note_query: &str, store: &NoteStore) -> Result<LocalNote, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = store.fetch_note(&note_id)? {
            return Ok(note);
        }
    }

    let matches = store
        .fetch_all_notes()?
        .into_iter()
        .filter(|note| note.id.as_str().starts_with(note_query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => Ok(matches.into_iter().next().expect("one match")),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|note| note.id.as_str().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}
