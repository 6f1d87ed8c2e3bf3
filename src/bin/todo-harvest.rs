//! todo-harvest CLI: collects tagged TODO lines from a markdown vault.
//!
//! Usage:
//!   todo-harvest [--settings path] [--root dir] collect
//!   todo-harvest [--settings path] [--root dir] sweep
//!   todo-harvest [--settings path] [--root dir] watch
//!   todo-harvest [--settings path] probe
//!   todo-harvest [--settings path] config <show|init>

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use todo_harvest::config::default_settings_path;
use todo_harvest::{
    ChangeOutcome, Classifier, DocumentStore, FsStore, HarvestError, Harvester, HttpClassifier,
    Settings,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "todo-harvest",
    version,
    about = "Collect tagged TODO lines from markdown documents"
)]
struct Cli {
    /// Path to the settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Vault root directory (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection pass
    Collect,
    /// Apply the retention policy to the output document
    Sweep,
    /// Watch the vault, harvesting changed documents and collecting periodically
    Watch,
    /// Check that the classification endpoint answers
    Probe,
    /// Inspect or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Write a settings file with default values
    Init,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_settings(path: &Path) -> Result<Settings, String> {
    Settings::load(path).map_err(|e| format!("Failed to load settings: {}", e))
}

fn save_settings(settings: &Settings, path: &Path) -> Result<(), String> {
    settings
        .save(path)
        .map_err(|e| format!("Failed to save settings: {}", e))
}

fn open_harvester(root: Option<PathBuf>) -> Result<(Arc<FsStore>, Harvester), String> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().map_err(|e| format!("No working directory: {}", e))?,
    };
    let store = FsStore::open(&root)
        .map_err(|e| format!("Failed to open vault {}: {}", root.display(), e))?;
    let store = Arc::new(store);
    let harvester = Harvester::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
    Ok((store, harvester))
}

async fn cmd_collect(harvester: &Harvester, settings: &mut Settings, path: &Path) -> i32 {
    let result = harvester.collect(settings, now_ms()).await;
    if let Err(e) = save_settings(settings, path) {
        eprintln!("Error: {}", e);
        return 1;
    }
    match result {
        Ok(report) if report.new_items == 0 => {
            println!("No new TODOs found.");
            0
        }
        Ok(report) => {
            println!(
                "Collected {} TODO(s) from {} document(s){}",
                report.new_items,
                report.documents_marked,
                if report.classified { ", classified" } else { "" }
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_sweep(harvester: &Harvester, settings: &mut Settings, path: &Path) -> i32 {
    let result = harvester.sweep(settings, now_ms()).await;
    if let Err(e) = save_settings(settings, path) {
        eprintln!("Error: {}", e);
        return 1;
    }
    match result {
        Ok(true) => {
            println!("Output document updated.");
            0
        }
        Ok(false) => {
            println!("Output document unchanged.");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run_collect_tick(harvester: &Harvester, settings: &mut Settings) {
    match harvester.collect(settings, now_ms()).await {
        Ok(report) => info!(new_items = report.new_items, "periodic collection finished"),
        Err(HarvestError::Protected { remaining_secs }) => {
            info!(remaining_secs, "output protected, skipping periodic collection")
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

async fn cmd_watch(
    store: &FsStore,
    harvester: &Harvester,
    settings: &mut Settings,
    path: &Path,
) -> i32 {
    let _watcher = match store.watch() {
        Ok(watcher) => watcher,
        Err(e) => {
            eprintln!("Error: failed to watch {}: {}", store.root().display(), e);
            return 1;
        }
    };
    let mut changes = store.subscribe();
    let minutes = settings.collect_interval_minutes.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));

    info!(root = %store.root().display(), interval_minutes = minutes, "watching vault");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_collect_tick(harvester, settings).await;
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    match harvester.handle_change(&change.path, settings, now_ms()).await {
                        Ok(ChangeOutcome::Ignored) => {}
                        Ok(outcome) => info!(path = %change.path, ?outcome, "handled change"),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "change events dropped, next periodic pass will catch up");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
        if let Err(e) = save_settings(settings, path) {
            eprintln!("Error: {}", e);
        }
    }

    match save_settings(settings, path) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_probe(settings: &Settings) -> i32 {
    if let Err(e) = settings.validate(true) {
        eprintln!("Error: {}", e);
        return 1;
    }
    let classifier = match HttpClassifier::from_settings(settings) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match classifier.probe().await {
        Ok(()) => {
            println!("Classification endpoint is reachable.");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_config_show(settings: &Settings, path: &Path) -> i32 {
    let mut shown = settings.clone();
    if !shown.credential.is_empty() {
        shown.credential = "********".to_string();
    }
    match serde_json::to_string_pretty(&shown) {
        Ok(json) => {
            println!("# {}", path.display());
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_config_init(path: &Path) -> i32 {
    if path.exists() {
        eprintln!("Error: settings file {} already exists", path.display());
        return 1;
    }
    match save_settings(&Settings::default(), path) {
        Ok(()) => {
            println!("Wrote default settings to {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run(command: Commands, root: Option<PathBuf>, settings_path: &Path) -> i32 {
    let mut settings = match load_settings(settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match command {
        // `config init` is dispatched by `main` before settings are loaded.
        Commands::Config { .. } => cmd_config_show(&settings, settings_path),
        Commands::Probe => cmd_probe(&settings).await,
        Commands::Collect | Commands::Sweep | Commands::Watch => {
            let (store, harvester) = match open_harvester(root) {
                Ok(opened) => opened,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            };
            match command {
                Commands::Sweep => cmd_sweep(&harvester, &mut settings, settings_path).await,
                Commands::Watch => cmd_watch(&store, &harvester, &mut settings, settings_path).await,
                _ => cmd_collect(&harvester, &mut settings, settings_path).await,
            }
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let settings_path = cli.settings.unwrap_or_else(default_settings_path);

    let code = match cli.command {
        Commands::Config { action: ConfigAction::Init } => cmd_config_init(&settings_path),
        command => run(command, cli.root, &settings_path).await,
    };
    std::process::exit(code);
}
