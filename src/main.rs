//! fsroutes - collection route engine CLI.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fsroutes::{
    cli::{Cli, Commands},
    config::EngineConfig,
    data::JsonStore,
    engine::{log_outcome, Engine, EngineEvent},
    log,
    sink::ManifestSink,
    watch::{Matcher, RouteWatcher, WatchEvent, WatchHandle},
};
use std::{
    path::Path,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Scan => scan(&config),
        Commands::Watch { debounce_ms } => watch(&config, debounce_ms),
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        EngineConfig::from_path(&config_path)?
    } else {
        EngineConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}

/// One-shot resolution: scan, reconcile, write the manifest, report.
fn scan(config: &EngineConfig) -> Result<()> {
    let store = Arc::new(JsonStore::load(config.data_file())?);
    let engine = Engine::new(store, ManifestSink::new(config.output_dir()));

    let outcome = engine.scan(&config.routes_dir())?;
    log_outcome(&outcome);
    log!(
        "scan";
        "{} pages across {} templates",
        engine.reconciler().snapshot().len(),
        engine.reconciler().template_count()
    );

    let failed = outcome.report.template_errors.len();
    if failed > 0 {
        bail!("{failed} template(s) excluded; fix them and re-run");
    }
    Ok(())
}

/// Continuous mode: watch routes and records, reconcile until Ctrl-C.
fn watch(config: &EngineConfig, debounce_ms: Option<u64>) -> Result<()> {
    let store = Arc::new(JsonStore::load(config.data_file())?);
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn fsroutes::data::DataQuery>,
        ManifestSink::new(config.output_dir()),
    );

    let shutdown = engine.sender();
    ctrlc::set_handler(move || {
        shutdown.send(EngineEvent::Shutdown).ok();
    })
    .context("Failed to install Ctrl-C handler")?;

    // Edits to the records file become data events through a reload
    let _data_handle = watch_data_file(&config.data_file(), Arc::clone(&store))?;

    let debounce = Duration::from_millis(debounce_ms.unwrap_or(config.routes.debounce_ms));
    engine.run(&config.routes_dir(), debounce)
}

/// Watch the records file; any change reloads the store, which emits
/// the add/update/remove diff to the engine's data subscription.
fn watch_data_file(path: &Path, store: Arc<JsonStore>) -> Result<WatchHandle> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let matcher: Matcher = Arc::new(move |p: &Path| p.as_os_str() == stem.as_os_str());

    let (tx, rx) = mpsc::channel();
    let handle = RouteWatcher::spawn(&parent, Duration::from_millis(100), matcher, tx)
        .with_context(|| format!("Failed to watch {}", path.display()))?;

    thread::spawn(move || {
        for event in rx {
            if matches!(event, WatchEvent::Added(_) | WatchEvent::Changed(_)) {
                match store.reload() {
                    Ok(0) => {}
                    Ok(n) => log!("data"; "records reloaded, {n} change(s)"),
                    Err(e) => log!("error"; "records reload failed: {e}"),
                }
            }
        }
    });

    Ok(handle)
}
