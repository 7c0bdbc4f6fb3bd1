use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tessera_host::{CapabilityRegistry, Dispatcher};

use wardkeep_daemon::config::Config;
use wardkeep_daemon::handlers;
use wardkeep_daemon::plugin::PluginManager;
use wardkeep_daemon::store::{SqliteStore, Store};
use wardkeep_daemon::tick::TickScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; its log level drives subscriber setup.
    let config = match Config::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };

    let level = config
        .daemon
        .log_level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .init();

    info!("Starting wardkeep-daemon v{}", env!("CARGO_PKG_VERSION"));

    // Open the store.
    let store: Arc<dyn Store> = Arc::new(match &config.store.path {
        Some(path) => SqliteStore::open_at(path)?,
        None => SqliteStore::open()?,
    });

    // Build the capability table. A duplicate registration here is a
    // programming error and must stop the daemon before any plugin loads.
    let mut registry = CapabilityRegistry::new();
    handlers::register_all(&mut registry, store).context("capability registration failed")?;
    info!("Registered {} capabilities", registry.len());

    let mut dispatcher = Dispatcher::new(Arc::new(registry));
    if let Some(deadline) = config.handler_deadline() {
        dispatcher = dispatcher.with_handler_deadline(deadline);
    }
    let dispatcher = Arc::new(dispatcher);

    // Load built-in plugin modules and list anything discovered on disk.
    let mut manager = PluginManager::new(dispatcher, config.bridge.max_memory_pages);
    manager.install(Box::new(plugin_auth::AuthPlugin::new()))?;
    manager.install(Box::new(plugin_audit::AuditPlugin::new()))?;
    manager.discover_external(&config.plugins.extra_dirs);

    for status in manager.list() {
        info!(
            "Plugin: {} v{} ({}){}",
            status.id,
            status.version,
            if status.external { "external" } else { "loaded" },
            status
                .tick_interval
                .map(|s| format!(" - ticks every {s}s"))
                .unwrap_or_default()
        );
    }

    let manager = Arc::new(tokio::sync::Mutex::new(manager));

    // Tick loop (0 disables).
    let scheduler;
    let tick_handle = if config.plugins.tick_interval_seconds > 0 {
        let s = TickScheduler::new(Arc::clone(&manager), config.plugins.tick_interval_seconds);
        let handle = s.start();
        scheduler = Some(s);
        Some(handle)
    } else {
        scheduler = None;
        info!("Plugin ticking disabled by configuration");
        None
    };

    info!("wardkeep-daemon running; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down");
    if let Some(scheduler) = &scheduler {
        scheduler.shutdown();
    }
    if let Some(handle) = tick_handle {
        let _ = handle.await;
    }

    Ok(())
}
