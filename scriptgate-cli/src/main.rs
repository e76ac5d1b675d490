use anyhow::{Context, Result};
use clap::Parser;
use scriptgate_config::domains::logging::LogFormat;
use scriptgate_config::{ConfigLoader, ScriptgateConfig};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scriptgate_core::LoadState;
use scriptgate_deps::{BatchStatus, DepsCacheManager, DepsCacheManagerConfig};
use scriptgate_execution::{
    ArtifactStore, ProcessExecutor, ProcessExecutorConfig, RunningRegistry, ScriptGateway,
    ScriptSelector,
};
use scriptgate_interfaces::{
    CatalogStore, InMemoryCatalog, InMemoryLedger, LocalMediaResolver, LoggingNotifier, Notifier,
    ScopedAccessChecker,
};
use scriptgate_registry::{ScanScheduler, ScannerConfig, ScriptScanner, SubprocessProbe};

mod cli;
use cli::{Cli, Commands, ConfigCommands, DepsCommands};

/// Notifier honoring the notification config: silenced when disabled,
/// otherwise logging with the configured title prefix
struct GatewayNotifier {
    enabled: bool,
    title_prefix: String,
}

#[async_trait::async_trait]
impl Notifier for GatewayNotifier {
    async fn notify(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }
        let prefixed = format!("{}: {}", self.title_prefix, title);
        LoggingNotifier.notify(&prefixed, body).await;
    }
}

/// The wired-up gateway: every command works against this set
struct Components {
    catalog: Arc<InMemoryCatalog>,
    scanner: Arc<ScriptScanner>,
    gateway: Arc<ScriptGateway>,
}

fn build_components(config: &ScriptgateConfig) -> Components {
    let catalog = Arc::new(InMemoryCatalog::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let deps = build_deps_manager(config);

    let scanner = Arc::new(ScriptScanner::new(
        ScannerConfig {
            roots: config.registry.roots.clone(),
            ignore_patterns: config.registry.ignore_patterns.clone(),
            discovery_timeout: config.registry.discovery_timeout,
            write_sidecar: config.registry.write_sidecar,
            ..ScannerConfig::default()
        },
        catalog.clone(),
        deps.clone(),
        Arc::new(SubprocessProbe),
    ));

    let notification = config.notification.clone().unwrap_or_default();
    let notifier = Arc::new(GatewayNotifier {
        enabled: config.notification.is_some() && notification.enabled,
        title_prefix: notification.title_prefix,
    });

    let executor = Arc::new(ProcessExecutor::new(
        ProcessExecutorConfig {
            timeout: config.execution.timeout,
            termination_grace: config.execution.termination_grace,
            stdout_preview_chars: config.execution.stdout_preview_chars,
            diagnostic_preview_chars: config.execution.diagnostic_preview_chars,
        },
        Arc::new(RunningRegistry::new()),
        Arc::new(ArtifactStore::new(
            config.output.root.clone(),
            config.output.base_url.clone(),
        )),
        ledger,
        notifier,
    ));

    let gateway = Arc::new(ScriptGateway::new(
        catalog.clone(),
        deps,
        executor,
        Arc::new(LocalMediaResolver),
        Arc::new(ScopedAccessChecker::new(config.registry.roots.clone())),
        config.registry.roots.clone(),
    ));

    Components {
        catalog,
        scanner,
        gateway,
    }
}

fn build_deps_manager(config: &ScriptgateConfig) -> Arc<DepsCacheManager> {
    Arc::new(DepsCacheManager::new(DepsCacheManagerConfig {
        root: config.deps_cache.root.clone(),
        install_timeout: config.deps_cache.install_timeout,
    }))
}

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<ScriptgateConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Initialize tracing with environment variable override support
fn init_tracing(log_level: Option<&String>, config: &ScriptgateConfig) -> Result<()> {
    let env_filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", level);
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str())),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    match config.logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
    debug!("Tracing initialized");
    Ok(())
}

/// Run one scan pass and print the report
async fn scan_command(config: &ScriptgateConfig) -> Result<()> {
    let components = build_components(config);
    let report = components.scanner.scan_once().await?;

    println!(
        "Scanned {} scripts: {} loaded, {} failed, {} unchanged",
        report.scanned, report.loaded, report.failed, report.unchanged
    );

    for record in components.catalog.list().await? {
        if let LoadState::Failed { diagnostic } = &record.load_state {
            println!("  ✗ {}: {}", record.path.display(), diagnostic);
        }
    }

    Ok(())
}

/// Run the gateway until interrupted
async fn serve_command(config: &ScriptgateConfig) -> Result<()> {
    info!("Starting Scriptgate");
    let components = build_components(config);

    let report = components.scanner.scan_once().await?;
    info!(
        scanned = report.scanned,
        loaded = report.loaded,
        failed = report.failed,
        "initial scan complete"
    );

    let scheduler = ScanScheduler::new(config.registry.scan_interval, components.scanner.clone());
    if config.registry.watch {
        scheduler.start().await?;
        info!(
            interval_seconds = config.registry.scan_interval.as_secs(),
            "Scriptgate running; press Ctrl+C to stop"
        );
    } else {
        info!("Scriptgate running without rescans; press Ctrl+C to stop");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    if scheduler.is_running().await {
        scheduler.stop().await;
    }

    Ok(())
}

/// List cataloged scripts after a scan pass
async fn list_command(config: &ScriptgateConfig, format: &str) -> Result<()> {
    let components = build_components(config);
    components.scanner.scan_once().await?;
    let records = components.catalog.list().await?;

    match format.to_lowercase().as_str() {
        "json" => {
            let output = serde_json::to_string_pretty(&records)
                .context("Failed to serialize script records")?;
            println!("{}", output);
        }
        "table" => {
            println!("{:<30} {:<8} {:<8} PATH", "NAME", "RUNTIME", "STATE");
            for record in &records {
                let state = match &record.load_state {
                    LoadState::Pending => "pending",
                    LoadState::Loaded => "loaded",
                    LoadState::Failed { .. } => "failed",
                };
                println!(
                    "{:<30} {:<8} {:<8} {}",
                    record.name,
                    record.runtime.to_string(),
                    state,
                    record.path.display()
                );
            }
        }
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown output format: {}. Valid formats: table, json",
                format
            ));
        }
    }

    Ok(())
}

/// Execute one script and print the classified outcome
async fn run_command(
    config: &ScriptgateConfig,
    script: &str,
    params_json: Option<&String>,
    timeout_seconds: Option<u64>,
) -> Result<()> {
    let components = build_components(config);

    // The catalog is process-local, so populate it before the lookup
    components.scanner.scan_once().await?;

    let params = match params_json {
        Some(text) => serde_json::from_str(text).context("Failed to parse --params JSON")?,
        None => json!({}),
    };
    let selector = ScriptSelector::parse(script);
    let timeout = timeout_seconds.map(Duration::from_secs);

    let outcome = components.gateway.run(&selector, params, timeout).await?;
    let invocation = &outcome.invocation;

    if let Some(payload) = &outcome.payload {
        let formatted =
            serde_json::to_string_pretty(payload).context("Failed to format result as JSON")?;
        println!("{}", formatted);
    } else if let Some(preview) = &invocation.output_preview {
        println!("{}", preview);
    }

    println!(
        "{}: {} in {} ms",
        invocation.script_name, invocation.status, invocation.duration_ms
    );
    if let Some(artifact) = &invocation.artifact {
        println!("Artifact saved to: {} ({} bytes)", artifact.locator, artifact.size);
    }
    if let Some(error) = &invocation.error {
        println!("Error: {}", error);
    }

    if invocation.status != scriptgate_core::RunStatus::Success {
        return Err(anyhow::anyhow!(
            "Run finished with status: {}",
            invocation.status
        ));
    }

    Ok(())
}

/// Install dependency environments for the given scripts
async fn deps_install_command(
    config: &ScriptgateConfig,
    scripts: &[PathBuf],
    force: bool,
) -> Result<()> {
    let deps = build_deps_manager(config);

    if force {
        let mut failed = 0usize;
        for script in scripts {
            match deps.ensure_environment(script, true).await {
                Ok(Some(entry)) => {
                    println!("✅ {}: installed at {}", script.display(), entry.path.display())
                }
                Ok(None) => println!("   {}: no dependencies", script.display()),
                Err(e) => {
                    error!(script = %script.display(), "install failed: {e}");
                    println!("❌ {}: {}", script.display(), e);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(anyhow::anyhow!("{} install(s) failed", failed));
        }
        return Ok(());
    }

    let report = deps.batch_install(scripts).await;
    for item in &report.items {
        let marker = match item.status {
            BatchStatus::Installed => "✅ installed",
            BatchStatus::Cached => "   cached",
            BatchStatus::NoDependencies => "   no dependencies",
            BatchStatus::Failed => "❌ failed",
        };
        match &item.detail {
            Some(detail) => println!("{} {}: {}", marker, item.script.display(), detail),
            None => println!("{} {}", marker, item.script.display()),
        }
    }

    let failed = report.count(BatchStatus::Failed);
    println!(
        "Installed {}, reused {}, failed {}",
        report.count(BatchStatus::Installed),
        report.count(BatchStatus::Cached),
        failed
    );
    if failed > 0 {
        return Err(anyhow::anyhow!("{} install(s) failed", failed));
    }

    Ok(())
}

/// Evict cache entries older than the retention window
fn deps_clean_command(config: &ScriptgateConfig, max_age_seconds: Option<u64>) -> Result<()> {
    let deps = build_deps_manager(config);
    let max_age = max_age_seconds
        .map(Duration::from_secs)
        .unwrap_or(config.deps_cache.retention);

    let report = deps.evict_older_than(max_age)?;
    println!(
        "Removed {} cache entries ({} python, {} js) and {} staging leftovers, reclaimed {} bytes",
        report.removed_entries(),
        report.python_removed,
        report.js_removed,
        report.removed_staging,
        report.reclaimed_bytes
    );

    Ok(())
}

/// Show cache usage per runtime
fn deps_stats_command(config: &ScriptgateConfig) -> Result<()> {
    let deps = build_deps_manager(config);
    let stats = deps.stats()?;

    println!("Dependency cache at {:?}", config.deps_cache.root);
    println!(
        "  python: {} entries, {} bytes",
        stats.python.entries, stats.python.bytes
    );
    println!("  js:     {} entries, {} bytes", stats.js.entries, stats.js.bytes);
    println!(
        "  total:  {} entries, {} bytes",
        stats.total_entries(),
        stats.total_bytes()
    );

    Ok(())
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match load_config(Some(config_file)) {
        Ok(_config) => {
            println!("✅ Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration validation failed: {}", e);
            error!("Configuration validation failed: {}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    let config_content = include_str!("../../sample/configs/example-gateway.yaml");
    fs::write(output, config_content).context("Failed to write configuration file")?;

    println!("✅ Configuration generated at: {:?}", output);
    println!("📝 Edit the file to customize settings for your environment");
    println!(
        "🔧 Validate with: scriptgate config validate --config-file {:?}",
        output
    );

    Ok(())
}

/// Handle configuration display
fn handle_config_show(config_file: Option<&PathBuf>, format: &str) -> Result<()> {
    info!("Showing configuration (format: {})", format);

    let config = load_config(config_file)?;

    match format.to_lowercase().as_str() {
        "yaml" | "yml" => {
            let yaml_output =
                serde_yaml::to_string(&config).context("Failed to serialize to YAML")?;
            println!("{}", yaml_output);
        }
        "json" => {
            let json_output =
                serde_json::to_string_pretty(&config).context("Failed to serialize to JSON")?;
            println!("{}", json_output);
        }
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown output format: {}. Valid formats: yaml, json",
                format
            ));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_tracing(cli.log_level.as_ref(), &config)?;

    match &cli.command {
        Some(Commands::Scan) => scan_command(&config).await,
        Some(Commands::Serve) => serve_command(&config).await,
        Some(Commands::List { format }) => list_command(&config, format).await,
        Some(Commands::Run {
            script,
            params,
            timeout,
        }) => run_command(&config, script, params.as_ref(), *timeout).await,
        Some(Commands::Deps { deps_cmd }) => match deps_cmd {
            DepsCommands::Install { scripts, force } => {
                deps_install_command(&config, scripts, *force).await
            }
            DepsCommands::Clean { max_age } => deps_clean_command(&config, *max_age),
            DepsCommands::Stats => deps_stats_command(&config),
        },
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            ConfigCommands::Show {
                config_file,
                format,
            } => handle_config_show(config_file.as_ref(), format),
        },
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
