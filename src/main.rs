use std::{collections::HashMap, path::PathBuf};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use nacos_bridge::{
    ClientOptions, NacosRegistry, NacosSource, ServiceInstance,
    config::{BridgeSettings, ConfigOptions, RegistryOptions, loader::load_settings},
    tracing_setup,
};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,

    /// Settings file (YAML, JSON or TOML)
    #[clap(short, long, default_value = "nacos-bridge.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Print the current content of the configured document
    Get,
    /// Print every new version of the configured document until interrupted
    WatchConfig,
    /// Register an instance, keep it registered until interrupted, then deregister it
    Register {
        /// Service name
        #[clap(long)]
        name: String,
        /// Instance id
        #[clap(long)]
        id: String,
        /// Instance version
        #[clap(long, default_value = "")]
        version: String,
        /// Endpoint URL, repeatable (e.g. grpc://10.0.0.2:9000)
        #[clap(short, long = "endpoint", required = true)]
        endpoints: Vec<String>,
        /// Extra metadata as key=value, repeatable
        #[clap(short, long = "metadata", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Print the current instances of a service as JSON
    Instances {
        /// Service name
        service: String,
    },
    /// Print instance snapshots of a service until interrupted
    WatchService {
        /// Service name
        service: String,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn source_options(settings: &BridgeSettings) -> Result<ConfigOptions> {
    settings
        .source
        .clone()
        .ok_or_else(|| eyre!("Settings have no [source] section"))
}

fn registry_options(settings: &BridgeSettings) -> Result<RegistryOptions> {
    settings
        .registry
        .clone()
        .ok_or_else(|| eyre!("Settings have no [registry] section"))
}

/// Options of the client the command talks through, used for logging defaults
fn command_client(settings: &BridgeSettings, command: &Commands) -> Option<ClientOptions> {
    match command {
        Commands::Get | Commands::WatchConfig => {
            settings.source.as_ref().map(|s| s.client.clone())
        }
        _ => settings.registry.as_ref().map(|r| r.client.clone()),
    }
}

fn init_logging(settings: &BridgeSettings, command: &Commands) -> Result<Option<WorkerGuard>> {
    let client = command_client(settings, command);
    let level = settings
        .logging
        .level
        .clone()
        .or_else(|| client.as_ref().map(|c| c.log_level.to_string()))
        .unwrap_or_else(|| "warn".to_string());
    let log_dir: Option<PathBuf> = client.and_then(|c| c.log_dir);

    tracing_setup::init_tracing_with_config(&level, settings.logging.json, log_dir.as_deref())
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupted, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        token.cancel();
    });
}

async fn get_command(settings: &BridgeSettings) -> Result<()> {
    let source = NacosSource::new(source_options(settings)?);
    for kv in source.load().await.context("Failed to load config")? {
        println!("{}", String::from_utf8_lossy(&kv.value));
    }
    Ok(())
}

async fn watch_config_command(settings: &BridgeSettings) -> Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let source = NacosSource::new(source_options(settings)?).with_cancellation(&shutdown);
    let mut watcher = source.watch().await.context("Failed to watch config")?;
    tracing::info!("Watching {}, press Ctrl-C to stop", watcher.data_id());

    while let Some(kvs) = watcher.next().await? {
        for kv in kvs {
            println!("--- {} ---", kv.key);
            println!("{}", String::from_utf8_lossy(&kv.value));
        }
    }
    watcher.stop().await.context("Failed to stop config watcher")?;
    Ok(())
}

async fn register_command(settings: &BridgeSettings, instance: ServiceInstance) -> Result<()> {
    let registry =
        NacosRegistry::new(registry_options(settings)?).context("Failed to create registry")?;
    registry
        .register(&instance)
        .await
        .with_context(|| format!("Failed to register {}", instance.name))?;
    println!(
        "Registered {} ({}), press Ctrl-C to deregister",
        instance.name, instance.id
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    registry
        .deregister(&instance)
        .await
        .with_context(|| format!("Failed to deregister {}", instance.name))?;
    println!("Deregistered {} ({})", instance.name, instance.id);
    Ok(())
}

async fn instances_command(settings: &BridgeSettings, service: &str) -> Result<()> {
    let registry =
        NacosRegistry::new(registry_options(settings)?).context("Failed to create registry")?;
    let instances = registry
        .get_service(service)
        .await
        .with_context(|| format!("Failed to fetch instances of {service}"))?;
    println!("{}", serde_json::to_string_pretty(&instances)?);
    Ok(())
}

async fn watch_service_command(settings: &BridgeSettings, service: &str) -> Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let registry = NacosRegistry::new(registry_options(settings)?)
        .context("Failed to create registry")?
        .with_cancellation(&shutdown);
    let mut watcher = registry
        .watch(service)
        .await
        .with_context(|| format!("Failed to watch {service}"))?;
    tracing::info!("Watching {}, press Ctrl-C to stop", watcher.service_name());

    loop {
        match watcher.next().await {
            Ok(instances) => println!("{}", serde_json::to_string(&instances)?),
            Err(e) if e.is_cancelled() => break,
            Err(e) => return Err(e.into()),
        }
    }
    watcher.stop().await.context("Failed to stop service watcher")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let settings = load_settings(&args.config)
        .await
        .with_context(|| format!("Failed to load settings from {}", args.config))?;
    // Flushes file logs on exit
    let _log_guard = init_logging(&settings, &args.command)?;

    match args.command {
        Commands::Get => get_command(&settings).await,
        Commands::WatchConfig => watch_config_command(&settings).await,
        Commands::Register {
            name,
            id,
            version,
            endpoints,
            metadata,
        } => {
            let instance = ServiceInstance {
                id,
                name,
                version,
                metadata: metadata.into_iter().collect::<HashMap<_, _>>(),
                endpoints,
            };
            register_command(&settings, instance).await
        }
        Commands::Instances { service } => instances_command(&settings, &service).await,
        Commands::WatchService { service } => watch_service_command(&settings, &service).await,
    }
}
