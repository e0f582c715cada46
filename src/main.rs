use batch_translator::storage::HttpObjectStore;
use batch_translator::utils::config::LoggingConfig;
use batch_translator::{AppConfig, HttpTranslationEngine, ObjectStore, Pipeline};
use std::env;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_CONFIG: &str = "config.toml";

struct Args {
    config: Option<String>,
    reset: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        reset: false,
    };
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                args.config = Some(path);
            }
            "--reset" => args.reset = true,
            "-h" | "--help" => {
                println!("usage: batch-translator [--config <path>] [--reset]");
                println!();
                println!("  --config <path>  TOML configuration (default: ./config.toml if present)");
                println!("  --reset          delete the checkpoint and the output file, then start over");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {:?}", other),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(Some(DEFAULT_CONFIG))?,
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("batch_translator={}", logging.level)));

    let console = if logging.format == "json" {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let config = load_config(&args)?;
    init_tracing(&config.logging)?;

    tracing::info!(
        input = %config.pipeline.input_file.display(),
        output = %config.pipeline.output_file.display(),
        batch_size = config.pipeline.batch_size,
        concurrency = config.concurrency(),
        remote = config.remote.enabled,
        "Loaded configuration"
    );

    if args.reset {
        Pipeline::reset(&config)?;
        tracing::info!(
            output = %config.pipeline.output_file.display(),
            "Checkpoint and output cleared, starting from the first item"
        );
    }

    let engine = Arc::new(HttpTranslationEngine::new(&config.engine)?);
    let remote: Option<Arc<dyn ObjectStore>> = if config.remote.enabled {
        Some(Arc::new(HttpObjectStore::new(&config.remote)?))
    } else {
        None
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current group");
            let _ = stop_tx.send(true);
        }
    });

    let mut pipeline = Pipeline::from_config(&config, engine, remote).with_stop_signal(stop_rx);
    let summary = pipeline.run().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
