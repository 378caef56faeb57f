//! mailqtt - camera alert mail to MQTT bridge
//!
//! CLI entry point.

use clap::Parser;
use eyre::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use mailqtt::cli::{Cli, Command, OutputFormat};
use mailqtt::config::Config;
use mailqtt::daemon::Daemon;
use mailqtt::topic::TopicResolver;

/// Level used when neither `--log-level` nor `log-level` is set
fn default_level(verbose: bool, debug: bool) -> &'static str {
    if verbose || debug { "debug" } else { "info" }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, fallback: &str) -> Result<()> {
    // Priority: CLI --log-level > config file > DEBUG / --verbose > info
    let filter = cli_log_level.or(config_log_level).unwrap_or(fallback);
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .with_context(|| format!("Invalid log level '{}'", filter))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    debug!(%filter, "Logging initialized");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config
        .apply_env(std::env::vars())
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    setup_logging(
        cli.log_level.as_deref(),
        config.log_level.as_deref(),
        default_level(cli.verbose, config.debug),
    )
    .context("Failed to setup logging")?;

    match &config.source {
        Some(path) => info!(path = %path.display(), "Loaded config"),
        None => debug!("No config file found, using defaults and environment"),
    }

    match cli.command {
        None | Some(Command::Serve) => cmd_serve(config).await,
        Some(Command::Resolve { subject, format }) => cmd_resolve(&config, &subject, format),
        Some(Command::Config) => cmd_config(&config),
    }
}

async fn cmd_serve(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let running = Daemon::new(config).start(shutdown.clone()).await?;

    wait_for_signal(&shutdown).await?;
    info!("Shutting down...");
    shutdown.cancel();

    running.wait().await
}

/// Block until SIGINT or SIGTERM, or until something else cancels `shutdown`
async fn wait_for_signal(shutdown: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => debug!("wait_for_signal: SIGINT received"),
            _ = sigterm.recv() => debug!("wait_for_signal: SIGTERM received"),
            _ = shutdown.cancelled() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = shutdown.cancelled() => {}
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    subject: &'a str,
    camera: &'a str,
    detected_thing: &'a str,
    topic: &'a str,
}

fn cmd_resolve(config: &Config, subject: &str, format: OutputFormat) -> Result<()> {
    let resolved = TopicResolver::new(&config.mqtt.topic).resolve(Some(subject))?;

    match format {
        OutputFormat::Text => {
            println!("camera:         {}", resolved.category);
            println!("detected thing: {}", resolved.subject_kind);
            println!("topic:          {}", resolved.topic);
        }
        OutputFormat::Json => {
            let output = ResolveOutput {
                subject,
                camera: &resolved.category,
                detected_thing: &resolved.subject_kind,
                topic: &resolved.topic,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(&config.redacted())?);
    Ok(())
}
