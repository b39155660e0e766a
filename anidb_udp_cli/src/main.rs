use anidb_udp_cli::config::{ConfigManager, display_value};
use anidb_udp_core::{ConnectionEvent, Request, UdpConnectionHandler, UdpSettings};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "anidb-udp")]
#[command(author, version, about = "AniDB UDP client - ban and session aware access to the AniDB UDP API", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file to use instead of the default location
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check AniDB credentials by logging in and straight back out
    Login {
        /// Username to test instead of the configured one
        #[arg(short, long)]
        username: Option<String>,

        /// Password to test instead of the configured one
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Send a raw API command (the session is attached automatically)
    Send {
        /// Command text, e.g. "ANIME aid=1"
        command: String,

        /// Encode the request as UTF-16 for non-ASCII parameters
        #[arg(short, long)]
        unicode: bool,

        /// Print every reply line, not just the first payload line
        #[arg(short, long)]
        full: bool,
    },

    /// Ping the server and show the connection state
    State,

    /// Inspect and change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show all effective configuration values
    Show,

    /// Print the configuration file path
    Path,

    /// Get a configuration value
    Get {
        /// Configuration key (e.g., client_port)
        key: String,
    },

    /// Set a configuration value in the configuration file
    Set {
        /// Configuration key (e.g., client_port)
        key: String,

        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Info)
            .filter_module("anidb_udp_core", log::LevelFilter::Debug)
            .filter_module("anidb_udp_cli", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
        eprintln!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };

    match cli.command {
        Commands::Login { username, password } => {
            let mut settings = manager.load()?;
            if let Some(username) = username {
                settings.username = username;
            }
            if let Some(password) = password {
                settings.password = password;
            }
            login_command(settings).await?;
        }
        Commands::Send {
            command,
            unicode,
            full,
        } => {
            send_command(manager.load()?, command, unicode, full).await?;
        }
        Commands::State => {
            state_command(manager.load()?).await?;
        }
        Commands::Config { command } => {
            config_command(manager, command)?;
        }
    }

    Ok(())
}

/// Build a handler and log its state transitions
fn connect(settings: UdpSettings) -> Result<(Arc<UdpConnectionHandler>, JoinHandle<()>)> {
    let handler =
        UdpConnectionHandler::from_settings(settings).context("Invalid connection settings")?;
    let logger = spawn_event_logger(&handler);
    Ok((handler, logger))
}

fn spawn_event_logger(handler: &UdpConnectionHandler) -> JoinHandle<()> {
    let mut events = handler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Missed {missed} connection events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Banned { expires_at, .. } => {
            log::error!("Banned from the AniDB UDP API until {expires_at}");
        }
        ConnectionEvent::BanLifted => log::info!("AniDB ban lifted"),
        ConnectionEvent::InvalidSession(true) => log::warn!("AniDB session marked invalid"),
        ConnectionEvent::InvalidSession(false) => log::info!("AniDB session usable again"),
        ConnectionEvent::LoginFailed => log::warn!("AniDB login failed"),
        ConnectionEvent::LoggedIn => log::info!("Logged in to AniDB"),
        ConnectionEvent::LoggedOut => log::info!("Logged out of AniDB"),
        ConnectionEvent::Paused { until, reason } => {
            log::warn!("AniDB asked us to back off until {until} ({reason})");
        }
        ConnectionEvent::PauseCleared => log::info!("AniDB back-off elapsed"),
    }
}

async fn login_command(settings: UdpSettings) -> Result<()> {
    settings
        .validate_credentials()
        .context("AniDB credentials are not configured")?;
    let username = settings.username.clone();
    let password = settings.password.clone();

    let (handler, logger) = connect(settings)?;
    let succeeded = handler.test_login(&username, &password).await;
    let ban = handler.ban_expires_at().await;
    handler.close().await;
    logger.abort();

    if succeeded {
        println!("{}", format!("✓ Logged in to AniDB as {username}").green());
        return Ok(());
    }
    match ban {
        Some(expires_at) => anyhow::bail!("Banned from the AniDB UDP API until {expires_at}"),
        None => anyhow::bail!("Login failed for {username}"),
    }
}

async fn send_command(settings: UdpSettings, command: String, unicode: bool, full: bool) -> Result<()> {
    let (handler, logger) = connect(settings)?;
    let request = Request::new(command).unicode(unicode);

    let started = Instant::now();
    let result = handler.send(&request).await;
    let elapsed = started.elapsed();
    handler.force_logout().await;
    handler.close().await;
    logger.abort();

    let response = result.with_context(|| format!("{} failed", request.name()))?;
    log::debug!("{} answered in {elapsed:?}", request.name());

    println!("{}", response.code);
    if full {
        print!("{}", response.full_text());
    } else {
        println!("{}", response.payload);
    }
    if response.truncated {
        eprintln!(
            "{}",
            "Warning: reply was truncated by the server".yellow()
        );
    }
    Ok(())
}

async fn state_command(settings: UdpSettings) -> Result<()> {
    let (handler, logger) = connect(settings)?;
    handler
        .init()
        .await
        .context("Could not open the AniDB UDP socket")?;

    let started = Instant::now();
    let ping = handler.send_directly(&Request::ping("PING")).await;
    let elapsed = started.elapsed();

    println!("{}", "AniDB UDP connection".bold());
    println!(
        "  Server:   {}:{}",
        handler.settings().server_host,
        handler.settings().server_port
    );
    if let Some(remote) = handler.remote_addr().await {
        println!("  Resolved: {remote}");
    }
    if let Some(local) = handler.local_addr().await {
        println!("  Local:    {local}");
    }
    match &ping {
        Ok(response) => println!("  Ping:     {} in {elapsed:?}", response.code),
        Err(e) => println!("  Ping:     {}", format!("failed ({e})").red()),
    }
    println!("  State:    {}", handler.state().await);
    if let Some(until) = handler.pause_until().await {
        let reason = handler.pause_reason().await.unwrap_or_default();
        println!("  Paused:   until {until} ({reason})");
    }

    handler.close().await;
    logger.abort();
    ping.map(|_| ()).context("AniDB did not answer the ping")
}

fn config_command(mut manager: ConfigManager, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            eprintln!("{}", "Configuration:".bold().blue());
            eprintln!("Config file: {}", manager.get_config_path().display());
            for (key, value) in manager.list()? {
                println!("{} = {}", key.cyan(), value);
            }
        }
        ConfigCommand::Path => {
            println!("{}", manager.get_config_path().display());
        }
        ConfigCommand::Get { key } => {
            let value = manager.get(&key)?;
            println!("{}", display_value(&key, &value));
        }
        ConfigCommand::Set { key, value } => {
            manager.set(&key, &value)?;
            eprintln!(
                "{}",
                format!("Set {key} = {}", display_value(&key, &value)).green()
            );
            eprintln!(
                "Configuration saved to: {}",
                manager.get_config_path().display()
            );
        }
    }
    Ok(())
}
