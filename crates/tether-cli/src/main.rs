use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::TetherConfig;
use tether_client::{ClientError, GatewayClient, DEFAULT_SESSION};
use tether_protocol::chat::{ChatState, Role};

#[derive(Parser)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Tether — chat with an agent gateway over WebSocket")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gateway URL (overrides config and environment)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Gateway auth token (overrides config and environment)
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat {
        /// Session key to attach to
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Send a single message and print the response
    Send {
        /// The message to send
        message: String,

        /// Session key to attach to
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Print recent chat history
    History {
        /// Session key to read from
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Maximum number of messages
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Default to warnings only so chat output stays clean
    let filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Chat { ref session } => cmd_chat(&cli, session).await,
        Commands::Send { ref message, ref session } => cmd_send(&cli, message, session).await,
        Commands::History { ref session, limit } => cmd_history(&cli, session, limit).await,
    }
}

fn client_for(cli: &Cli) -> Result<GatewayClient> {
    let cfg = TetherConfig::load(&cli.config)?;
    Ok(GatewayClient::new(cfg.gateway_config(&cli.url, &cli.token)))
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::default_config_toml()).await?;
        println!("Created default config at {}", config_path.display());
    }
    println!("Edit {} to point at your gateway.", config_path.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TetherConfig::load(config_path)?;
    // Debug output masks the token
    println!("{cfg:#?}");
    Ok(())
}

async fn cmd_chat(cli: &Cli, session: &str) -> Result<()> {
    let client = client_for(cli)?;

    let _states = client.on_state_change(|state| {
        if let Some(error) = &state.error {
            eprintln!("! {error}");
        } else if state.connecting {
            eprintln!("* connecting...");
        } else if state.connected {
            eprintln!("* connected");
        }
    });

    // Streaming render: track how much of the current run is already printed
    // so each delta only appends its new suffix.
    let printed: Arc<Mutex<(Option<String>, usize)>> = Arc::new(Mutex::new((None, 0)));
    let render = Arc::clone(&printed);
    let _events = client.on_chat_event(move |event| {
        let mut cursor = render.lock().expect("render cursor poisoned");
        if cursor.0 != event.run_id {
            *cursor = (event.run_id.clone(), 0);
        }
        match event.state {
            ChatState::Delta | ChatState::Final => {
                if let Some(text) = &event.stream {
                    if let Some(suffix) = text.get(cursor.1..) {
                        if !suffix.is_empty() {
                            print_flush(suffix);
                            cursor.1 = text.len();
                        }
                    }
                }
                if event.state == ChatState::Final {
                    println!();
                }
            }
            ChatState::Error => {
                eprintln!("! {}", event.error.as_deref().unwrap_or("Unknown error"));
            }
            ChatState::Aborted => eprintln!("! run aborted"),
            ChatState::Unknown => {}
        }
    });

    client.connect().await?;

    let history = client.load_history(session, 50).await;
    for message in &history {
        print_message(message);
    }
    if !history.is_empty() {
        println!("---");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "/quit" {
                        break;
                    }
                    if !client.send(line, session) {
                        eprintln!("! not connected; message dropped");
                    }
                }
                None => break, // stdin closed
            },
        }
    }

    client.disconnect();
    info!("chat session ended");
    Ok(())
}

async fn cmd_send(cli: &Cli, message: &str, session: &str) -> Result<()> {
    let client = client_for(cli)?;

    // Completion signal: the first terminal event ends the command
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let _events = client.on_chat_event(move |event| {
        match event.state {
            ChatState::Final => {
                let _ = done_tx.send(Ok(event.stream.clone().unwrap_or_default()));
            }
            ChatState::Error => {
                let _ = done_tx.send(Err(event
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string())));
            }
            ChatState::Aborted => {
                let _ = done_tx.send(Err("run aborted".to_string()));
            }
            ChatState::Delta | ChatState::Unknown => {}
        }
    });

    client.connect().await?;
    if !client.send(message, session) {
        anyhow::bail!("gateway connection is not ready");
    }

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(120), done_rx.recv())
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for a response"))?
        .ok_or_else(|| anyhow::anyhow!(ClientError::NotConnected))?;

    client.disconnect();
    match outcome {
        Ok(text) => {
            println!("{text}");
            Ok(())
        }
        Err(error) => anyhow::bail!("{error}"),
    }
}

async fn cmd_history(cli: &Cli, session: &str, limit: u32) -> Result<()> {
    let client = client_for(cli)?;
    client.connect().await?;

    let history = client.load_history(session, limit).await;
    if history.is_empty() {
        println!("(no history)");
    }
    for message in &history {
        print_message(message);
    }

    client.disconnect();
    Ok(())
}

fn print_message(message: &tether_protocol::ChatMessage) {
    let role = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
        Role::System => "system",
    };
    println!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        role,
        message.content
    );
}

fn print_flush(text: &str) {
    use std::io::Write;
    print!("{text}");
    let _ = std::io::stdout().flush();
}
