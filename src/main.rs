use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::signal;
use tokio::sync::mpsc;

use chat_relay_bridge::config::{self, AppConfig};
use chat_relay_bridge::error::BridgeError;
use chat_relay_bridge::network::{
    self, CommandHandler, FileAuthState, Relay, Session, SessionSettings, WsUpstream,
};
use chat_relay_bridge::storage::{self, Store};

#[derive(Parser)]
#[command(
    name = "chat_relay_bridge",
    version,
    about = "Bridges a chat session to a single WebSocket subscriber"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge (default)
    Run,
    /// List every known chat and its flags
    Chats,
    /// Change the flags of one chat
    SetChat {
        chat_id: String,
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        offline_guard: Option<bool>,
    },
    /// Show the messages of a chat that were not audited yet
    Audit { chat_id: String },
    /// Write the default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bridge(app_config).await?,
        Command::Chats => {
            let store = open_store(&app_config)?;
            let chats = store.list_chats()?;
            println!(
                "{} chats, {} stored messages",
                chats.len(),
                store.message_count()?
            );
            for (chat_id, chat) in chats {
                println!(
                    "{chat_id}\tenabled={}\toffline_guard={}",
                    chat.enabled, chat.offline_guard
                );
            }
        }
        Command::SetChat {
            chat_id,
            enabled,
            offline_guard,
        } => {
            let store = open_store(&app_config)?;
            if let Some(enabled) = enabled {
                store.set_enabled(&chat_id, enabled)?;
            }
            if let Some(offline_guard) = offline_guard {
                store.set_offline_guard(&chat_id, offline_guard)?;
            }
            let chat = store.ensure_chat(&chat_id)?;
            println!(
                "{chat_id}\tenabled={}\toffline_guard={}",
                chat.enabled, chat.offline_guard
            );
        }
        Command::Audit { chat_id } => {
            let store = open_store(&app_config)?;
            for message in store.unchecked(&chat_id)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    message.id, message.sent_at, message.sender_name, message.content
                );
            }
        }
        Command::InitConfig => {
            config::save_config(&cli.config, &AppConfig::default())?;
            println!("Wrote default config to {}", cli.config);
        }
    }

    Ok(())
}

fn open_store(app_config: &AppConfig) -> Result<Store, BridgeError> {
    storage::ensure_data_dir(app_config)?;
    let store = Store::new(storage::open_medium(app_config)?);
    store.init()?;
    Ok(store)
}

async fn run_bridge(app_config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    app_config.validate()?;
    let store = Arc::new(open_store(&app_config)?);
    let relay = Relay::new();

    let listener = network::relay::bind(&app_config.relay_addr).await?;
    log::info!("Relay listening on {}", app_config.relay_addr);

    let (command_tx, command_rx) = mpsc::channel(100);
    tokio::spawn(network::relay::serve(listener, relay.clone(), command_tx));
    tokio::spawn(CommandHandler::new(Arc::clone(&store), relay.clone()).run(command_rx));

    let mut session = Session::new(
        WsUpstream::new(app_config.upstream_url.clone()),
        FileAuthState::new(&app_config.auth_dir),
        relay.clone(),
        store,
        SessionSettings::from(&app_config),
    );

    let stopped = tokio::select! {
        stopped = session.run() => stopped,
        _ = signal::ctrl_c() => {
            log::info!("Received shutdown signal, stopping bridge...");
            relay.detach();
            return Ok(());
        }
    };

    match stopped {
        BridgeError::TerminalLogout => {
            log::error!(
                "Session logged out. Remove {} and restart to pair again",
                app_config.auth_dir.display()
            );
            // Keep the relay up so the subscriber can still see status and send commands.
            signal::ctrl_c().await?;
            relay.detach();
            Ok(())
        }
        err => Err(err.into()),
    }
}
