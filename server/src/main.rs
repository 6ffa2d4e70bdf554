use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::dispatch::ActionSink;
use server::server::{EventServer, NullAnnouncer};
use std::sync::Arc;

/// Standalone embedding of the remote-events server: every resolved
/// action is logged instead of driving a real application.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// UDP port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Bind all interfaces instead of loopback only
    #[clap(long)]
    all_interfaces: bool,

    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "20")]
    max_clients: i32,

    /// Session timeout in seconds
    #[clap(short, long, default_value = "60")]
    timeout: u64,
}

struct LogSink;

impl ActionSink for LogSink {
    fn execute_builtin(&self, command: &str) -> bool {
        info!("Builtin requested: {}", command);
        true
    }

    fn translate_button_name(&self, name: &str) -> u32 {
        // Stable demo mapping; a real host consults its keymap here.
        name.bytes().fold(0u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(u32::from(b))
        })
    }

    fn play_feedback_sound(&self, action_id: u32, action_name: &str) {
        info!("Feedback sound for {} ({})", action_name, action_id);
    }

    fn dispatch_action(&self, action_id: u32, action_name: &str) -> bool {
        info!("Action dispatched: {} ({})", action_name, action_id);
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        bind_all_interfaces: args.all_interfaces,
        max_clients: args.max_clients,
        session_timeout_secs: args.timeout,
        ..Default::default()
    };

    let mut server = EventServer::new(config, Arc::new(LogSink), Arc::new(NullAnnouncer));
    let handle = server.handle();
    server.start();

    tokio::signal::ctrl_c().await?;
    info!(
        "Shutting down with {} client(s) connected",
        handle.client_count()
    );
    server.stop(true).await;

    Ok(())
}
