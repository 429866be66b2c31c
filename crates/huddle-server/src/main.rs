//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # One room "lobby" owned by alice, password "hunter22"
//! huddle-server --bind 0.0.0.0:3000 --room lobby:alice:hunter22
//!
//! # Hide whether a room id exists from failed joins
//! huddle-server --room lobby:alice:hunter22 --unify-auth-errors
//! ```

use std::sync::Arc;

use clap::Parser;
use huddle_core::{MemoryRoomRegistry, RoomRegistration};
use huddle_server::{AuthErrorPolicy, DriverConfig, Server, ServerRuntimeConfig, SystemEnv};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle chat room server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Presence and broadcast server for password-protected chat rooms")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Maximum chat message length in bytes
    #[arg(long, default_value = "2000")]
    max_message_len: usize,

    /// Outbound queue length per connection
    #[arg(long, default_value = "256")]
    outbound_buffer: usize,

    /// Report every credential rejection as "Invalid room or password"
    #[arg(long)]
    unify_auth_errors: bool,

    /// Register a room as ID:OWNER:PASSWORD (repeatable)
    #[arg(long = "room", value_name = "ID:OWNER:PASSWORD", value_parser = parse_room)]
    rooms: Vec<RoomRegistration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Parse `ID:OWNER:PASSWORD`. The password may itself contain `:`.
fn parse_room(value: &str) -> Result<RoomRegistration, String> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(room_id), Some(owner), Some(password)) => Ok(RoomRegistration {
            room_id: room_id.to_string(),
            owner: owner.to_string(),
            password: password.to_string(),
        }),
        _ => Err(format!("expected ID:OWNER:PASSWORD, got '{value}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle server starting");

    let env = SystemEnv::new();
    let registry = MemoryRoomRegistry::new();
    for room in args.rooms {
        registry.register(&env, room)?;
    }

    if registry.is_empty() {
        tracing::warn!("No rooms registered, every join will fail (use --room ID:OWNER:PASSWORD)");
    } else {
        tracing::info!(rooms = ?registry.room_ids(), "Credential store ready");
    }

    let auth_error_policy =
        if args.unify_auth_errors { AuthErrorPolicy::Unified } else { AuthErrorPolicy::Distinct };

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        outbound_buffer: args.outbound_buffer,
        driver: DriverConfig {
            max_connections: args.max_connections,
            max_message_len: args.max_message_len,
            auth_error_policy,
            ..Default::default()
        },
    };

    let server = Server::bind(config, Arc::new(registry)).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
