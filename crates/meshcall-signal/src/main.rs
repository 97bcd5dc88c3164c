//! meshcall-signal: reference room-membership service.
//!
//! Tracks which WebSocket connections sit in which room and tells members
//! when peers arrive and leave. Media never passes through here; clients
//! connect to each other directly once they know who is in the room.

mod connection;
mod protocol;
mod rooms;

use clap::Parser;
use tokio::net::TcpListener;

use crate::connection::serve;
use crate::rooms::RoomStore;

#[derive(Parser)]
#[command(name = "meshcall-signal", about = "Room signaling service for meshcall")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 9000)]
    port: u16,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshcall_signal=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("meshcall-signal listening on {}", addr);

    serve(listener, RoomStore::new()).await;
    Ok(())
}
