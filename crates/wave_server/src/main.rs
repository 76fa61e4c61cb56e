//! Wave Defense - Authority Server
//!
//! Usage: `wave_server [config.ron]`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wave_core::simulation::Match;
use wave_server::network::serve;
use wave_server::{spawn_session, Host, ServerConfig, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Wave Defense authority server");

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let world = config.load_world()?;
    let match_config = config.load_match()?;
    let remote_slots = match_config.participants.len() as u32 - 1;
    let game = Match::new(world, &match_config)?;

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, remote_slots, "Listening");

    let (handle, session) = spawn_session(Host::new(game));
    let relay = tokio::spawn(serve(listener, handle, remote_slots));

    let host = session.await.map_err(|e| ServerError::Io(e.into()))??;
    relay.abort();
    tracing::info!(
        step = host.game().step(),
        outcome = ?host.game().outcome(),
        state_hash = host.game().state_hash(),
        "Server stopped"
    );
    Ok(())
}
