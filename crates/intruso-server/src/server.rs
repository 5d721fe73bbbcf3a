use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;

use intruso_common::words::WordSource;

use crate::config::ServerConfig;
use crate::connection;
use crate::profiles::{MemoryProfileStore, ProfileStore};
use crate::session::Sessions;
use crate::store::RoomStore;

pub struct ServerState {
    pub rooms: RoomStore,
    pub sessions: RwLock<Sessions>,
    pub profiles: Arc<dyn ProfileStore>,
    pub words: Arc<dyn WordSource>,
    pub config: ServerConfig,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(config: ServerConfig, profiles: Arc<dyn ProfileStore>, words: Arc<dyn WordSource>) -> SharedState {
        Arc::new(Self {
            rooms: RoomStore::new(),
            sessions: RwLock::new(Sessions::new()),
            profiles,
            words,
            config,
        })
    }
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse()?;
    let words = Arc::new(config.load_word_bank());
    let state = ServerState::new(config, Arc::new(MemoryProfileStore::new()), words);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        // Enforce max connections
        let conn_count = state.sessions.read().await.len();
        if conn_count >= state.config.max_connections {
            tracing::warn!(
                "Rejecting connection from {} (max {} reached)",
                peer_addr,
                state.config.max_connections
            );
            drop(stream);
            continue;
        }

        tracing::info!(
            "New connection from {} ({}/{})",
            peer_addr,
            conn_count + 1,
            state.config.max_connections
        );

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = connection::handle_connection(stream, state).await {
                tracing::warn!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}
