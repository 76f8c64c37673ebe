use axum::error_handling::HandleErrorLayer;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handlers;
use crate::core::allocator::AddressAllocator;
use crate::core::config::VaultConfig;
use crate::core::errors::VaultError;
use crate::storage::{VaultStorage, VaultStorageTrait};

pub struct VaultServer {
    pub storage: Arc<dyn VaultStorageTrait>,
    pub allocator: Arc<AddressAllocator>,
    pub config: VaultConfig,
}

impl VaultServer {
    pub async fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let storage: Arc<dyn VaultStorageTrait> =
            Arc::new(VaultStorage::new_with_config(&config.storage).await?);
        let allocator =
            Arc::new(AddressAllocator::new(storage.clone(), config.derivation.clone()));
        Ok(Self { storage, allocator, config })
    }

    pub fn create_router(self) -> Router {
        let timeout = Duration::from_secs(self.config.server.request_timeout_seconds);
        let state = Arc::new(self);

        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/api/wallets", post(handlers::create_wallet))
            .route("/api/wallets/:name/tokens", post(handlers::issue_token))
            .route("/api/wallets/:name/addresses", post(handlers::allocate_address))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(|_: BoxError| async {
                        StatusCode::REQUEST_TIMEOUT
                    }))
                    .layer(TimeoutLayer::new(timeout)),
            )
            .layer(RequestBodyLimitLayer::new(64 * 1024))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {}", addr);

        axum::serve(listener, self.create_router()).await?;
        Ok(())
    }
}
