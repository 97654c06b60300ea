//! HTTP front end: one endpoint, operations picked by the `method` parameter.

mod handlers;

use crate::config::Config;
use crate::core::{Downloader, HttpTransport, Result, Transport};
use crate::extractors::Tv5Extractor;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use handlers::Params;

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Tv5Extractor>,
    pub downloader: Arc<Downloader>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config)?);
        Self::with_transport(transport, config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: &Config) -> Result<Self> {
        let extractor = Arc::new(Tv5Extractor::new(transport.clone(), config)?);
        let downloader = Arc::new(Downloader::new(extractor.clone(), transport, config));
        Ok(Self {
            extractor,
            downloader,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::dispatch_get).post(handlers::dispatch_post))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::new(config)?;
    let listener = tokio::net::TcpListener::bind(config.bind.as_str()).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
