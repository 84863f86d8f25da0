//! OCR Bot - chat bot endpoint that reads text out of images.

mod activity;
mod auth;
mod bot;
mod config;
mod connector;
mod dispatcher;
mod error;
mod fetcher;
mod links;
mod ocr;
#[cfg(test)]
mod testing;
mod triggers;

use activity::IncomingMessage;
use auth::{Authenticator, OpenIdKeyStore};
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use bot::Bot;
use config::BotConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    bot: Arc<Bot>,
    /// `None` when running without app credentials (local emulator).
    auth: Option<Arc<Authenticator>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_bot=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::from_env()?;
    if config.credentials.is_anonymous() {
        info!("No MICROSOFT_APP_ID set, running without platform authentication");
    }
    info!(
        "OCR backend: {} (language={}, token cache={})",
        config.ocr.base_url, config.ocr.language, config.cache_tokens
    );

    let client = reqwest::Client::new();
    let auth = (!config.credentials.is_anonymous()).then(|| {
        Arc::new(Authenticator::new(
            config.credentials.app_id.clone(),
            Arc::new(OpenIdKeyStore::new(client.clone())),
        ))
    });
    let bot = Bot::from_config(&config, client);
    let state = AppState {
        bot: Arc::new(bot),
        auth,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/messages", post(receive_activity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Accept an activity and handle it in the background.
///
/// The platform only needs an acknowledgement; the reply goes out through
/// the connector once OCR finishes. With app credentials configured, the
/// request must carry a platform token valid for the activity's serviceUrl.
async fn receive_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<IncomingMessage>,
) -> StatusCode {
    if let Some(auth) = &state.auth {
        let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if let Err(e) = auth.verify(authorization, &message.service_url).await {
            warn!("Rejected activity from {}: {}", message.source_channel, e);
            return StatusCode::UNAUTHORIZED;
        }
    }

    let span = info_span!(
        "activity",
        request_id = %Uuid::new_v4(),
        channel = %message.source_channel,
        activity_id = %message.id,
    );

    tokio::spawn(
        async move {
            let handled = state.bot.handle(&message).await;
            info!("Activity handled: {:?}", handled);
        }
        .instrument(span),
    );

    StatusCode::ACCEPTED
}
