//! Development backend: serves the map REST API from memory, seeded with
//! the default imagery catalog and a few sample fleet entities.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

mod routes;
mod state;

pub use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = AppState::seeded();

    let app = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/map/layers", get(routes::list_layers))
        .route("/api/map/layers/{id}", get(routes::get_layer).put(routes::update_layer))
        .route(
            "/api/map/features",
            get(routes::list_features).post(routes::create_feature),
        )
        .route(
            "/api/map/features/{id}",
            get(routes::get_feature)
                .put(routes::update_feature)
                .delete(routes::delete_feature),
        )
        .route("/api/map/entities", get(routes::list_entities))
        .route("/api/map/locations", post(routes::upsert_location))
        .route("/api/map/view", get(routes::get_view).put(routes::save_view))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("OPSMAP_ADDR").unwrap_or_else(|_| "127.0.0.1:8095".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot bind {addr}: {e}");
            return;
        }
    };
    tracing::info!("Server running on http://{addr}");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
