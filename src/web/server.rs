use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::radio::{RadioManager, SerialConnector};
use crate::store::FileStore;

use super::api::field_tests as field_test_handlers;
use super::api::radio as radio_handlers;
use super::api_doc::ApiDoc;
use super::config::Config;
use super::stream;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FileStore>,
    pub radio: RadioManager,
}

pub async fn run_server(config: Config) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let connector = SerialConnector::new(config.radio.port.clone(), config.radio.baud_rate);
    let radio = RadioManager::new(Arc::new(connector), config.radio.trace_timeout);
    let store = FileStore::new(config.store.base_folder.clone());

    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(store),
        radio,
    };

    log::info!("Radio device {}", state.radio.device());
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Phone stream
        .route("/ws/signal", get(stream::signal_stream))
        // Field test API endpoints
        .route(
            "/api/field_tests",
            post(field_test_handlers::start_field_test),
        )
        .route(
            "/api/field_tests/{id}",
            get(field_test_handlers::get_field_test),
        )
        .route(
            "/api/field_tests/{id}/end",
            post(field_test_handlers::end_field_test),
        )
        // Radio API endpoints
        .route("/api/radio/status", get(radio_handlers::status))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
