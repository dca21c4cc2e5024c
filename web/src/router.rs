use crate::controller::{health_check_controller, post_controller};
use crate::{sse_handler, AppState};
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use log::*;
use service::config::Config;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::openapi::server::Server;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Agent Timeline API"
        ),
        paths(
            health_check_controller::health_check,
            post_controller::index,
            post_controller::after,
            sse_handler::events,
        ),
        components(
            schemas(
                entity_api::post::PostWithAgent,
                post_controller::PostsResponse,
            )
        ),
        tags(
            (name = "agent_timeline", description = "Agent timeline posts and live events")
        )
    )]
struct ApiDoc;

/// Every route, mounted under the configured base path, with CORS applied.
pub fn define_routes(app_state: AppState) -> Router {
    let base_path = app_state.config.base_path();
    let cors = cors_layer(&app_state.config);

    let api = Router::new()
        .merge(health_routes(app_state.clone()))
        .merge(post_routes(app_state.clone()))
        .merge(event_routes(app_state));

    let router = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    };

    router
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", api_doc(&base_path)).path("/rapidoc"))
        .layer(cors)
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn post_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/posts", get(post_controller::index))
        .route("/posts/after/:timestamp", get(post_controller::after))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(sse_handler::events))
        .with_state(app_state)
}

fn api_doc(base_path: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if !base_path.is_empty() {
        doc.servers = Some(vec![Server::new(base_path)]);
    }
    doc
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
