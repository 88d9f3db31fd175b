use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json,
    Router,
};
use release_ui::Assets as UiAssets;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::http_objects::{
    HealthStatus,
    ProductGroups,
    ProductReleaseList,
    ProductStats,
    Release,
    ReleaseAPIError,
    ReleaseList,
    ReleaseMetadata,
    ReleaseStats,
};

pub mod download;
pub mod releases;
pub mod routes_state;

use download::download_release;
use releases::{list_product_releases, list_products, list_releases, release_stats};
pub use routes_state::RouteState;

#[derive(OpenApi)]
#[openapi(
        paths(
            health,
            releases::list_releases,
            releases::list_product_releases,
            releases::list_products,
            releases::release_stats,
            download::download_release,
        ),
        components(
            schemas(
                HealthStatus,
                ProductGroups,
                ProductReleaseList,
                ProductStats,
                Release,
                ReleaseAPIError,
                ReleaseList,
                ReleaseMetadata,
                ReleaseStats,
            )
        ),
        tags(
            (name = "releases", description = "Release distribution API")
        )
    )]
pub struct ApiDoc;

pub fn create_routes(route_state: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs/swagger").url("/docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(ui_index_handler))
        .route("/ui/{*rest}", get(ui_handler))
        .route("/health", get(health))
        .route("/api/releases", get(list_releases))
        .route("/api/releases/{product}", get(list_product_releases))
        .route("/api/products", get(list_products))
        .route("/api/stats", get(release_stats))
        .route("/download/{*key}", get(download_release))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
        .with_state(route_state)
}

fn ui_asset(path: &str) -> Response {
    match UiAssets::get(path).or_else(|| UiAssets::get("index.html")) {
        Some(content) => (
            [(header::CONTENT_TYPE, content.metadata.mimetype().to_string())],
            content.data,
        )
            .into_response(),
        None => ReleaseAPIError::not_found("ui assets missing").into_response(),
    }
}

#[tracing::instrument(skip_all)]
async fn ui_index_handler() -> Response {
    ui_asset("index.html")
}

#[tracing::instrument(skip_all)]
async fn ui_handler(Path(url): Path<String>) -> Response {
    ui_asset(url.trim_start_matches('/'))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "releases",
    responses(
        (status = 200, description = "Server is up", body = HealthStatus)
    ),
)]
async fn health(State(state): State<RouteState>) -> (StatusCode, Json<HealthStatus>) {
    (
        StatusCode::OK,
        Json(HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            env: state.config.env.clone(),
        }),
    )
}
