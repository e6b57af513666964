use std::future::ready;

use axum::{
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::api::endpoints::{cleanup, dashboard_page, get_flag, list_flags, scan};
use crate::metrics::{setup_metrics_recorder, track_metrics};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let liveness = state.liveness.clone();
    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    // The dashboard posts to the bare paths; `/api/*` mirrors them for scripted clients.
    let api_router = Router::new()
        .route("/scan", post(scan))
        .route("/cleanup", post(cleanup))
        .route("/flags", get(list_flags))
        .route("/flags/:flag_id", get(get_flag));

    let enable_metrics = state.enable_metrics;
    let router = Router::new()
        .route("/", get(dashboard_page))
        .merge(status_router)
        .merge(api_router.clone())
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(cors)
        .with_state(state);

    if enable_metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
