pub mod datasets;
pub mod error;
pub mod health;
pub mod optimize;
pub mod response;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, controller::AppState};

/// Request bodies are single records; anything larger is a client mistake.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

pub fn router(state: AppState, cfg: &Config) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", v1_router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(BODY_LIMIT_BYTES))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    cfg.server.request_timeout_secs,
                ))),
        )
        .layer(TraceLayer::new_for_http())
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/datasets/:data_set/facilities",
            get(datasets::list_facilities).post(datasets::add_facility),
        )
        .route(
            "/datasets/:data_set/facilities/:name",
            delete(datasets::delete_facility),
        )
        .route(
            "/datasets/:data_set/demand-points",
            get(datasets::list_demand_points).post(datasets::add_demand_point),
        )
        .route(
            "/datasets/:data_set/demand-points/:name",
            delete(datasets::delete_demand_point),
        )
        .route("/datasets/:data_set/flows", get(datasets::list_flows))
        .route("/datasets/:data_set/flows/summary", get(datasets::flow_summary))
        .route("/datasets/:data_set/optimize", post(optimize::optimize))
}
