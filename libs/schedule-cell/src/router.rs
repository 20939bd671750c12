use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route(
            "/doctor/{doctor_id}/availability",
            get(handlers::get_doctor_availability),
        )
        .route("/check-availability", post(handlers::check_availability));

    // Protected routes (doctor authentication required)
    let protected_routes = Router::new()
        .route("/doctor/my-schedule", get(handlers::get_my_schedule))
        .route("/doctor/update-schedule", put(handlers::update_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
