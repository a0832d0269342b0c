//! API routes

pub mod auth;
pub mod health;
pub mod users;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let basic = || middleware::from_fn_with_state(state.basic_auth(), require_auth);

    // `/user` is public for registration and Basic-protected otherwise
    let user_route = post(users::create_user).merge(
        get(users::get_user)
            .patch(users::update_user)
            .delete(users::delete_user)
            .route_layer(basic()),
    );

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/user", user_route)
        .route("/user/activate", get(users::activate_user))
        .route("/user/forgot_password", post(users::forgot_password))
        .route("/user/reset_password", post(users::reset_password));

    // Routes that take HTTP Basic credentials on every request
    let basic_routes = Router::new()
        .route("/change_password", post(users::change_password))
        .route("/auth/token", post(auth::issue_token))
        .route_layer(basic());

    // Routes that take a bearer token minted by /auth/token
    let bearer_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.bearer_auth(), require_auth));

    Router::new()
        .merge(health_routes)
        .merge(public_routes)
        .merge(basic_routes)
        .merge(bearer_routes)
        .with_state(state)
}
