pub mod auth;
pub mod page;

use axum::{routing::post, Router};

use crate::AppState;

/// Host adapter routes: account endpoints and the page fallback
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/account/register", post(auth::register))
        .route("/account/sign_in", post(auth::sign_in))
        .route("/account/forgot_password", post(auth::forgot_password))
        .route("/account/reset_password", post(auth::reset_password))
        .route("/account/sign_out", post(auth::sign_out))
        .fallback(page::render_page)
        .with_state(state)
}
