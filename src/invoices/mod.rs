mod cursor;
mod dto;
pub mod handlers;
pub mod repo_types;
pub mod service;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::admin_routes())
        .merge(handlers::public_routes())
}
