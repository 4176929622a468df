use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod repo_types;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::project_routes()
}
