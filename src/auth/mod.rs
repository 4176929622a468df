use crate::state::AppState;
use axum::Router;

pub mod codes;
mod claims;
mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod repo_types;

pub use extractors::AdminSession;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::session_routes())
}
