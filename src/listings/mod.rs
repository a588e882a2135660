pub mod dto;
pub mod handlers;
pub mod repo;
pub mod sweep;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::router()
}
