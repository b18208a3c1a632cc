pub mod api;
pub mod config;
pub mod errors;
pub mod kv;
pub mod state;
pub mod store;

pub use state::AppState;

use axum::Router;

/// Assemble the application router for the given state.
pub fn create_app(state: AppState) -> Router {
    api::router(&state).with_state(state)
}
