//! Operator dashboard: a small axum server with an HTML page, JSON status
//! endpoints and a form for the runtime tunables.

pub mod api;
pub mod page;

pub use api::{ApiError, ConfigView, apply_updates, build_app, create_router, run_dashboard, spawn_dashboard};
