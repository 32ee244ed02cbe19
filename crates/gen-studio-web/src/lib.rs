//! HTTP front-end: a thin hyper adapter over the generation engine.

pub mod rate_limit;
pub mod request;
pub mod response_helpers;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{handle_request, run};
pub use state::{AppState, SharedAppState};
