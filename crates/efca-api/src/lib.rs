//! EFCA-ADAPT API - Monitoring and control web service
//!
//! [`router`] builds the axum application; [`start_background_service`]
//! runs it on its own thread with a dedicated tokio runtime and hands back a
//! [`ServiceHandle`] for stopping and joining it.

pub mod routes;
pub mod service;

pub use routes::{AppState, router};
pub use service::{ServiceExit, ServiceHandle, start_background_service};
