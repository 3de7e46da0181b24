//! HTTP front end of framex.
//!
//! Clients submit an uploaded file id with `POST /process`, poll
//! `GET /process/:id/status`, list jobs with `GET /jobs` and cancel with
//! `DELETE /process/:id`. Jobs are written to the job store and their ids
//! pushed onto the work queue; workers live in `framex-worker`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::JobService;
pub use state::AppState;
