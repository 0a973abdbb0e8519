//! # Trace-link Server
//!
//! HTTP front end for trace-link recovery jobs.
//!
//! Each submission is fingerprinted from its project name, pipeline variant
//! and uploaded inputs. Identical submissions share one pipeline run, and
//! clients poll or wait (bounded) on the returned request id.
//!
//! The server is built on Axum and uses:
//! - Redis for durable results (in-memory when unconfigured)
//! - an external executable for the pipeline itself

pub mod app;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use app::create_app;
pub use infra::app_state::AppState;
