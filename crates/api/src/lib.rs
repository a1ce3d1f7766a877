//! HTTP surface: axum routes over the command dispatcher and the read-side
//! projections, plus the SSE fan-out for external notification consumers.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
