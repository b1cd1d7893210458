//! katmon-dashboard - read-only HTTP view of the monitor.
//!
//! The event loop publishes a [`katmon_cmc::MonitorSnapshot`] into a
//! [`DashboardState`] after every iteration; request handlers only ever
//! read the latest published snapshot.
//!
//! ```text
//!  event loop ── publish ──▶ DashboardState ◀── read ── axum handlers
//!
//!  GET /                               static HTML page
//!  GET /api/cmcs                       all CMCs plus the size ranking
//!  GET /api/cmcs/{cmc}                 one CMC (1-based position)
//!  GET /api/cmcs/{cmc}/arrays/{array}  array detail (position or name)
//!  GET /api/arrays/{rank}              array detail by global size rank
//!  GET /metrics                        Prometheus text exposition
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use katmon_dashboard::{DashboardConfig, DashboardState, run_server};
//!
//! let state = DashboardState::new();
//! let config = DashboardConfig::default();
//! tokio::spawn(async move {
//!     if let Err(e) = run_server(state, config, std::future::pending()).await {
//!         tracing::error!(error = %e, "Dashboard server failed");
//!     }
//! });
//! ```

mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, AppState};
pub use state::DashboardState;
pub use types::{ArraySummary, CmcList, CmcSummary, ErrorBody};
