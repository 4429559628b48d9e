//! HTTP and WebSocket API for Mission Control.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `/api/agents/*` - Agent hierarchy, see [`agents`]
//! - `/api/traces/*` - Request traces, see [`traces`]
//! - `/api/gateway/*` - Gateway dispatch and health, see [`gateway`]
//! - `GET /ws` (also `/api/ws`) - Live change stream, `INIT` first

pub mod agents;
pub mod error;
pub mod gateway;
pub mod routes;
mod stream;
pub mod traces;

pub use routes::{router, serve, AppState};
