//! Read-only status API
//!
//! - `GET /health` - liveness
//! - `GET /v1/nodes` - eligible nodes with their peer counters
//! - `GET /v1/nodes/health` - health-check worker state per node
//! - `GET /v1/workers` - registered workers, schedules and completed passes

pub mod handlers;
pub mod state;

pub use handlers::create_router;
pub use state::AppState;
