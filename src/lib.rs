//! course-gate: rate-limiting gateway for the education center API.
//!
//! Every `/api` request is keyed by client, checked against the fixed-window
//! budget of its route group, and forwarded to a healthy upstream when
//! admitted. Over-budget clients get a 429 envelope.

pub mod client_id;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod load_balancer;
pub mod metrics;
pub mod middleware;
pub mod path;
pub mod policy;
pub mod routes;
pub mod state;

pub use gate::{Decision, RequestGate};
pub use policy::{GatePolicy, RouteGuards, RouteLimit};
pub use routes::router;
pub use state::AppState;
