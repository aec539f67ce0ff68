//! Administrative HTTP API
//!
//! Small control surface used by the mobile UI:
//! - `GET /api/stats`: host CPU and memory
//! - `GET /api/status`: supervisor status
//! - `POST /api/restart-ide`: terminate the backend so the IDE relaunches it
//! - `POST /api/agent-mode`: send the agent-mode keyboard gesture
//! - `POST /api/restart-proxy`: queue a proxy restart on the supervisor
//!
//! There is no authentication; bind it to a trusted interface.

mod error;
mod host;
mod routes;
mod server;

pub use error::AdminError;
pub use host::{HostActions, HostStats, SystemHost};
pub use routes::ActionResponse;
pub use server::{build_router, AdminServer, AdminState};
