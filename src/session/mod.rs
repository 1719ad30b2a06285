// Session module - ROLE MANAGEMENT
// Listen/connect role switching and the per-session worker

mod context;
mod manager;
mod worker;

pub use context::SessionContext;
pub use manager::{RolePhase, SessionManager, SessionRole};
pub use worker::{run_session, SessionEnd};
