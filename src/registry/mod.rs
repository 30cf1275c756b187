mod controller;
pub mod dashboard;
pub mod state;

pub use controller::{FrameResult, SessionRegistry};
pub use dashboard::{DashboardSnapshot, RecentViolation, ReviewEntry};
pub use state::{SessionSnapshot, SessionState};
