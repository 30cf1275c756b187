pub mod session;
pub mod signal;
pub mod violation;

pub use session::{
    count_by_category, CurrentConditions, SessionStatus, SessionSummary, StatusReport,
};
pub use signal::{DetectedObject, Signal};
pub use violation::{Severity, Violation, ViolationType};
