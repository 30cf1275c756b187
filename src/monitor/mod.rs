mod controller;
mod loop_worker;
mod source;

pub use controller::MonitorController;
pub use loop_worker::{monitor_loop, MonitorConfig, MonitorReport, StopReason};
pub use source::{ScriptedSource, SignalSource};
