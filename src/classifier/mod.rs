pub mod debounce;
pub mod rules;

pub use debounce::DebounceTracker;
pub use rules::{Classification, ClassifierState, FrameConditions, ViolationClassifier};
