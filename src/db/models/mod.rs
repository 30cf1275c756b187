pub mod session;

pub use session::{FrameRecord, SessionRecord};
