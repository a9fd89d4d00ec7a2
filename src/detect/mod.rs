//! Transport auto-detection
//!
//! Decides, from the first bytes of each connection, which wire convention
//! the peer uses and turns the connection into a stream of framed messages.

mod pipeline;
mod state;

pub use pipeline::Detector;
pub use state::{ConnectionInfo, DetectionPlan, DetectionState, StagePolicy};
