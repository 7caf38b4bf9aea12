pub mod body;
pub mod calibrate;
pub mod gate;

pub use body::PoseExtractor;
pub use calibrate::Calibrator;
pub use gate::{GateReport, HandDispatch, JointDispatch, UpdateGate};
