pub mod joint;
pub mod source;

pub use joint::{Body, BodyFrame, HandState, Joint, JointType, Pose};
pub use source::{NoSensor, PoseFile, PoseSource, ScriptedSource};
