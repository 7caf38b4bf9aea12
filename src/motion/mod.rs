pub mod file;
pub mod player;
pub mod recorder;
pub mod sequence;
pub mod stopwatch;

pub use file::{load, save, MotionFileError};
pub use player::{play, PlaybackOutcome, Player};
pub use recorder::Recorder;
pub use sequence::{MotionRecord, MotionSequence};
pub use stopwatch::Stopwatch;
