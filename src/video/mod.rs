pub mod error;
pub mod ffmpeg;
pub mod pattern;
pub mod playback;
pub mod source;
pub mod stream;
pub mod task;
pub mod thumbnail;
pub mod waveform;

pub use error::*;
pub use ffmpeg::{FfmpegDecoder, FfmpegTools};
pub use pattern::TestPatternDecoder;
pub use playback::*;
pub use source::*;
pub use task::*;
pub use thumbnail::*;
pub use waveform::*;
