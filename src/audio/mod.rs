pub mod drift;
pub mod output;
pub mod track;

#[cfg(feature = "audio-device")]
pub mod device;

pub use drift::DriftCorrector;
pub use output::{AudioOutput, ClockedAudioOutput};
pub use track::AudioTrack;

#[cfg(feature = "audio-device")]
pub use device::RodioAudioOutput;
