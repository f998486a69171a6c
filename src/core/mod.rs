pub mod clock;
pub mod config;
pub mod events;
pub mod markers;
pub mod project;
pub mod timefmt;

#[cfg(test)]
mod config_test;

pub use clock::*;
pub use config::*;
pub use events::*;
pub use markers::*;
pub use project::*;
pub use timefmt::*;
