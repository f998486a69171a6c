pub mod editor;
pub mod scrub_bar;


pub use editor::*;
pub use scrub_bar::*;
