//! Slide deck generation: an outline from the generative model, stock images
//! from Pexels, rendered as a Markdown deck.

pub mod error;
pub mod generator;
pub mod images;
pub mod outline;
pub mod render;

pub use error::SlideError;
pub use generator::{Deck, SlideGenerator};
pub use images::{ImageSearch, PexelsClient};
pub use outline::{outline_prompt, parse_outline, Slide};
pub use render::{deck_filename, render_markdown};
