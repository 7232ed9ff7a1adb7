#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("slide count must be between 1 and {max}, got {requested}")]
    InvalidCount { requested: i64, max: u32 },

    #[error("outline generation failed: {0}")]
    Generation(String),

    #[error("the outline contained no recognizable slides")]
    NoSlides,

    #[error("image search failed: {0}")]
    ImageSearch(String),
}
