use std::sync::Arc;

use tracing::{info, warn};

use gembot_agent::{GenerationClient, GenerationResult};

use crate::error::SlideError;
use crate::images::ImageSearch;
use crate::outline::{outline_prompt, parse_outline, Slide};
use crate::render::{deck_filename, render_markdown};

/// A rendered deck, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub filename: String,
    pub markdown: String,
    pub slides: usize,
}

pub struct SlideGenerator {
    generator: Arc<dyn GenerationClient>,
    images: Option<Arc<dyn ImageSearch>>,
    max_slides: u32,
}

impl SlideGenerator {
    /// Without `images`, image slides are rendered as text only.
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        images: Option<Arc<dyn ImageSearch>>,
        max_slides: u32,
    ) -> Self {
        Self {
            generator,
            images,
            max_slides,
        }
    }

    pub fn max_slides(&self) -> u32 {
        self.max_slides
    }

    pub async fn generate(&self, topic: &str, count: i64) -> Result<Deck, SlideError> {
        let count = u32::try_from(count)
            .ok()
            .filter(|c| (1..=self.max_slides).contains(c))
            .ok_or(SlideError::InvalidCount {
                requested: count,
                max: self.max_slides,
            })?;

        info!(topic, count, provider = self.generator.name(), "generating slide outline");
        let outline = match self
            .generator
            .generate_text(&[], &outline_prompt(topic, count))
            .await
        {
            GenerationResult::Text(text) => text,
            GenerationResult::Failure(detail) => return Err(SlideError::Generation(detail)),
        };

        let slides = parse_outline(&outline);
        let Some(first) = slides.first() else {
            return Err(SlideError::NoSlides);
        };
        let filename = deck_filename(first.title());

        let mut images = Vec::with_capacity(slides.len());
        for slide in &slides {
            images.push(self.resolve_image(slide).await);
        }

        Ok(Deck {
            filename,
            markdown: render_markdown(&slides, &images),
            slides: slides.len(),
        })
    }

    async fn resolve_image(&self, slide: &Slide) -> Option<String> {
        let (Slide::Image { query, .. }, Some(search)) = (slide, &self.images) else {
            return None;
        };
        if query.is_empty() {
            return None;
        }
        match search.first_image(query).await {
            Ok(url) => url,
            Err(e) => {
                warn!(query = %query, error = %e, "image lookup failed, slide stays text-only");
                None
            }
        }
    }
}
