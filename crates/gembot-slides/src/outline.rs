//! Tag protocol between the bot and the model for slide outlines.
//!
//! The model is asked to mark each slide with a layout tag and wrap every field
//! in `[FIELD]…[/FIELD]`, separating slides with `[SLIDEBREAK]`.

use std::sync::OnceLock;

use regex::Regex;

pub const SLIDE_BREAK: &str = "[SLIDEBREAK]";

const TITLE_SLIDE: &str = "[L_TS]";
const CONTENT_SLIDE: &str = "[L_CS]";
const IMAGE_SLIDE: &str = "[L_IS]";
const THANKS_SLIDE: &str = "[L_THS]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slide {
    Title {
        title: String,
        subtitle: String,
    },
    Content {
        title: String,
        content: String,
    },
    Image {
        title: String,
        content: String,
        /// Stock-image search query.
        query: String,
    },
    Thanks {
        title: String,
    },
}

impl Slide {
    pub fn title(&self) -> &str {
        match self {
            Slide::Title { title, .. }
            | Slide::Content { title, .. }
            | Slide::Image { title, .. }
            | Slide::Thanks { title } => title,
        }
    }
}

pub fn outline_prompt(topic: &str, count: u32) -> String {
    format!(
        "Create an outline for a slideshow presentation on the topic of {topic} which is {count} \
slides long. Make sure it is {count} long.

You are allowed to use the following slide types:
Title Slide - (Title, Subtitle)
Content Slide - (Title, Content)
Image Slide - (Title, Content, Image)
Thanks Slide - (Title)

Put this tag before the Title Slide: {TITLE_SLIDE}
Put this tag before the Content Slide: {CONTENT_SLIDE}
Put this tag before the Image Slide: {IMAGE_SLIDE}
Put this tag before the Thanks Slide: {THANKS_SLIDE}

Put this tag before the Title: [TITLE]
Put this tag after the Title: [/TITLE]
Put this tag before the Subtitle: [SUBTITLE]
Put this tag after the Subtitle: [/SUBTITLE]
Put this tag before the Content: [CONTENT]
Put this tag after the Content: [/CONTENT]
Put this tag before the Image: [IMAGE]
Put this tag after the Image: [/IMAGE]

Put \"{SLIDE_BREAK}\" after each slide"
    )
}

/// Parse model output into slides. Segments without a layout tag are skipped.
pub fn parse_outline(text: &str) -> Vec<Slide> {
    text.split(SLIDE_BREAK).filter_map(parse_slide).collect()
}

fn parse_slide(segment: &str) -> Option<Slide> {
    let field = |tag: &str| between_tags(segment, &format!("[{tag}]"), &format!("[/{tag}]"));

    let layout = [TITLE_SLIDE, CONTENT_SLIDE, IMAGE_SLIDE, THANKS_SLIDE]
        .into_iter()
        .find(|tag| segment.contains(tag))?;

    let slide = match layout {
        TITLE_SLIDE => Slide::Title {
            title: field("TITLE"),
            subtitle: field("SUBTITLE"),
        },
        CONTENT_SLIDE => Slide::Content {
            title: field("TITLE"),
            content: field("CONTENT"),
        },
        IMAGE_SLIDE => Slide::Image {
            title: field("TITLE"),
            content: field("CONTENT"),
            // Content may embed its own image span; the slide's query is the last one.
            query: spans(segment, "[IMAGE]", "[/IMAGE]")
                .last()
                .map(|q| q.trim().to_string())
                .unwrap_or_default(),
        },
        _ => Slide::Thanks {
            title: field("TITLE"),
        },
    };
    Some(slide)
}

/// Concatenated text of every `start…end` span, with embedded `[IMAGE]…[/IMAGE]`
/// spans removed. Empty when no complete span exists.
pub fn between_tags(text: &str, start: &str, end: &str) -> String {
    let raw = spans(text, start, end).concat();
    image_span_re().replace_all(&raw, "").trim().to_string()
}

fn spans<'a>(text: &'a str, start: &str, end: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(s) = text[cursor..].find(start) {
        let body = cursor + s + start.len();
        let Some(e) = text[body..].find(end) else {
            break;
        };
        out.push(&text[body..body + e]);
        cursor = body + e + end.len();
    }
    out
}

fn image_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[IMAGE\].*?\[/IMAGE\]").expect("valid regex"))
}
