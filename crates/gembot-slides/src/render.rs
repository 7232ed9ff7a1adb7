//! Markdown rendering of a parsed deck. Slides are separated by `---`, which
//! Marp and most Markdown slide tools understand.

use std::sync::OnceLock;

use regex::Regex;

use crate::outline::Slide;

pub const FALLBACK_FILENAME: &str = "Generated_Presentation";

/// File name for a deck, derived from its first slide's title.
pub fn deck_filename(first_title: &str) -> String {
    let cleaned = first_title.replace(':', "");
    let cleaned = invalid_chars_re().replace_all(cleaned.trim(), "");
    let stem = cleaned.trim();
    if stem.is_empty() {
        format!("{FALLBACK_FILENAME}.md")
    } else {
        format!("{stem}.md")
    }
}

fn invalid_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"))
}

/// Render slides; `images[i]` is the resolved image URL for slide `i`.
pub fn render_markdown(slides: &[Slide], images: &[Option<String>]) -> String {
    let pages: Vec<String> = slides
        .iter()
        .enumerate()
        .map(|(i, slide)| render_slide(slide, images.get(i).and_then(|u| u.as_deref())))
        .collect();
    let mut out = pages.join("\n\n---\n\n");
    out.push('\n');
    out
}

fn render_slide(slide: &Slide, image: Option<&str>) -> String {
    match slide {
        Slide::Title { title, subtitle } if subtitle.is_empty() => format!("# {title}"),
        Slide::Title { title, subtitle } => format!("# {title}\n\n### {subtitle}"),
        Slide::Content { title, content } => format!("## {title}\n\n{content}"),
        Slide::Image {
            title,
            content,
            query,
        } => match image {
            Some(url) => format!("## {title}\n\n{content}\n\n![{query}]({url})"),
            None => format!("## {title}\n\n{content}"),
        },
        Slide::Thanks { title } => format!("# {title}"),
    }
}
