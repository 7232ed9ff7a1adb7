//! Strips Discord markup tokens (`<@123>`, `<#456>`, `<:emoji:789>`) from user text.

use std::sync::OnceLock;

use regex::Regex;

fn markup_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // `[^>]+` stops at the first `>`, so adjacent tokens are removed one by one.
    TOKEN.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex is valid"))
}

/// Remove every `<...>` token from `raw`. Surrounding whitespace is kept.
pub fn sanitize(raw: &str) -> String {
    markup_token().replace_all(raw, "").into_owned()
}
