//! Free-text sanitizer
//!
//! Session descriptions and lecturer bios arrive with embedded HTML. A
//! small whitelist (line/paragraph breaks, bold, italic) is translated
//! into the neutral style-tag vocabulary the mobile client renders;
//! everything else in angle brackets is stripped. The whitelisted markers
//! are swapped through placeholders so the strip pass cannot eat them.

use regex::Regex;
use std::sync::OnceLock;

const BOLD_OPEN: &str = "<Text style={styles.bold}>";
const ITALIC_OPEN: &str = "<Text style={styles.italic}>";
const STYLE_CLOSE: &str = "</Text>";

const BOLD_PLACEHOLDER: &str = "|Text style={styles.bold}|";
const ITALIC_PLACEHOLDER: &str = "|Text style={styles.italic}|";
const CLOSE_PLACEHOLDER: &str = "|/Text|";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("<[^>]*>").expect("valid regex"))
}

/// Sanitize free text: whitelist markup to style markers, strip the rest,
/// collapse whitespace runs to single spaces.
pub fn sanitize_markup(text: Option<&str>) -> Option<String> {
    let text = text?;
    if text.is_empty() {
        return None;
    }

    let mut out = text.to_string();

    for tag in ["<br>", "<br/>", "<br />", "<p>", "</p>"] {
        out = out.replace(tag, "\n");
    }
    for tag in ["<b>", "<B>"] {
        out = out.replace(tag, BOLD_PLACEHOLDER);
    }
    for tag in ["<em>", "<EM>"] {
        out = out.replace(tag, ITALIC_PLACEHOLDER);
    }
    for tag in ["</b>", "</B>", "</em>", "</EM>"] {
        out = out.replace(tag, CLOSE_PLACEHOLDER);
    }

    let out = tag_pattern().replace_all(&out, "");

    let out = out
        .replace(BOLD_PLACEHOLDER, BOLD_OPEN)
        .replace(ITALIC_PLACEHOLDER, ITALIC_OPEN)
        .replace(CLOSE_PLACEHOLDER, STYLE_CLOSE);

    Some(out.split_whitespace().collect::<Vec<_>>().join(" "))
}
