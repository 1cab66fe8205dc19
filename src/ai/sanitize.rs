use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").expect("valid heading regex"));
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[*+-][ \t]+").expect("valid bullet regex"));
static BOLD_STARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold regex"));
static BOLD_UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([^_\n]+)__").expect("valid underline regex"));
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*").expect("valid italic regex")
});
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(^|[^\w])_([^_\s](?:[^_\n]*[^_\s])?)_($|[^\w])")
        .expect("valid underscore italic regex")
});
static BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank-run regex"));

/// Normalizes model output into plain prose.
///
/// Strips heading and bullet markers at line starts, emphasis and code
/// delimiters (keeping their inner text), collapses runs of blank lines to a
/// single blank line, and trims the result. `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_string();
    // One pass can expose new markers ("- - item", "**- x**"), so run to a fixed point.
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let out = HEADING.replace_all(text, "");
    let out = BULLET.replace_all(&out, "");
    let out = out.replace('`', "");
    let out = BOLD_STARS.replace_all(&out, "$1");
    let out = BOLD_UNDERSCORES.replace_all(&out, "$1");
    let out = ITALIC_STAR.replace_all(&out, "$1");
    let out = ITALIC_UNDERSCORE.replace_all(&out, "${1}${2}${3}");
    let out = out.replace("**", "");
    let out = BLANK_RUN.replace_all(&out, "\n\n");
    out.trim().to_string()
}
