use regex::Regex;
use std::sync::LazyLock;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.*?)</title>").unwrap());
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta name="description" content="(.*?)""#).unwrap());
static KEYWORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta name="keywords" content="(.*?)""#).unwrap());
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<body[^>]*>(.*?)</body>").unwrap());
static DESCRIPTION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta name="description" content="(.*?)">"#).unwrap());
static HEAD_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<head[^>]*>").unwrap());

/// Metadata pulled out of a page's raw markup. Every field defaults to the
/// empty string when its marker is absent or malformed.
#[derive(Debug, Default, Clone)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub body: String,
}

/// Extract title, description, keywords and the body fragment from raw page
/// markup. First match wins for each field; nothing here ever fails — this is
/// deliberately lenient text scanning, not a full HTML parser.
pub fn extract(raw: &str) -> PageMeta {
    PageMeta {
        title: first_group(&TITLE_RE, raw),
        description: first_group(&DESCRIPTION_RE, raw),
        keywords: first_group(&KEYWORDS_RE, raw),
        body: first_group(&BODY_RE, raw),
    }
}

fn first_group(re: &Regex, raw: &str) -> String {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Replace the inner span of the first body element with `body`, preserving
/// the open/close tags and every byte outside the matched span. Returns the
/// input unchanged if no body element is found.
pub fn replace_body(raw: &str, body: &str) -> String {
    match BODY_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => splice(raw, inner.start(), inner.end(), body),
        None => raw.to_string(),
    }
}

/// Replace the first title element's text with the HTML-escaped `title`.
pub fn rewrite_title(raw: &str, title: &str) -> String {
    match TITLE_RE.find(raw) {
        Some(m) => {
            let tag = format!("<title>{}</title>", escape_html(title));
            splice(raw, m.start(), m.end(), &tag)
        }
        None => raw.to_string(),
    }
}

/// Rewrite the first description meta element, or insert one immediately
/// after the opening head tag if the page has none. Existence is decided by
/// the loose `<meta name="description"` presence check, so a description tag
/// in a non-standard shape (self-closing, reordered attributes) blocks the
/// insert and is left as-is rather than duplicated. Pages without a head tag
/// are returned unchanged.
pub fn upsert_description(raw: &str, description: &str) -> String {
    let tag = format!(
        r#"<meta name="description" content="{}">"#,
        escape_html(description)
    );
    if raw.contains(r#"<meta name="description""#) {
        return match DESCRIPTION_TAG_RE.find(raw) {
            Some(m) => splice(raw, m.start(), m.end(), &tag),
            None => raw.to_string(),
        };
    }
    match HEAD_OPEN_RE.find(raw) {
        Some(m) => {
            let insert = format!("\n    {tag}");
            splice(raw, m.end(), m.end(), &insert)
        }
        None => raw.to_string(),
    }
}

/// Escape a value for embedding in HTML text or a double-quoted attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// Byte-splice `replacement` over `raw[start..end]`.
fn splice(raw: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(raw.len() - (end - start) + replacement.len());
    out.push_str(&raw[..start]);
    out.push_str(replacement);
    out.push_str(&raw[end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>About Us</title>
    <meta name="description" content="Who we are">
    <meta name="keywords" content="about, team">
</head>
<body class="inner">
    <h1>About</h1>
    <p>Hello.</p>
</body>
</html>"#;

    #[test]
    fn extracts_all_fields() {
        let meta = extract(PAGE);
        assert_eq!(meta.title, "About Us");
        assert_eq!(meta.description, "Who we are");
        assert_eq!(meta.keywords, "about, team");
        assert_eq!(meta.body, "\n    <h1>About</h1>\n    <p>Hello.</p>\n");
    }

    #[test]
    fn missing_markers_yield_empty_fields() {
        let meta = extract("<p>not a full page</p>");
        assert_eq!(meta.title, "");
        assert_eq!(meta.description, "");
        assert_eq!(meta.keywords, "");
        assert_eq!(meta.body, "");
    }

    #[test]
    fn first_title_wins() {
        let raw = "<title>One</title><title>Two</title>";
        assert_eq!(extract(raw).title, "One");
    }

    #[test]
    fn body_match_spans_newlines_and_keeps_attributes() {
        let out = replace_body(PAGE, "<p>New body</p>");
        assert!(out.contains("<body class=\"inner\"><p>New body</p></body>"));
        // Everything outside the body span is untouched.
        assert!(out.contains("<title>About Us</title>"));
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.ends_with("</html>"));
    }

    #[test]
    fn replace_body_without_body_is_identity() {
        assert_eq!(replace_body("<p>x</p>", "new"), "<p>x</p>");
    }

    #[test]
    fn body_with_dollar_signs_is_inserted_verbatim() {
        let out = replace_body(PAGE, "<p>$100 or $1</p>");
        assert!(out.contains("<p>$100 or $1</p>"));
    }

    #[test]
    fn rewrite_title_escapes_html() {
        let out = rewrite_title(PAGE, "Tom & Jerry <3");
        assert!(out.contains("<title>Tom &amp; Jerry &lt;3</title>"));
        assert!(!out.contains("About Us"));
    }

    #[test]
    fn upsert_description_rewrites_existing_tag() {
        let out = upsert_description(PAGE, "New \"summary\"");
        assert!(out.contains(r#"<meta name="description" content="New &quot;summary&quot;">"#));
        assert!(!out.contains("Who we are"));
    }

    #[test]
    fn upsert_description_inserts_after_head_when_absent() {
        let raw = "<html><head>\n<title>T</title></head><body></body></html>";
        let out = upsert_description(raw, "Fresh");
        assert!(
            out.contains("<head>\n    <meta name=\"description\" content=\"Fresh\">\n<title>")
        );
    }

    #[test]
    fn upsert_description_never_duplicates_nonstandard_tag() {
        let raw = r#"<html><head><meta name="description" content="old" /></head><body></body></html>"#;
        let out = upsert_description(raw, "new");
        assert_eq!(out.matches(r#"<meta name="description""#).count(), 1);
        // Non-standard shape: left as-is, not rewritten.
        assert_eq!(out, raw);
    }

    #[test]
    fn upsert_description_without_head_is_identity() {
        let raw = "<body><p>bare</p></body>";
        assert_eq!(upsert_description(raw, "x"), raw);
    }
}
