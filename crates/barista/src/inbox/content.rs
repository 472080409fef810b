//! HTML body handling: plain-text conversion and link extraction.
//!
//! Both functions are regex based and total. Malformed markup degrades to
//! best-effort stripping, never to an error.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Links longer than this are not persisted.
pub const MAX_LINK_LENGTH: usize = 2048;

/// Maximum stored link title length, in characters.
const MAX_TITLE_LENGTH: usize = 255;

/// Fallback title length when a URL has no host.
const URL_TITLE_PREFIX: usize = 50;

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").unwrap());
static PARAGRAPH_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:p|h[1-6])\s*>").unwrap());
static BLOCK_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:div|li|tr)\s*>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a\s*>"#,
    )
    .unwrap()
});

const EXCLUDED_SCHEMES: [&str; 4] = ["mailto:", "tel:", "javascript:", "data:"];
const EXCLUDED_FRAGMENTS: [&str; 4] = ["unsubscribe", "tracking", "click.", "emailtracking"];

/// A hyperlink found in a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedLink {
    pub url: String,
    pub title: String,
}

/// Converts an HTML body to readable plain text.
pub fn to_plain_text(html: &str) -> String {
    let text = STYLE_BLOCK.replace_all(html, "");
    let text = SCRIPT_BLOCK.replace_all(&text, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = PARAGRAPH_CLOSE.replace_all(&text, "\n\n");
    let text = BLOCK_CLOSE.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

/// Extracts the distinct, non-tracking hyperlinks of an HTML body in
/// document order.
pub fn extract_links(html: &str) -> Vec<ExtractedLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in ANCHOR.captures_iter(html) {
        let raw = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        let url = decode_entities(raw.trim());

        if url.is_empty() || is_excluded(&url) || !seen.insert(url.clone()) {
            continue;
        }

        let inner = caps.get(4).map_or("", |m| m.as_str());
        let title = link_title(&url, inner);
        links.push(ExtractedLink { url, title });
    }

    links
}

fn is_excluded(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.starts_with('#')
        || EXCLUDED_SCHEMES.iter().any(|s| lower.starts_with(s))
        || EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Anchor text, else the URL's host, else a URL prefix; clamped.
fn link_title(url: &str, inner_html: &str) -> String {
    let stripped = ANY_TAG.replace_all(inner_html, "");
    let decoded = decode_entities(&stripped);
    let text = WHITESPACE_RUN.replace_all(decoded.trim(), " ");

    let title = if !text.is_empty() {
        text.into_owned()
    } else if let Some(host) = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    {
        host
    } else {
        url.chars().take(URL_TITLE_PREFIX).collect()
    };

    title.chars().take(MAX_TITLE_LENGTH).collect()
}

/// Decodes the small entity set mail clients commonly emit. `&amp;` goes
/// last so `&amp;lt;` stays a literal `&lt;`.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_separated_by_one_blank_line() {
        assert_eq!(to_plain_text("<p>A</p><p>B</p>"), "A\n\nB");
    }

    #[test]
    fn test_plain_text_is_stable() {
        let plain = "Leg is loose.\n\nPlease send someone.";
        assert_eq!(to_plain_text(plain), plain);
        assert_eq!(to_plain_text(&to_plain_text(plain)), plain);
        assert_eq!(to_plain_text("   padded line   \n  next  "), "padded line\nnext");
    }

    #[test]
    fn test_style_and_script_removed_with_content() {
        let html = "<html><head><style type=\"text/css\">p { color: red; }</style>\
                    <SCRIPT>alert('x')</SCRIPT></head><body><p>Hello</p></body></html>";
        assert_eq!(to_plain_text(html), "Hello");
    }

    #[test]
    fn test_block_tags_become_newlines() {
        let html = "Line one<br>Line two<br/>Line three<br><div>Cell</div><ul><li>a</li><li>b</li></ul>\
                    <h2>Heading</h2>After";
        assert_eq!(
            to_plain_text(html),
            "Line one\nLine two\nLine three\nCell\na\nb\nHeading\n\nAfter"
        );
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(
            to_plain_text("Fish&nbsp;&amp;&nbsp;chips &lt;b&gt; &quot;q&quot; it&#39;s &apos;x&apos; &amp;lt;"),
            "Fish & chips <b> \"q\" it's 'x' &lt;"
        );
    }

    #[test]
    fn test_blank_runs_collapse() {
        assert_eq!(to_plain_text("a<br><br><br><br><br>b"), "a\n\nb");
    }

    #[test]
    fn test_malformed_html_does_not_panic() {
        assert_eq!(to_plain_text("<p>unterminated <b"), "unterminated <b");
        assert_eq!(to_plain_text(""), "");
    }

    #[test]
    fn test_unsubscribe_link_excluded() {
        assert!(extract_links(r#"<a href="https://x.com/unsubscribe?id=1">stop</a>"#).is_empty());
    }

    #[test]
    fn test_noise_links_excluded() {
        let html = r##"
            <a href="mailto:a@b.com">mail</a>
            <a href="TEL:+123">call</a>
            <a href="javascript:void(0)">js</a>
            <a href="data:text/plain,hi">data</a>
            <a href="#top">top</a>
            <a href="https://click.example.com/x">promo</a>
            <a href="https://example.com/Tracking/pixel">t</a>
            <a href="https://example.com/ok">ok</a>
        "##;
        let links = extract_links(html);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/ok");
    }

    #[test]
    fn test_duplicate_urls_first_wins() {
        let html = r#"<a href="https://example.com/a">First</a> <a href='https://example.com/a'>Second</a>
                      <a href=https://example.com/b>B</a>"#;
        let links = extract_links(html);
        assert_eq!(
            links,
            vec![
                ExtractedLink {
                    url: "https://example.com/a".to_string(),
                    title: "First".to_string()
                },
                ExtractedLink {
                    url: "https://example.com/b".to_string(),
                    title: "B".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_title_fallbacks() {
        let links = extract_links(
            r#"<a class="btn" href="https://docs.example.com/guide?a=1&amp;b=2"><img src="x.png"></a>
               <a href="relative/path/that/is/quite/long/and/keeps/going/past/fifty/characters">  </a>"#,
        );
        assert_eq!(links[0].url, "https://docs.example.com/guide?a=1&b=2");
        assert_eq!(links[0].title, "docs.example.com");
        assert_eq!(links[1].title.chars().count(), 50);
    }

    #[test]
    fn test_title_clamped_and_whitespace_collapsed() {
        let long = "word ".repeat(100);
        let html = format!(r#"<a href="https://example.com"><b>Read</b>
            more</a><a href="https://example.org">{}</a>"#, long);
        let links = extract_links(&html);
        assert_eq!(links[0].title, "Read more");
        assert_eq!(links[1].title.chars().count(), 255);
    }
}
