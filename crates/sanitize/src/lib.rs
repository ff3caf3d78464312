//! Markdown to safe HTML.
//!
//! Input is rendered as CommonMark (with tables and strikethrough) and the
//! result is cleaned against one of three allow-lists. Scripts, styles and
//! event handler attributes never survive; links and images accept only
//! `http`/`https` targets.

use ammonia::{Builder, UrlRelative};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use std::collections::{HashMap, HashSet};

const COMMENT_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "b", "i", "u", "s", "del", "code", "pre", "blockquote", "ul", "ol",
    "li", "a",
];

const GENERAL_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "table", "thead", "tbody", "tr", "th", "td",
];

const EVENT_TAGS: &[&str] = &["img"];

const LINK_REL: &str = "noopener noreferrer nofollow";

/// Allow-list presets, from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Comment,
    General,
    Event,
}

static COMMENT: Lazy<Builder<'static>> = Lazy::new(|| build(Preset::Comment));
static GENERAL: Lazy<Builder<'static>> = Lazy::new(|| build(Preset::General));
static EVENT: Lazy<Builder<'static>> = Lazy::new(|| build(Preset::Event));

fn build(preset: Preset) -> Builder<'static> {
    let mut tags: HashSet<&'static str> = COMMENT_TAGS.iter().copied().collect();
    if matches!(preset, Preset::General | Preset::Event) {
        tags.extend(GENERAL_TAGS);
    }
    if preset == Preset::Event {
        tags.extend(EVENT_TAGS);
    }

    let mut tag_attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].into_iter().collect());
    if preset == Preset::Event {
        tag_attributes.insert("img", ["src", "alt", "title"].into_iter().collect());
    }

    let mut builder = Builder::default();
    builder
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .url_schemes(["http", "https"].into_iter().collect())
        .url_relative(UrlRelative::Deny)
        .link_rel(Some(LINK_REL))
        .set_tag_attribute_value("a", "target", "_blank");
    if preset == Preset::Event {
        builder.set_tag_attribute_value("img", "loading", "lazy");
    }
    builder
}

fn render_markdown(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(input, options);
    let mut output = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Render markdown and clean it with the given preset.
pub fn sanitize(input: &str, preset: Preset) -> String {
    let builder = match preset {
        Preset::Comment => &*COMMENT,
        Preset::General => &*GENERAL,
        Preset::Event => &*EVENT,
    };
    builder.clean(&render_markdown(input)).to_string()
}

pub fn sanitize_comment(input: &str) -> String {
    sanitize(input, Preset::Comment)
}

pub fn sanitize_general(input: &str) -> String {
    sanitize(input, Preset::General)
}

pub fn sanitize_event_content(input: &str) -> String {
    sanitize(input, Preset::Event)
}

/// Escape text for interpolation into HTML element content or quoted attributes.
pub fn escape_text(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_keeps_bold_and_strips_scripts() {
        let html = sanitize_comment("**bold** <script>alert(1)</script>");
        assert!(html.contains("<strong>bold</strong>"), "{html}");
        assert!(!html.contains("<script"), "{html}");
    }

    #[test]
    fn javascript_links_lose_their_target() {
        let html = sanitize_comment("[click](javascript:alert(1))");
        assert!(!html.contains("javascript:"), "{html}");
        assert!(html.contains("click"));
    }

    #[test]
    fn links_get_rel_and_target() {
        let html = sanitize_comment("[site](https://example.org)");
        assert!(html.contains(r#"href="https://example.org""#), "{html}");
        assert!(html.contains(r#"rel="noopener noreferrer nofollow""#), "{html}");
        assert!(html.contains(r#"target="_blank""#), "{html}");
    }

    #[test]
    fn event_handlers_and_styles_are_removed() {
        let html = sanitize_general(r#"<p onclick="steal()" style="color:red">hi</p><style>p{}</style>"#);
        assert!(!html.contains("onclick"), "{html}");
        assert!(!html.contains("style"), "{html}");
        assert!(html.contains("hi"));
    }

    #[test]
    fn headings_depend_on_preset() {
        assert!(!sanitize_comment("# Title").contains("<h1>"));
        assert!(sanitize_general("# Title").contains("<h1>Title</h1>"));
    }

    #[test]
    fn tables_and_strikethrough_render_for_general() {
        let html = sanitize_general("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"), "{html}");
        assert!(html.contains("<td>1</td>"), "{html}");
        assert!(html.contains("<del>gone</del>"), "{html}");
    }

    #[test]
    fn images_only_survive_in_event_preset() {
        let markdown = "![logo](https://example.org/logo.png)";
        assert!(!sanitize_general(markdown).contains("<img"));

        let html = sanitize_event_content(markdown);
        assert!(html.contains(r#"src="https://example.org/logo.png""#), "{html}");
        assert!(html.contains(r#"loading="lazy""#), "{html}");
    }

    #[test]
    fn non_http_image_sources_are_dropped() {
        let html = sanitize_event_content(r#"<img src="data:image/png;base64,AAAA" alt="x">"#);
        assert!(!html.contains("data:"), "{html}");
    }

    #[test]
    fn escape_text_covers_markup_characters() {
        assert_eq!(
            escape_text(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }
}
