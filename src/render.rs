//! Display-safe rendering of chat text.
//!
//! Everything shown in the widget goes through a [`MessageRenderer`].  Raw
//! text never reaches the display unescaped: the plain renderer escapes every
//! HTML-significant character, and the markdown renderer re-emits raw HTML as
//! escaped text.  Every link either renderer emits opens in a new browsing
//! context without opener access.

use std::fmt;
use std::sync::LazyLock;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use regex::Regex;
use serde::Serialize;

use crate::types::{Role, Turn};

/// Attributes added to every emitted anchor.
const LINK_ATTRIBUTES: &str = r#"target="_blank" rel="noopener noreferrer""#;

/// Link schemes allowed through the markdown renderer.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Characters stripped from the end of a bare URL and kept as text.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']'];

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("bare URL pattern is valid"));

///////////////////////////////////////////// SafeHtml /////////////////////////////////////////////

/// HTML that is safe to insert into the page.
///
/// Values of this type can only be produced by the renderers in this module.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SafeHtml(String);

impl SafeHtml {
    fn new(html: String) -> Self {
        Self(html)
    }

    /// Borrow the HTML as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the value, returning the HTML string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeHtml {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

///////////////////////////////////////// MessageRenderer //////////////////////////////////////////

/// Converts raw message text into display-safe HTML.
///
/// Implementations must be pure: the same input always yields the same
/// output and no state is kept between calls.
pub trait MessageRenderer: Send + Sync {
    /// Render raw text.
    fn render(&self, raw: &str) -> SafeHtml;

    /// Render raw text into an immutable [`Turn`] for the given role.
    ///
    /// Error turns are always plain-escaped, regardless of the renderer.
    fn render_turn(&self, role: Role, raw: &str) -> Turn {
        let rendered = match role {
            Role::Error => escape(raw),
            _ => self.render(raw),
        };
        Turn::new(role, raw, rendered)
    }
}

/// Returns the renderer to use for the given configuration.
pub fn renderer_for(markdown: bool) -> Box<dyn MessageRenderer> {
    if markdown {
        Box::new(MarkdownRenderer::new())
    } else {
        Box::new(PlainRenderer)
    }
}

/// Escape text without any further processing.
pub fn escape(raw: &str) -> SafeHtml {
    SafeHtml::new(escape_html(raw))
}

////////////////////////////////////////// PlainRenderer ///////////////////////////////////////////

/// Escapes all markup and turns bare `http(s)` URLs into links.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl MessageRenderer for PlainRenderer {
    fn render(&self, raw: &str) -> SafeHtml {
        SafeHtml::new(linkify(raw))
    }
}

///////////////////////////////////////// MarkdownRenderer /////////////////////////////////////////

/// Restricted CommonMark renderer.
///
/// Raw HTML is shown as text, soft line breaks become `<br />`, link
/// destinations are limited to `http`, `https`, `mailto` and relative
/// references, and images are reduced to their alt text.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    /// Create a renderer with strikethrough, tables and smart punctuation.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRenderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> SafeHtml {
        let mut events: Vec<Event<'_>> = Vec::new();
        // One entry per open link: whether an anchor was emitted for it.
        let mut open_links: Vec<bool> = Vec::new();
        let mut in_code_block = false;

        // Adjacent text events are merged so URLs split by the parser still linkify.
        let mut pending = String::new();

        for event in Parser::new_ext(raw, self.options) {
            if let Event::Text(text) = &event {
                pending.push_str(text);
                continue;
            }
            flush_text(
                &mut events,
                &mut pending,
                open_links.is_empty() && !in_code_block,
            );
            match event {
                Event::Html(markup) => events.push(Event::Text(markup)),
                Event::SoftBreak => events.push(Event::HardBreak),
                Event::Start(Tag::Link(_, destination, _)) => match safe_href(&destination) {
                    Some(href) => {
                        events.push(Event::Html(CowStr::from(format!(
                            r#"<a href="{href}" {LINK_ATTRIBUTES}>"#
                        ))));
                        open_links.push(true);
                    }
                    None => open_links.push(false),
                },
                Event::End(Tag::Link(..)) => {
                    if open_links.pop() == Some(true) {
                        events.push(Event::Html(CowStr::from("</a>")));
                    }
                }
                Event::Start(Tag::Image(..)) | Event::End(Tag::Image(..)) => {}
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    events.push(Event::Start(Tag::CodeBlock(kind)));
                }
                Event::End(Tag::CodeBlock(kind)) => {
                    in_code_block = false;
                    events.push(Event::End(Tag::CodeBlock(kind)));
                }
                other => events.push(other),
            }
        }
        flush_text(
            &mut events,
            &mut pending,
            open_links.is_empty() && !in_code_block,
        );

        let mut output = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        SafeHtml::new(output)
    }
}

///////////////////////////////////////////// helpers //////////////////////////////////////////////

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape `text` and wrap bare `http(s)` URLs in anchors.
fn linkify(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for found in BARE_URL.find_iter(text) {
        let url = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if url.len() <= "https://".len() {
            continue;
        }
        output.push_str(&escape_html(&text[cursor..found.start()]));
        let href = escape_html(url);
        output.push_str(&format!(r#"<a href="{href}" {LINK_ATTRIBUTES}>{href}</a>"#));
        cursor = found.start() + url.len();
    }
    output.push_str(&escape_html(&text[cursor..]));
    output
}

/// Move buffered text into `events`, linkified when outside links and code.
fn flush_text(events: &mut Vec<Event<'_>>, pending: &mut String, linkify_text: bool) {
    if pending.is_empty() {
        return;
    }
    let text = std::mem::take(pending);
    if linkify_text {
        events.push(Event::Html(CowStr::from(linkify(&text))));
    } else {
        events.push(Event::Text(CowStr::from(text)));
    }
}

/// Returns the escaped destination if it is safe to link to.
fn safe_href(destination: &str) -> Option<String> {
    match url::Url::parse(destination) {
        Ok(url) if ALLOWED_SCHEMES.contains(&url.scheme()) => Some(escape_html(destination)),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) if !destination.contains(':') => {
            Some(escape_html(destination))
        }
        Err(_) => None,
    }
}
