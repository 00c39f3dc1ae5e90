//! Conversion between article HTML and an editable plain-text block format.
//!
//! Article markup is expected to have one `<h1><strong>` title followed by
//! block elements (`<p>`, `<h2>`, `<ul>`). [`to_plain_text`] flattens it into
//! blank-line separated blocks; [`to_html`] rebuilds a title and paragraphs.
//! The pair is lossy: once flattened, subheadings and lists come back as
//! paragraphs.
//!
//! ```
//! use genstudio::content::{to_html, to_plain_text};
//!
//! let html = to_html("Rust & You\n\nFirst paragraph\nsecond line\n\nAnother");
//! assert_eq!(
//!     html,
//!     "<h1><strong>Rust &amp; You</strong></h1><p>First paragraph<br/>second line</p><p>Another</p>"
//! );
//! assert_eq!(to_plain_text(&html), "Rust & You\n\nFirst paragraph\nsecond line\n\nAnother");
//! ```

pub mod editor;

pub use editor::{ArticleDraft, EditMode};

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

static BLOCK_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n\s*\n").expect("block separator regex must compile")
});

/// Flatten article HTML into plain-text blocks separated by blank lines.
///
/// The first `<h1>` (wherever it sits) becomes the first block. Every other
/// top-level element becomes one block with `<br>` turned into newlines.
/// Empty blocks are dropped and bare top-level text is ignored.
pub fn to_plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let title = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "h1");

    let mut blocks = Vec::new();

    if let Some(title) = title {
        let text: String = title.text().collect();
        push_block(&mut blocks, &text);
    }

    for child in root.children().filter_map(ElementRef::wrap) {
        if is_same(child, title) {
            continue;
        }
        let mut text = String::new();
        collect_text(child, title, &mut text);
        push_block(&mut blocks, &text);
    }

    blocks.join("\n\n")
}

/// Rebuild article HTML from plain-text blocks.
///
/// The first block is the title, the rest become paragraphs with newlines
/// kept as `<br/>`. Empty input yields an empty string.
pub fn to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut blocks = BLOCK_SEPARATOR
        .split(&normalized)
        .map(str::trim)
        .filter(|block| !block.is_empty());

    let Some(title) = blocks.next() else {
        return String::new();
    };

    let mut html = format!("<h1><strong>{}</strong></h1>", escape_html(title));
    for block in blocks {
        html.push_str("<p>");
        html.push_str(&escape_html(block).replace('\n', "<br/>"));
        html.push_str("</p>");
    }
    html
}

/// Escape `& < > " '` for safe insertion into HTML text or attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_block(blocks: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        blocks.push(text.to_string());
    }
}

fn is_same(element: ElementRef<'_>, other: Option<ElementRef<'_>>) -> bool {
    other.is_some_and(|other| other.id() == element.id())
}

fn collect_text(element: ElementRef<'_>, skip: Option<ElementRef<'_>>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !is_same(child, skip) {
                        collect_text(child, skip, out);
                    }
                }
            }
            _ => {}
        }
    }
}
