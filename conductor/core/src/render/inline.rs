//! Inline Formatting
//!
//! Inline markdown is parsed into a small span tree by a fixed sequence of
//! passes: inline code, bold-italic, bold, italic (`*x*` then `_x_`), links.
//!
//! Each pass matches against a flattened view of the current spans in which
//! every already-built span is a single placeholder character. A match may
//! therefore wrap earlier output (`[**bold**](url)` still becomes a link),
//! but earlier output is never re-matched from the inside at the same level.
//! Code spans are opaque to every later pass; other spans keep their
//! children open to later passes.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static BOLD_ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*\*(.+?)\*\*\*").expect("valid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static ITALIC_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([^_\n]+?)_").expect("valid regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));

/// Stands in for an already-built span while a pass runs
const PLACEHOLDER: char = '\u{FFFC}';

/// A run of inline content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Span {
    /// Literal text
    Text(String),
    /// Inline code, never formatted further
    Code(String),
    /// Bold
    Strong(Vec<Span>),
    /// Italic
    Emphasis(Vec<Span>),
    /// Hyperlink
    Link {
        /// Target
        href: String,
        /// Visible label
        label: Vec<Span>,
    },
}

/// Formatted inline content of one line or cell
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inline(pub Vec<Span>);

type Builder = dyn Fn(Vec<Vec<Node>>, String) -> Node;

impl Inline {
    /// Parse inline markdown
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let text = text.replace(PLACEHOLDER, "\u{FFFD}");
        let mut nodes = vec![Node::Text(text)];
        nodes = apply(nodes, &INLINE_CODE, &|g, source| Node::Code {
            code: source_of(&g[0]),
            source,
        });
        nodes = apply(nodes, &BOLD_ITALIC, &|mut g, source| Node::Strong {
            children: vec![Node::Emphasis {
                children: take_group(&mut g, 0),
                source: source.clone(),
            }],
            source,
        });
        nodes = apply(nodes, &BOLD, &|mut g, source| Node::Strong {
            children: take_group(&mut g, 0),
            source,
        });
        nodes = apply(nodes, &ITALIC_STAR, &|mut g, source| Node::Emphasis {
            children: take_group(&mut g, 0),
            source,
        });
        nodes = apply(nodes, &ITALIC_UNDERSCORE, &|mut g, source| Node::Emphasis {
            children: take_group(&mut g, 0),
            source,
        });
        nodes = apply(nodes, &LINK, &link_node);

        Self(into_spans(nodes))
    }

    /// Spans in order
    pub fn spans(&self) -> &[Span] {
        &self.0
    }

    /// Safe HTML for this content
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(&self.0, &mut out);
        out
    }

    /// Text with formatting removed; links keep their target in parentheses
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        write_plain(&self.0, &mut out);
        out
    }
}

// ============================================================================
// Pass machinery
// ============================================================================

/// Parse-time span that remembers the markdown it was built from
#[derive(Debug)]
enum Node {
    Text(String),
    Code { code: String, source: String },
    Strong { children: Vec<Node>, source: String },
    Emphasis { children: Vec<Node>, source: String },
    Link { href: String, label: Vec<Node>, source: String },
}

impl Node {
    fn source(&self) -> &str {
        match self {
            Node::Text(text) => text,
            Node::Code { source, .. }
            | Node::Strong { source, .. }
            | Node::Emphasis { source, .. }
            | Node::Link { source, .. } => source,
        }
    }

    fn plain(&self) -> String {
        match self {
            Node::Text(text) | Node::Code { code: text, .. } => text.clone(),
            Node::Strong { children, .. } | Node::Emphasis { children, .. } => {
                children.iter().map(Node::plain).collect()
            }
            Node::Link { label, .. } => label.iter().map(Node::plain).collect(),
        }
    }
}

fn source_of(nodes: &[Node]) -> String {
    nodes.iter().map(Node::source).collect()
}

fn take_group(groups: &mut [Vec<Node>], index: usize) -> Vec<Node> {
    groups.get_mut(index).map(std::mem::take).unwrap_or_default()
}

fn link_node(mut groups: Vec<Vec<Node>>, source: String) -> Node {
    let label = take_group(&mut groups, 0);
    // The target is taken literally, whatever earlier passes made of it
    let href = source_of(&take_group(&mut groups, 1)).trim().to_string();

    if is_safe_href(&href) {
        Node::Link {
            href,
            label,
            source,
        }
    } else {
        Node::Text(label.iter().map(Node::plain).collect())
    }
}

fn is_safe_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Convert parse nodes to public spans, merging adjacent text
fn into_spans(nodes: Vec<Node>) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let span = match node {
            Node::Text(text) => {
                if let Some(Span::Text(prev)) = out.last_mut() {
                    prev.push_str(&text);
                    continue;
                }
                Span::Text(text)
            }
            Node::Code { code, .. } => Span::Code(code),
            Node::Strong { children, .. } => Span::Strong(into_spans(children)),
            Node::Emphasis { children, .. } => Span::Emphasis(into_spans(children)),
            Node::Link { href, label, .. } => Span::Link {
                href,
                label: into_spans(label),
            },
        };
        out.push(span);
    }
    out
}

/// Flattened view of a node list: text verbatim, other nodes as placeholders
struct Flattened {
    text: String,
    objects: Vec<Option<Node>>,
    positions: Vec<usize>,
}

impl Flattened {
    fn new(nodes: Vec<Node>) -> Self {
        let mut text = String::new();
        let mut objects = Vec::new();
        let mut positions = Vec::new();

        for node in nodes {
            match node {
                Node::Text(t) => text.push_str(&t),
                other => {
                    positions.push(text.len());
                    text.push(PLACEHOLDER);
                    objects.push(Some(other));
                }
            }
        }

        Self {
            text,
            objects,
            positions,
        }
    }

    fn object_at(&self, at: usize) -> Option<usize> {
        self.positions.binary_search(&at).ok()
    }

    /// Markdown source covered by `range`
    fn source(&self, range: Range<usize>) -> String {
        let mut out = String::new();
        for (offset, ch) in self.text[range.clone()].char_indices() {
            if ch != PLACEHOLDER {
                out.push(ch);
                continue;
            }
            let node = self
                .object_at(range.start + offset)
                .and_then(|idx| self.objects.get(idx))
                .and_then(Option::as_ref);
            if let Some(node) = node {
                out.push_str(node.source());
            }
        }
        out
    }

    /// Move out the nodes covering `range`
    fn take(&mut self, range: Range<usize>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut pending = String::new();

        for (offset, ch) in self.text[range.clone()].char_indices() {
            if ch != PLACEHOLDER {
                pending.push(ch);
                continue;
            }
            let node = self
                .object_at(range.start + offset)
                .and_then(|idx| self.objects.get_mut(idx))
                .and_then(Option::take);
            if let Some(node) = node {
                if !pending.is_empty() {
                    out.push(Node::Text(std::mem::take(&mut pending)));
                }
                out.push(node);
            }
        }

        if !pending.is_empty() {
            out.push(Node::Text(pending));
        }
        out
    }
}

/// Run one pass: recurse into existing open nodes, then match at this level
fn apply(nodes: Vec<Node>, re: &Regex, build: &Builder) -> Vec<Node> {
    let nodes: Vec<Node> = nodes
        .into_iter()
        .map(|node| match node {
            Node::Strong { children, source } => Node::Strong {
                children: apply(children, re, build),
                source,
            },
            Node::Emphasis { children, source } => Node::Emphasis {
                children: apply(children, re, build),
                source,
            },
            Node::Link {
                href,
                label,
                source,
            } => Node::Link {
                href,
                label: apply(label, re, build),
                source,
            },
            other => other,
        })
        .collect();

    let mut flat = Flattened::new(nodes);
    let matches: Vec<(Range<usize>, Vec<Range<usize>>)> = re
        .captures_iter(&flat.text)
        .filter_map(|caps| {
            let whole = caps.get(0)?.range();
            let groups = (1..caps.len())
                .map(|i| caps.get(i).map_or(whole.start..whole.start, |m| m.range()))
                .collect();
            Some((whole, groups))
        })
        .collect();

    let mut out = Vec::new();
    let mut last = 0;
    for (whole, groups) in matches {
        out.extend(flat.take(last..whole.start));
        let source = flat.source(whole.clone());
        let groups = groups.into_iter().map(|g| flat.take(g)).collect();
        out.push(build(groups, source));
        last = whole.end;
    }
    let end = flat.text.len();
    out.extend(flat.take(last..end));
    out
}

// ============================================================================
// Output
// ============================================================================

fn write_html(spans: &[Span], out: &mut String) {
    for span in spans {
        match span {
            Span::Text(text) => out.push_str(&escape_html(text)),
            Span::Code(code) => {
                out.push_str(r#"<code class="inline-code">"#);
                out.push_str(&escape_html(code));
                out.push_str("</code>");
            }
            Span::Strong(children) => {
                out.push_str("<strong>");
                write_html(children, out);
                out.push_str("</strong>");
            }
            Span::Emphasis(children) => {
                out.push_str("<em>");
                write_html(children, out);
                out.push_str("</em>");
            }
            Span::Link { href, label } => {
                out.push_str(r#"<a href=""#);
                out.push_str(&escape_html(href));
                out.push_str(r#"" target="_blank" rel="noopener noreferrer">"#);
                write_html(label, out);
                out.push_str("</a>");
            }
        }
    }
}

fn write_plain(spans: &[Span], out: &mut String) {
    for span in spans {
        match span {
            Span::Text(text) | Span::Code(text) => out.push_str(text),
            Span::Strong(children) | Span::Emphasis(children) => write_plain(children, out),
            Span::Link { href, label } => {
                write_plain(label, out);
                out.push_str(" (");
                out.push_str(href);
                out.push(')');
            }
        }
    }
}

/// Escape text for use in HTML content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
