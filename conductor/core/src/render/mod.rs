//! Incremental Document Renderer
//!
//! Converts the accumulated response text into a structured document. The
//! renderer is a pure function of the full text: every paint reparses from
//! the start, so a half-received table or an unterminated code fence simply
//! renders as what it looks like so far. It never fails.
//!
//! Block rules are tried in priority order at each line:
//!
//! 1. fenced code block (the opening fence may carry a language tag)
//! 2. table: a line containing `|` followed by a separator-only line
//! 3. heading: `#`, `##`, `###` (rendered as levels 2 to 4)
//! 4. bullet list: `- `, `* ` or `• `
//! 5. numbered list: `1. `
//! 6. blank line: one line break, never two in a row
//! 7. anything else: a paragraph line

mod inline;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use inline::{escape_html, Inline, Span};

const FENCE: &str = "```";

static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\. ").expect("valid regex"));

/// One block of a rendered document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Literal code
    CodeBlock {
        /// Tag after the opening fence, if any
        language: Option<String>,
        /// Lines between the fences
        code: String,
        /// False while the closing fence has not arrived
        closed: bool,
    },
    /// Pipe table
    Table {
        /// Header cells
        headers: Vec<Inline>,
        /// Body rows
        rows: Vec<Vec<Inline>>,
    },
    /// Heading, level 2 to 4
    Heading {
        /// HTML heading level
        level: u8,
        /// Heading text
        content: Inline,
    },
    /// Unordered list
    BulletList {
        /// Items in order
        items: Vec<Inline>,
    },
    /// Numbered list
    OrderedList {
        /// Items in order
        items: Vec<Inline>,
    },
    /// A single line of text, followed by a break
    Paragraph {
        /// Line content
        content: Inline,
    },
    /// Vertical space from a blank line
    LineBreak,
}

/// A rendered response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Blocks in order
    pub blocks: Vec<Block>,
}

/// Render markdown-ish text into a document
pub fn render(text: &str) -> Document {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let mut blocks: Vec<Block> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(tag) = line.strip_prefix(FENCE) {
            let language = Some(tag.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let mut code_lines = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].starts_with(FENCE) {
                code_lines.push(lines[i]);
                i += 1;
            }
            let closed = i < lines.len();
            blocks.push(Block::CodeBlock {
                language,
                code: code_lines.join("\n"),
                closed,
            });
            // Skip the closing fence
            i += 1;
            continue;
        }

        if line.contains('|') && lines.get(i + 1).is_some_and(|next| is_separator(next)) {
            let headers = split_cells(line);
            let mut rows = Vec::new();
            i += 2;
            while i < lines.len() && lines[i].contains('|') && !is_separator(lines[i]) {
                rows.push(split_cells(lines[i]));
                i += 1;
            }
            blocks.push(Block::Table { headers, rows });
            continue;
        }

        if let Some((level, rest)) = heading(line) {
            blocks.push(Block::Heading {
                level,
                content: Inline::parse(rest),
            });
            i += 1;
            continue;
        }

        if bullet(line).is_some() {
            let mut items = Vec::new();
            while let Some(item) = lines.get(i).and_then(|l| bullet(l)) {
                items.push(Inline::parse(item));
                i += 1;
            }
            blocks.push(Block::BulletList { items });
            continue;
        }

        if ORDERED_ITEM.is_match(line) {
            let mut items = Vec::new();
            while let Some(item) = lines.get(i).and_then(|l| ordered_item(l)) {
                items.push(Inline::parse(item));
                i += 1;
            }
            blocks.push(Block::OrderedList { items });
            continue;
        }

        if line.trim().is_empty() {
            // A paragraph already ends in a break
            if !matches!(
                blocks.last(),
                None | Some(Block::LineBreak) | Some(Block::Paragraph { .. })
            ) {
                blocks.push(Block::LineBreak);
            }
            i += 1;
            continue;
        }

        blocks.push(Block::Paragraph {
            content: Inline::parse(line),
        });
        i += 1;
    }

    Document { blocks }
}

fn is_separator(line: &str) -> bool {
    line.contains('-')
        && line
            .chars()
            .all(|c| matches!(c, '|' | ':' | '-') || c.is_whitespace())
}

fn split_cells(line: &str) -> Vec<Inline> {
    let mut cells: Vec<&str> = line.split('|').map(str::trim).collect();
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    cells.into_iter().map(Inline::parse).collect()
}

fn heading(line: &str) -> Option<(u8, &str)> {
    if let Some(rest) = line.strip_prefix("### ") {
        Some((4, rest))
    } else if let Some(rest) = line.strip_prefix("## ") {
        Some((3, rest))
    } else {
        line.strip_prefix("# ").map(|rest| (2, rest))
    }
}

fn bullet(line: &str) -> Option<&str> {
    ["- ", "* ", "• "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
}

fn ordered_item(line: &str) -> Option<&str> {
    ORDERED_ITEM.find(line).map(|m| &line[m.end()..])
}

impl Document {
    /// Whether nothing was rendered
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialise to safe HTML
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for block in &self.blocks {
            match block {
                Block::CodeBlock { language, code, .. } => {
                    html.push_str(r#"<pre class="code-block"><code"#);
                    if let Some(lang) = language {
                        html.push_str(&format!(r#" class="language-{}""#, escape_html(lang)));
                    }
                    html.push('>');
                    html.push_str(&escape_html(code));
                    html.push_str("</code></pre>");
                }
                Block::Table { headers, rows } => {
                    html.push_str(r#"<div class="md-table-wrap"><table class="md-table"><thead><tr>"#);
                    for cell in headers {
                        html.push_str(&format!("<th>{}</th>", cell.to_html()));
                    }
                    html.push_str("</tr></thead><tbody>");
                    for row in rows {
                        html.push_str("<tr>");
                        for cell in row {
                            html.push_str(&format!("<td>{}</td>", cell.to_html()));
                        }
                        html.push_str("</tr>");
                    }
                    html.push_str("</tbody></table></div>");
                }
                Block::Heading { level, content } => {
                    html.push_str(&format!("<h{level}>{}</h{level}>", content.to_html()));
                }
                Block::BulletList { items } => list_html(&mut html, "ul", items),
                Block::OrderedList { items } => list_html(&mut html, "ol", items),
                Block::Paragraph { content } => {
                    html.push_str(&format!(
                        r#"<span class="md-line">{}</span><br>"#,
                        content.to_html()
                    ));
                }
                Block::LineBreak => html.push_str("<br>"),
            }
        }
        html
    }

    /// Flatten to plain text for terminals
    pub fn plain_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for block in &self.blocks {
            match block {
                Block::CodeBlock { code, .. } => {
                    lines.extend(code.split('\n').map(|l| format!("    {l}")));
                }
                Block::Table { headers, rows } => {
                    lines.push(plain_row(headers));
                    lines.extend(rows.iter().map(|row| plain_row(row)));
                }
                Block::Heading { content, .. } | Block::Paragraph { content } => {
                    lines.push(content.plain_text());
                }
                Block::BulletList { items } => {
                    lines.extend(items.iter().map(|item| format!("• {}", item.plain_text())));
                }
                Block::OrderedList { items } => {
                    lines.extend(
                        items
                            .iter()
                            .enumerate()
                            .map(|(n, item)| format!("{}. {}", n + 1, item.plain_text())),
                    );
                }
                Block::LineBreak => lines.push(String::new()),
            }
        }
        lines.join("\n")
    }
}

fn list_html(html: &mut String, tag: &str, items: &[Inline]) {
    html.push_str(&format!("<{tag}>"));
    for item in items {
        html.push_str(&format!("<li>{}</li>", item.to_html()));
    }
    html.push_str(&format!("</{tag}>"));
}

fn plain_row(cells: &[Inline]) -> String {
    cells
        .iter()
        .map(Inline::plain_text)
        .collect::<Vec<_>>()
        .join(" | ")
}
