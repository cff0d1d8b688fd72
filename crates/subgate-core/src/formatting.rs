//! Formatting utilities (author Markdown → Telegram MarkdownV2).
//!
//! Supported conversions:
//!
//! ```text
//! **bold**         →  *bold*
//! ***bold+ital***  →  *_bold italic_*
//! *italic*         →  _italic_
//! _italic_         →  _italic_
//! ~~strike~~       →  ~strike~
//! [text](url)      →  [text](url)
//! `code`           →  `code`
//! ```block```      →  ```block```
//! ```
//!
//! Every other MarkdownV2 special character is escaped with a backslash.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Characters that must be escaped outside formatting spans (MarkdownV2).
const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

// Capture groups, in priority order:
//   1 fenced block, 2 inline code, 3 bold+italic, 4 bold, 5 strike,
//   6 italic (*), 7 italic (_), 8 link text, 9 link url.
// The url alternative prefers one level of balanced parentheses and falls back
// to "anything up to the first `)`".
const TOKEN_PATTERN: &str = concat!(
    r"(```[\s\S]*?```)",
    r"|(`[^`\n]+`)",
    r"|\*{3}(.+?)\*{3}",
    r"|\*{2}(.+?)\*{2}",
    r"|~~(.+?)~~",
    r"|\*([^*\n]+?)\*",
    r"|_([^_\n]+?)_",
    r"|\[([^\]]*)\]\(((?:[^()]|\([^()]*\))*|[^)]*)\)",
);

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("valid regex"))
}

/// Replace literal `\n` pairs (backslash + `n`) with real line breaks.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Escape every reserved MarkdownV2 character with a backslash.
pub fn escape_plain(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape `)` inside a link target so it does not close the link early.
pub fn escape_link_url(url: &str) -> String {
    url.replace(')', "\\)")
}

/// Convert author-facing Markdown to Telegram MarkdownV2.
///
/// Total: any input produces output. Nested emphasis is not supported; the
/// first construct matching at a position wins.
pub fn to_markdown_v2(input: &str) -> String {
    let input = normalize_newlines(input);

    let mut out = String::with_capacity(input.len() + input.len() / 4);
    let mut last = 0usize;

    for caps in token_re().captures_iter(&input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&escape_plain(&input[last..whole.start()]));
        render_token(&caps, &mut out);
        last = whole.end();
    }

    out.push_str(&escape_plain(&input[last..]));
    out
}

fn render_token(caps: &Captures<'_>, out: &mut String) {
    let group = |i: usize| caps.get(i).map(|m| m.as_str());

    if let Some(verbatim) = group(1).or_else(|| group(2)) {
        out.push_str(verbatim);
    } else if let Some(text) = group(3) {
        wrap(out, "*_", &escape_plain(text), "_*");
    } else if let Some(text) = group(4) {
        wrap(out, "*", &escape_plain(text), "*");
    } else if let Some(text) = group(5) {
        wrap(out, "~", &escape_plain(text), "~");
    } else if let Some(text) = group(6).or_else(|| group(7)) {
        wrap(out, "_", &escape_plain(text), "_");
    } else if let Some(text) = group(8) {
        out.push('[');
        out.push_str(&escape_plain(text));
        out.push_str("](");
        out.push_str(&escape_link_url(group(9).unwrap_or_default()));
        out.push(')');
    }
}

fn wrap(out: &mut String, open: &str, body: &str, close: &str) {
    out.push_str(open);
    out.push_str(body);
    out.push_str(close);
}
