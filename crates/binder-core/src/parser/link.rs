//! Link recognition and target validation.
//!
//! The backtracking cursor is grounded on the teacher's `parsing/inline/cursor.rs`;
//! the precedence-ordered try-parse chain (inline, then wiki, then the three
//! reference forms) is grounded on `parsing/inline/parser.rs`'s
//! `try_parse_code_span` / `try_parse_wikilink` pattern. The owned-delimiter-const
//! style (`WikiLink::OPEN`/`CLOSE`/`ALIAS`) is grounded on
//! `parsing/inline/kinds/wikilink.rs`.

use percent_encoding::percent_decode_str;

use crate::model::DiagnosticCode;

pub struct WikiLink;
impl WikiLink {
    pub const OPEN: &'static str = "[[";
    pub const CLOSE: &'static str = "]]";
    pub const ALIAS: char = '|';
    pub const FRAGMENT: char = '#';
}

/// A minimal backtracking cursor over a `&str`, tracking a byte position.
struct Cursor<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor { s, i: 0 }
    }

    fn pos(&self) -> usize {
        self.i
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    fn rest(&self) -> &'a str {
        &self.s[self.i..]
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.rest().starts_with(pat)
    }

    fn bump(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.i += c.len_utf8();
        }
    }

    fn bump_n(&mut self, n: usize) {
        self.i = (self.i + n).min(self.s.len());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkForm {
    Inline {
        text: String,
        target: String,
        title: Option<String>,
    },
    Wiki {
        stem: String,
        fragment: Option<String>,
        alias: Option<String>,
    },
    FullRef {
        text: String,
        label: String,
    },
    CollapsedRef {
        text: String,
    },
    Shortcut {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLink {
    pub form: LinkForm,
    pub start: usize,
    pub end: usize,
}

/// Scans `content` left to right for link-like forms, skipping inline code
/// spans so brackets inside them are not mistaken for links.
pub fn scan_links(content: &str) -> Vec<FoundLink> {
    let mut cursor = Cursor::new(content);
    let mut found = Vec::new();

    while !cursor.eof() {
        if cursor.starts_with("`") {
            skip_code_span(&mut cursor);
            continue;
        }
        if cursor.starts_with(WikiLink::OPEN)
            && let Some(link) = try_parse_wikilink(&mut cursor) {
                found.push(link);
                continue;
            }
        if cursor.starts_with("[")
            && let Some(link) = try_parse_bracket_link(&mut cursor) {
                found.push(link);
                continue;
            }
        cursor.bump();
    }

    found
}

fn skip_code_span(cursor: &mut Cursor) {
    let start = cursor.pos();
    let run = cursor.rest().chars().take_while(|&c| c == '`').count();
    cursor.bump_n(run);
    let delim = "`".repeat(run);
    if let Some(rel) = cursor.rest().find(&delim) {
        cursor.bump_n(rel + run);
    } else {
        cursor.i = start;
        cursor.bump();
    }
}

fn try_parse_wikilink(cursor: &mut Cursor) -> Option<FoundLink> {
    let start = cursor.pos();
    let rest = cursor.rest();
    let close_rel = rest.find(WikiLink::CLOSE)?;
    let inner = &rest[WikiLink::OPEN.len()..close_rel];
    let end = start + close_rel + WikiLink::CLOSE.len();

    let (before_alias, alias) = match inner.split_once(WikiLink::ALIAS) {
        Some((a, b)) => (a, Some(b.to_string())),
        None => (inner, None),
    };
    let (stem, fragment) = match before_alias.split_once(WikiLink::FRAGMENT) {
        Some((a, b)) => (a.to_string(), Some(b.to_string())),
        None => (before_alias.to_string(), None),
    };

    cursor.i = end;
    Some(FoundLink {
        form: LinkForm::Wiki {
            stem,
            fragment,
            alias,
        },
        start,
        end,
    })
}

/// Handles `[text](target "title")`, `[text][label]`, `[text][]`, `[text]`.
fn try_parse_bracket_link(cursor: &mut Cursor) -> Option<FoundLink> {
    let start = cursor.pos();
    let rest = cursor.rest();
    let text_end = find_matching_bracket(rest)?;
    let text = rest[1..text_end].to_string();
    let after_text = &rest[text_end + 1..];

    if let Some(paren_rest) = after_text.strip_prefix('(') {
        let close_rel = find_matching_paren(paren_rest)?;
        let inside = &paren_rest[..close_rel];
        let (target, title) = split_target_title(inside);
        let end = start + text_end + 1 + 1 + close_rel + 1;
        cursor.i = end;
        return Some(FoundLink {
            form: LinkForm::Inline {
                text,
                target,
                title,
            },
            start,
            end,
        });
    }

    if let Some(bracket_rest) = after_text.strip_prefix('[') {
        if let Some(stripped) = bracket_rest.strip_prefix(']') {
            let _ = stripped;
            let end = start + text_end + 1 + 2;
            cursor.i = end;
            return Some(FoundLink {
                form: LinkForm::CollapsedRef { text },
                start,
                end,
            });
        }
        if let Some(close_rel) = bracket_rest.find(']') {
            let label = bracket_rest[..close_rel].to_string();
            let end = start + text_end + 1 + 1 + close_rel + 1;
            cursor.i = end;
            return Some(FoundLink {
                form: LinkForm::FullRef { text, label },
                start,
                end,
            });
        }
    }

    let end = start + text_end + 1;
    cursor.i = end;
    Some(FoundLink {
        form: LinkForm::Shortcut { text },
        start,
        end,
    })
}

fn find_matching_bracket(s: &str) -> Option<usize> {
    if !s.starts_with('[') {
        return None;
    }
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    for (idx, &b) in bytes.iter().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_matching_paren(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 1i32;
    for (idx, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_target_title(inside: &str) -> (String, Option<String>) {
    let inside = inside.trim();
    if let Some(quote_rel) = inside.find('"') {
        let target = inside[..quote_rel].trim().to_string();
        let title_part = &inside[quote_rel + 1..];
        let title = title_part.strip_suffix('"').unwrap_or(title_part);
        (target, Some(title.to_string()))
    } else {
        (inside.to_string(), None)
    }
}

/// Percent-decodes and validates a link target, returning the decoded target
/// or the diagnostic code explaining why it is rejected.
pub fn validate_target(raw: &str) -> Result<String, DiagnosticCode> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy().to_string();

    if decoded
        .bytes()
        .any(|b| b < 0x20 || matches!(b, b'<' | b'>' | b'"' | b'|' | b'?' | b'*' | b':'))
    {
        return Err(DiagnosticCode::IllegalPathChars);
    }

    if decoded == ".." || decoded.starts_with("../") || decoded.contains("/../") {
        return Err(DiagnosticCode::PathEscapesRoot);
    }

    for segment in decoded.split('/') {
        if segment != ".." && segment.ends_with('.') && !segment.is_empty() {
            return Err(DiagnosticCode::IllegalPathChars);
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_inline_link() {
        let found = scan_links("see [Chapter One](chapter-one.md)");
        assert_eq!(found.len(), 1);
        assert!(
            matches!(&found[0].form, LinkForm::Inline { target, .. } if target == "chapter-one.md")
        );
    }

    #[test]
    fn finds_inline_link_with_title() {
        let found = scan_links("[Chapter One](chapter-one.md \"Ch. 1\")");
        match &found[0].form {
            LinkForm::Inline { title, .. } => assert_eq!(title.as_deref(), Some("Ch. 1")),
            other => panic!("unexpected form: {other:?}"),
        }
    }

    #[test]
    fn finds_wikilink_with_alias_and_fragment() {
        let found = scan_links("[[chapter-one#intro|Chapter One]]");
        match &found[0].form {
            LinkForm::Wiki {
                stem,
                fragment,
                alias,
            } => {
                assert_eq!(stem, "chapter-one");
                assert_eq!(fragment.as_deref(), Some("intro"));
                assert_eq!(alias.as_deref(), Some("Chapter One"));
            }
            other => panic!("unexpected form: {other:?}"),
        }
    }

    #[test]
    fn finds_full_reference_link() {
        let found = scan_links("[Chapter One][ch1]");
        assert!(matches!(&found[0].form, LinkForm::FullRef { label, .. } if label == "ch1"));
    }

    #[test]
    fn finds_collapsed_reference_link() {
        let found = scan_links("[Chapter One][]");
        assert!(matches!(&found[0].form, LinkForm::CollapsedRef { .. }));
    }

    #[test]
    fn finds_shortcut_reference_link() {
        let found = scan_links("[Chapter One]");
        assert!(matches!(&found[0].form, LinkForm::Shortcut { .. }));
    }

    #[test]
    fn skips_brackets_inside_code_span() {
        let found = scan_links("use `[a](b)` literally then [real](real.md)");
        assert_eq!(found.len(), 1);
        assert!(matches!(&found[0].form, LinkForm::Inline { target, .. } if target == "real.md"));
    }

    #[test]
    fn detects_multiple_links_in_one_line() {
        let found = scan_links("[a](a.md) and [b](b.md)");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn validate_target_rejects_illegal_chars() {
        assert_eq!(
            validate_target("bad|name.md"),
            Err(DiagnosticCode::IllegalPathChars)
        );
    }

    #[test]
    fn validate_target_rejects_root_escape() {
        assert_eq!(
            validate_target("../outside.md"),
            Err(DiagnosticCode::PathEscapesRoot)
        );
    }

    #[test]
    fn validate_target_rejects_trailing_dot_segment() {
        assert_eq!(
            validate_target("dir./file.md"),
            Err(DiagnosticCode::IllegalPathChars)
        );
    }

    #[test]
    fn validate_target_decodes_percent_escapes() {
        assert_eq!(
            validate_target("chapter%20one.md").unwrap(),
            "chapter one.md"
        );
    }
}
