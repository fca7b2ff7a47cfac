//! Shared machinery for the three mutation operations: parent/target
//! resolution, the insertion-position resolver (spec §4.5), and indent/marker
//! helpers reused by add-child and move.

pub mod add_child;
pub mod delete;
pub mod move_op;

use crate::model::{Diagnostic, DiagnosticCode, Node, Position};
use crate::parser::fence_line_flags;
use crate::selector::{self, matches_file_ref};

/// Depth-first search of the whole tree (root excluded) for nodes matching a
/// bare stem/target file-ref.
pub(crate) fn deep_search<'a>(node: &'a Node, file_ref: &str) -> Vec<&'a Node> {
    let mut out = Vec::new();
    deep_search_into(node, file_ref, &mut out);
    out
}

fn deep_search_into<'a>(node: &'a Node, file_ref: &str, out: &mut Vec<&'a Node>) {
    for child in &node.children {
        if matches_file_ref(child, file_ref) {
            out.push(child);
        }
        deep_search_into(child, file_ref, out);
    }
}

/// Resolves a parent/destination selector to its matched node(s): `.` is the
/// root; a selector containing `:` or `[` goes through the full selector
/// evaluator; a bare stem is resolved by deep search.
pub(crate) fn resolve_nodes<'a>(
    root: &'a Node,
    selector_str: &str,
) -> Result<(Vec<&'a Node>, Vec<Diagnostic>), Diagnostic> {
    if selector_str == "." {
        return Ok((vec![root], Vec::new()));
    }
    if selector_str.contains(':') || selector_str.contains('[') {
        let outcome = selector::evaluate(root, selector_str)?;
        return Ok((outcome.matches, outcome.warnings));
    }
    let matches = deep_search(root, selector_str);
    if matches.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let distinct: std::collections::HashSet<&str> =
        matches.iter().map(|n| n.target.as_str()).collect();
    if distinct.len() > 1 {
        return Err(Diagnostic::new(
            DiagnosticCode::AmbiguousBareStem,
            format!("'{selector_str}' matches multiple distinct files"),
        ));
    }
    let mut warnings = Vec::new();
    if matches.len() > 1 {
        warnings.push(Diagnostic::new(
            DiagnosticCode::MultiMatch,
            format!("'{selector_str}' matched {} nodes", matches.len()),
        ));
    }
    Ok((matches, warnings))
}

/// Like `resolve_nodes`, but when a bare-stem search finds nothing it
/// distinguishes `node-in-code-fence` from a plain `selector-no-match` by
/// checking whether the stem only ever appears inside a fence.
pub(crate) fn resolve_nodes_with_fence_check<'a>(
    root: &'a Node,
    lines: &[String],
    selector_str: &str,
) -> Result<(Vec<&'a Node>, Vec<Diagnostic>), Diagnostic> {
    if selector_str == "." || selector_str.contains(':') || selector_str.contains('[') {
        return resolve_nodes(root, selector_str);
    }
    let matches = deep_search(root, selector_str);
    if matches.is_empty() {
        if only_appears_in_fence(lines, selector_str) {
            return Err(Diagnostic::new(
                DiagnosticCode::NodeInCodeFence,
                format!("'{selector_str}' only appears inside a code fence"),
            ));
        }
        return Err(Diagnostic::new(
            DiagnosticCode::SelectorNoMatch,
            format!("'{selector_str}' matched no node"),
        ));
    }
    resolve_nodes(root, selector_str)
}

/// True if `file_ref` appears only inside a fenced code block in the current
/// line buffer — used to choose between `node-in-code-fence` and
/// `selector-no-match` when a selector resolves to nothing.
pub(crate) fn only_appears_in_fence(lines: &[String], file_ref: &str) -> bool {
    let flags = fence_line_flags(lines);
    let mut found_in_fence = false;
    for (idx, line) in lines.iter().enumerate() {
        if line.contains(file_ref) {
            if flags[idx] {
                found_in_fence = true;
            } else {
                return false;
            }
        }
    }
    found_in_fence
}

/// Resolves the insertion index among `children` from (position, at, before, after).
pub(crate) fn resolve_insert_index(
    children: &[Node],
    position: Option<Position>,
    at: Option<usize>,
    before: Option<&str>,
    after: Option<&str>,
) -> Result<usize, Diagnostic> {
    if let Some(at) = at {
        return if at <= children.len() {
            Ok(at)
        } else {
            Err(Diagnostic::new(
                DiagnosticCode::IndexOutOfBounds,
                format!(
                    "index {at} is out of bounds for {} children",
                    children.len()
                ),
            ))
        };
    }
    if let Some(before) = before {
        return children
            .iter()
            .position(|c| matches_file_ref(c, before))
            .ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticCode::SiblingNotFound,
                    format!("sibling '{before}' named in 'before' was not found"),
                )
            });
    }
    if let Some(after) = after {
        return children
            .iter()
            .position(|c| matches_file_ref(c, after))
            .map(|i| i + 1)
            .ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticCode::SiblingNotFound,
                    format!("sibling '{after}' named in 'after' was not found"),
                )
            });
    }
    Ok(match position {
        Some(Position::First) => 0,
        _ => children.len(),
    })
}

/// True if `target` is `haystack` itself or appears anywhere in its subtree.
/// Used by move's cycle check (spec §4.8): a destination may not be a source
/// or one of its own descendants.
pub(crate) fn subtree_contains(haystack: &Node, target: *const Node) -> bool {
    if std::ptr::eq(haystack as *const Node, target) {
        return true;
    }
    haystack
        .children
        .iter()
        .any(|c| subtree_contains(c, target))
}

pub(crate) fn indent_string(width: usize, is_tabs: bool) -> String {
    if is_tabs {
        "\t".repeat(width)
    } else {
        " ".repeat(width)
    }
}

/// Escapes `[` and `]` in a derived title so it round-trips as literal text
/// inside a Markdown link label.
pub(crate) fn escape_title(title: &str) -> String {
    title.replace('[', "\\[").replace(']', "\\]")
}

/// Collapses runs of 2+ consecutive blank lines to one and strips trailing
/// blank lines, applied by delete and move after splicing (spec invariant 6).
pub(crate) fn tidy_blank_lines(lines: &mut Vec<String>, endings: &mut Vec<String>) {
    let mut i = 0;
    while i + 1 < lines.len() {
        if lines[i].trim().is_empty() && lines[i + 1].trim().is_empty() {
            lines.remove(i + 1);
            endings.remove(i + 1);
        } else {
            i += 1;
        }
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
        endings.pop();
    }
}
