//! Colon-separated selector evaluation (spec §4.4).
//!
//! A selector is a sequence of segments, each either `.` (current node) or a
//! file-ref with an optional `[N]` 0-based match-index suffix. Matching walks
//! down from the root, restricting to the current node set's children at each
//! segment.

use crate::model::{Diagnostic, DiagnosticCode, Node};

#[derive(Debug)]
pub struct SelectorOutcome<'a> {
    pub matches: Vec<&'a Node>,
    pub warnings: Vec<Diagnostic>,
}

pub fn evaluate<'a>(root: &'a Node, selector: &str) -> Result<SelectorOutcome<'a>, Diagnostic> {
    let mut current: Vec<&Node> = vec![root];
    let mut warnings = Vec::new();

    for segment in selector.split(':') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let (file_ref, index) = split_index(segment);

        let mut candidates: Vec<&Node> = Vec::new();
        for node in &current {
            for child in &node.children {
                if matches_file_ref(child, file_ref) {
                    candidates.push(child);
                }
            }
        }

        if candidates.is_empty() {
            return Err(Diagnostic::new(
                DiagnosticCode::SelectorNoMatch,
                format!("selector segment '{segment}' matched no node"),
            ));
        }

        if let Some(idx) = index {
            match candidates.get(idx) {
                Some(node) => current = vec![*node],
                None => {
                    return Err(Diagnostic::new(
                        DiagnosticCode::IndexOutOfBounds,
                        format!(
                            "selector segment '{segment}' requested index {idx} but only {} matches exist",
                            candidates.len()
                        ),
                    ));
                }
            }
            continue;
        }

        let distinct_targets: std::collections::HashSet<&str> =
            candidates.iter().map(|n| n.target.as_str()).collect();
        if distinct_targets.len() > 1 {
            return Err(Diagnostic::new(
                DiagnosticCode::AmbiguousBareStem,
                format!("selector segment '{segment}' matches multiple distinct files"),
            ));
        }
        if candidates.len() > 1 {
            warnings.push(Diagnostic::new(
                DiagnosticCode::MultiMatch,
                format!(
                    "selector segment '{segment}' matched {} nodes",
                    candidates.len()
                ),
            ));
        }
        current = candidates;
    }

    Ok(SelectorOutcome {
        matches: current,
        warnings,
    })
}

fn split_index(segment: &str) -> (&str, Option<usize>) {
    if let Some(stripped) = segment.strip_suffix(']')
        && let Some(open) = stripped.rfind('[')
            && let Ok(idx) = stripped[open + 1..].parse::<usize>() {
                return (&segment[..open], Some(idx));
            }
    (segment, None)
}

pub(crate) fn matches_file_ref(node: &Node, file_ref: &str) -> bool {
    if file_ref.contains('/') {
        return node.target == file_ref || node.target == format!("{file_ref}.md");
    }
    node.stem() == file_ref || node.target == file_ref || node.title.eq_ignore_ascii_case(file_ref)
}
