//! delete operation (spec §4.7).

use crate::error::CoreError;
use crate::model::{DeleteParams, Diagnostic, DiagnosticCode, Node, OperationOutcome, Project};
use crate::ops::tidy_blank_lines;
use crate::parser::link::scan_links;
use crate::parser::parse;
use crate::selector;
use crate::serializer::serialize;

pub fn delete(
    bytes: &[u8],
    project: Option<&Project>,
    params: &DeleteParams,
) -> Result<OperationOutcome, CoreError> {
    if !params.confirmed {
        return Ok(OperationOutcome {
            bytes: bytes.to_vec(),
            diagnostics: vec![Diagnostic::new(
                DiagnosticCode::MissingConfirmation,
                "delete requires explicit confirmation",
            )],
            changed: false,
        });
    }

    let (result, mut diagnostics) = parse(bytes, project)?;

    if diagnostics.iter().any(Diagnostic::is_fatal) {
        return Ok(OperationOutcome {
            bytes: bytes.to_vec(),
            diagnostics,
            changed: false,
        });
    }

    let matches = match resolve_delete_targets(&result.root, &params.selector) {
        Ok((m, warnings)) => {
            diagnostics.extend(warnings);
            m
        }
        Err(diag) => {
            return Ok(OperationOutcome {
                bytes: bytes.to_vec(),
                diagnostics: vec![diag],
                changed: false,
            });
        }
    };

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for node in &matches {
        if !node.children.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::CascadeDelete,
                format!(
                    "deleting '{}' also removes {} descendant node(s)",
                    node.target,
                    count_descendants(node)
                ),
            ));
        }
        if has_trailing_prose(
            &node.source.raw_line,
            node.source.indent_width,
            &node.source.marker,
        ) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::NonStructuralDestroyed,
                format!("line for '{}' carries prose beyond its link", node.target),
            ));
        }
        if let Some(parent) = find_parent(&result.root, *node as *const Node)
            && !parent.is_root() && parent.children.len() == 1 {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::EmptySublistPruned,
                    format!("'{}' becomes childless after this delete", parent.target),
                ));
            }
        ranges.push((node.source.line - 1, node.source.last_subtree_line - 1));
    }

    ranges.sort_by_key(|r| std::cmp::Reverse(r.0));

    let mut lines = result.lines.clone();
    let mut endings = result.endings.clone();
    for (start, end) in ranges {
        lines.drain(start..=end);
        endings.drain(start..=end);
    }
    tidy_blank_lines(&mut lines, &mut endings);

    let mut new_result = result;
    new_result.lines = lines;
    new_result.endings = endings;
    let out_bytes = serialize(&new_result);
    let changed = out_bytes != bytes;

    Ok(OperationOutcome {
        bytes: out_bytes,
        diagnostics,
        changed,
    })
}

fn resolve_delete_targets<'a>(
    root: &'a Node,
    selector_str: &str,
) -> Result<(Vec<&'a Node>, Vec<Diagnostic>), Diagnostic> {
    if selector_str == "." {
        return Err(Diagnostic::new(
            DiagnosticCode::RootGuard,
            "root node is not a valid target for this operation",
        ));
    }
    if selector_str.contains(':') || selector_str.contains('[') {
        let outcome = selector::evaluate(root, selector_str)?;
        if outcome.matches.iter().any(|n| n.is_root()) {
            return Err(Diagnostic::new(
                DiagnosticCode::RootGuard,
                "root node is not a valid target for this operation",
            ));
        }
        return Ok((outcome.matches, outcome.warnings));
    }
    crate::ops::resolve_nodes(root, selector_str)
}

pub(crate) fn count_descendants(node: &Node) -> usize {
    node.children.len() + node.children.iter().map(count_descendants).sum::<usize>()
}

pub(crate) fn has_trailing_prose(raw_line: &str, indent_width: usize, marker: &str) -> bool {
    let content_start = indent_width + marker.len() + 1;
    if content_start > raw_line.len() {
        return false;
    }
    let content = &raw_line[content_start.min(raw_line.len())..];
    let found = scan_links(content);
    match found.first() {
        Some(link) => !content[link.end..].trim().is_empty(),
        None => false,
    }
}

pub(crate) fn find_parent(root: &Node, target: *const Node) -> Option<&Node> {
    for child in &root.children {
        if std::ptr::eq(child as *const Node, target) {
            return Some(root);
        }
        if let Some(p) = find_parent(child, target) {
            return Some(p);
        }
    }
    None
}
