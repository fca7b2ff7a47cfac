//! move operation (spec §4.8). No direct teacher analogue — the teacher's
//! engine never needed source-preserving subtree relocation — so this is
//! built directly from the spec, reusing add-child's indent/marker/insertion
//! machinery (§4.5–4.6) and delete's collateral-warning helpers (§4.7).

use std::collections::HashSet;

use crate::error::CoreError;
use crate::model::{Diagnostic, DiagnosticCode, MoveParams, Node, OperationOutcome, Project};
use crate::ops::add_child::{
    compute_insert_line_index, derive_indent_and_marker, ordinal_style, ordinal_value,
};
use crate::ops::delete::{count_descendants, find_parent, has_trailing_prose};
use crate::ops::{
    indent_string, resolve_insert_index, resolve_nodes, resolve_nodes_with_fence_check,
    subtree_contains,
};
use crate::parser::parse;
use crate::serializer::serialize;

const ROOT_GUARD_MESSAGE: &str = "root node is not a valid target for this operation";

pub fn move_node(
    bytes: &[u8],
    project: Option<&Project>,
    params: &MoveParams,
) -> Result<OperationOutcome, CoreError> {
    let abort = |diag: Diagnostic| -> OperationOutcome {
        OperationOutcome {
            bytes: bytes.to_vec(),
            diagnostics: vec![diag],
            changed: false,
        }
    };

    if !params.confirmed {
        return Ok(abort(Diagnostic::new(
            DiagnosticCode::MissingConfirmation,
            "move requires explicit confirmation",
        )));
    }

    let (result, mut diagnostics) = parse(bytes, project)?;

    if diagnostics.iter().any(Diagnostic::is_fatal) {
        return Ok(OperationOutcome {
            bytes: bytes.to_vec(),
            diagnostics,
            changed: false,
        });
    }

    let sources = match resolve_move_sources(&result.root, &result.lines, &params.source) {
        Ok((matches, warnings)) => {
            diagnostics.extend(warnings);
            matches
        }
        Err(diag) => return Ok(abort(diag)),
    };

    let destination = match resolve_nodes(&result.root, &params.destination) {
        Ok((matches, warnings)) => {
            diagnostics.extend(warnings);
            match matches.into_iter().next() {
                Some(node) => node,
                None => {
                    return Ok(abort(Diagnostic::new(
                        DiagnosticCode::SelectorNoMatch,
                        format!("destination '{}' matched no node", params.destination),
                    )));
                }
            }
        }
        Err(diag) => return Ok(abort(diag)),
    };

    for source in &sources {
        if subtree_contains(source, destination as *const Node) {
            return Ok(abort(Diagnostic::new(
                DiagnosticCode::CycleDetected,
                format!(
                    "destination '{}' is '{}' or one of its descendants",
                    params.destination, source.target
                ),
            )));
        }
    }

    for source in &sources {
        if !source.children.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::CascadeDelete,
                format!(
                    "moving '{}' also relocates {} descendant node(s)",
                    source.target,
                    count_descendants(source)
                ),
            ));
        }
        if has_trailing_prose(
            &source.source.raw_line,
            source.source.indent_width,
            &source.source.marker,
        ) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::NonStructuralDestroyed,
                format!("line for '{}' carries prose beyond its link", source.target),
            ));
        }
        if let Some(parent) = find_parent(&result.root, *source as *const Node)
            && !parent.is_root() && parent.children.len() == 1 {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::EmptySublistPruned,
                    format!("'{}' becomes childless after this move", parent.target),
                ));
            }
    }

    let mut ordered_sources = sources;
    ordered_sources.sort_by_key(|n| n.source.line);

    let insert_index = match resolve_insert_index(
        &destination.children,
        params.position,
        params.at,
        params.before.as_deref(),
        params.after.as_deref(),
    ) {
        Ok(i) => i,
        Err(diag) => return Ok(abort(diag)),
    };

    let (indent_width, indent_is_tabs, first_marker) =
        derive_indent_and_marker(destination, &destination.children, insert_index);
    let target_indent = indent_string(indent_width, indent_is_tabs);

    let markers: Vec<String> = match ordinal_style(&first_marker) {
        Some(style) => {
            let mut next_ord = ordinal_value(&first_marker).unwrap_or(1);
            ordered_sources
                .iter()
                .map(|_| {
                    let marker = format!("{next_ord}{style}");
                    next_ord += 1;
                    marker
                })
                .collect()
        }
        None => ordered_sources
            .iter()
            .map(|_| first_marker.clone())
            .collect(),
    };

    let (raw_insert_at, _) = compute_insert_line_index(
        destination,
        &destination.children,
        insert_index,
        result.lines.len(),
    );

    let removal_ranges: Vec<(usize, usize)> = ordered_sources
        .iter()
        .map(|n| (n.source.line - 1, n.source.last_subtree_line - 1))
        .collect();

    let removed_before_insert: usize = removal_ranges
        .iter()
        .filter(|(_, end)| *end < raw_insert_at)
        .map(|(start, end)| end - start + 1)
        .sum();
    let adjusted_index = raw_insert_at.saturating_sub(removed_before_insert);

    let mut removal_set: HashSet<usize> = HashSet::new();
    for (start, end) in &removal_ranges {
        removal_set.extend(*start..=*end);
    }

    let mut injected_lines = Vec::new();
    let mut injected_endings = Vec::new();
    for (source, marker) in ordered_sources.iter().zip(markers.iter()) {
        let block = reindent_subtree(
            source,
            &result.lines,
            &result.endings,
            &target_indent,
            marker,
        );
        injected_lines.extend(block.lines);
        injected_endings.extend(block.endings);
    }

    let mut kept_lines = Vec::with_capacity(result.lines.len());
    let mut kept_endings = Vec::with_capacity(result.endings.len());
    for (idx, (line, ending)) in result.lines.iter().zip(result.endings.iter()).enumerate() {
        if !removal_set.contains(&idx) {
            kept_lines.push(line.clone());
            kept_endings.push(ending.clone());
        }
    }
    let adjusted_index = adjusted_index.min(kept_lines.len());
    kept_lines.splice(adjusted_index..adjusted_index, injected_lines);
    kept_endings.splice(adjusted_index..adjusted_index, injected_endings);

    crate::ops::tidy_blank_lines(&mut kept_lines, &mut kept_endings);

    let mut new_result = result;
    new_result.lines = kept_lines;
    new_result.endings = kept_endings;
    let out_bytes = serialize(&new_result);
    let changed = out_bytes != bytes;

    Ok(OperationOutcome {
        bytes: out_bytes,
        diagnostics,
        changed,
    })
}

fn resolve_move_sources<'a>(
    root: &'a Node,
    lines: &[String],
    selector_str: &str,
) -> Result<(Vec<&'a Node>, Vec<Diagnostic>), Diagnostic> {
    if selector_str == "." {
        return Err(Diagnostic::new(
            DiagnosticCode::RootGuard,
            ROOT_GUARD_MESSAGE,
        ));
    }
    if selector_str.contains(':') {
        let outcome = crate::selector::evaluate(root, selector_str)?;
        if outcome.matches.iter().any(|n| n.is_root()) {
            return Err(Diagnostic::new(
                DiagnosticCode::RootGuard,
                ROOT_GUARD_MESSAGE,
            ));
        }
        return Ok((outcome.matches, outcome.warnings));
    }
    resolve_nodes_with_fence_check(root, lines, selector_str)
}

struct ReindentedSource {
    lines: Vec<String>,
    endings: Vec<String>,
}

/// Builds the re-indented text for one moved subtree: the root line gets the
/// destination's indent and marker (checkbox stripped); descendant lines keep
/// their own marker and any indentation beyond the source root's, per §4.8.
fn reindent_subtree(
    source: &Node,
    lines: &[String],
    endings: &[String],
    target_indent: &str,
    marker: &str,
) -> ReindentedSource {
    let start = source.source.line - 1;
    let end = source.source.last_subtree_line - 1;
    let root_indent = source.source.indent_width;

    let mut out_lines = Vec::with_capacity(end - start + 1);
    let mut out_endings = Vec::with_capacity(end - start + 1);

    for (offset, idx) in (start..=end).enumerate() {
        let raw = &lines[idx];
        if offset == 0 {
            let content_start = (root_indent + source.source.marker.len() + 1).min(raw.len());
            let content = strip_checkbox_prefix(&raw[content_start..]);
            out_lines.push(format!("{target_indent}{marker} {content}"));
        } else {
            let cut = root_indent.min(raw.len());
            out_lines.push(format!("{target_indent}{}", &raw[cut..]));
        }
        out_endings.push(endings[idx].clone());
    }

    ReindentedSource {
        lines: out_lines,
        endings: out_endings,
    }
}

fn strip_checkbox_prefix(content: &str) -> &str {
    for prefix in ["[ ] ", "[x] ", "[X] "] {
        if let Some(rest) = content.strip_prefix(prefix) {
            return rest;
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use pretty_assertions::assert_eq;

    fn params(source: &str, destination: &str) -> MoveParams {
        MoveParams {
            source: source.to_string(),
            destination: destination.to_string(),
            position: None,
            at: None,
            before: None,
            after: None,
            confirmed: true,
        }
    }

    #[test]
    fn requires_confirmation() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n- [B](b.md)\n";
        let mut p = params("a", "b");
        p.confirmed = false;
        let out = move_node(src, None, &p).unwrap();
        assert!(!out.changed);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::MissingConfirmation);
    }

    #[test]
    fn aborts_unchanged_when_document_already_has_a_fatal_parse_diagnostic() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n- [B](b.md)\n- [x](bad|name.md)\n";
        let out = move_node(src, None, &params("a", "b")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.bytes, src);
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.code == DiagnosticCode::IllegalPathChars)
        );
    }

    #[test]
    fn root_source_is_rejected() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n";
        let out = move_node(src, None, &params(".", "a")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::RootGuard);
    }

    #[test]
    fn moves_sibling_to_front_of_root() {
        let src =
            b"<!-- prosemark-binder:v1 -->\n\n- [Ch1](ch1.md)\n- [Ch2](ch2.md)\n- [Ch3](ch3.md)\n";
        let mut p = params("ch3", ".");
        p.position = Some(Position::First);
        let out = move_node(src, None, &p).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.find("ch3.md").unwrap() < text.find("ch1.md").unwrap());
    }

    #[test]
    fn cycle_detected_when_destination_is_a_descendant() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [A](a.md)\n  - [B](b.md)\n    - [C](c.md)\n      - [D](d.md)\n        - [E](e.md)\n";
        let out = move_node(src, None, &params("a", "a:b:c:d:e")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.bytes, src.to_vec());
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::CycleDetected);
    }

    #[test]
    fn moved_subtree_reindents_under_new_parent() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Part1](part1.md)\n- [Part2](part2.md)\n  - [Ch](ch.md)\n";
        let out = move_node(src, None, &params("part2", "part1")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("  - [Part2](part2.md)"));
        assert!(text.contains("    - [Ch](ch.md)"));
    }

    #[test]
    fn descendant_markers_are_preserved_on_move() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Part1](part1.md)\n- [Part2](part2.md)\n  1. [Ch1](ch1.md)\n  2. [Ch2](ch2.md)\n";
        let out = move_node(src, None, &params("part2", "part1")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("1. [Ch1](ch1.md)"));
        assert!(text.contains("2. [Ch2](ch2.md)"));
    }

    #[test]
    fn move_to_empty_ordered_parent_increments_from_max() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n1. [One](one.md)\n2. [Two](two.md)\n- [Loose](loose.md)\n";
        let out = move_node(src, None, &params("loose", ".")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("3. [Loose](loose.md)"));
    }

    #[test]
    fn collapses_blank_lines_left_behind() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Alpha](alpha.md)\n\n- [Beta](beta.md)\n\n- [Gamma](gamma.md)\n";
        let out = move_node(src, None, &params("beta", ".")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(!text.contains("\n\n\n"));
    }
}
