//! add-child operation (spec §4.6).

use crate::error::CoreError;
use crate::model::{AddChildParams, Diagnostic, DiagnosticCode, Node, OperationOutcome, Project};
use crate::ops::{
    escape_title, indent_string, resolve_insert_index, resolve_nodes_with_fence_check,
};
use crate::parser::link::validate_target;
use crate::parser::parse;
use crate::serializer::serialize;

const BINDER_FILENAME: &str = "_binder.md";

pub fn add_child(
    bytes: &[u8],
    project: Option<&Project>,
    params: &AddChildParams,
) -> Result<OperationOutcome, CoreError> {
    let unchanged = || OperationOutcome {
        bytes: bytes.to_vec(),
        diagnostics: Vec::new(),
        changed: false,
    };

    let target = match validate_add_target(&params.target) {
        Ok(t) => t,
        Err(diag) => {
            return Ok(OperationOutcome {
                bytes: bytes.to_vec(),
                diagnostics: vec![diag],
                changed: false,
            });
        }
    };

    let (result, mut diagnostics) = parse(bytes, project)?;

    if diagnostics.iter().any(Diagnostic::is_fatal) {
        return Ok(OperationOutcome {
            bytes: bytes.to_vec(),
            diagnostics,
            changed: false,
        });
    }

    let (parents, warnings) =
        match resolve_nodes_with_fence_check(&result.root, &result.lines, &params.parent) {
            Ok(ok) => ok,
            Err(diag) => {
                let mut outcome = unchanged();
                outcome.diagnostics.push(diag);
                return Ok(outcome);
            }
        };
    diagnostics.extend(warnings);

    let mut ordered_parents: Vec<&Node> = parents;
    ordered_parents.sort_by_key(|n| std::cmp::Reverse(n.source.line));

    let mut lines = result.lines.clone();
    let mut endings = result.endings.clone();
    let ending = crate::lines::majority_ending(&result.endings);

    for parent in ordered_parents {
        if !params.force && parent.children.iter().any(|c| c.target == target) {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateSkipped,
                format!("parent already has a child targeting '{target}'"),
            ));
            continue;
        }

        let insert_index = match resolve_insert_index(
            &parent.children,
            params.position,
            params.at,
            params.before.as_deref(),
            params.after.as_deref(),
        ) {
            Ok(i) => i,
            Err(diag) => {
                return Ok(OperationOutcome {
                    bytes: bytes.to_vec(),
                    diagnostics: vec![diag],
                    changed: false,
                });
            }
        };

        let title = if params.title.is_empty() {
            crate::model::stem_of(&target).to_string()
        } else {
            params.title.clone()
        };
        let title = escape_title(&title);

        let (indent_width, indent_is_tabs, marker) =
            derive_indent_and_marker(parent, &parent.children, insert_index);
        let indent = indent_string(indent_width, indent_is_tabs);
        let new_line = format!("{indent}{marker} [{title}]({target})");

        let (insert_at, need_blank_separator) =
            compute_insert_line_index(parent, &parent.children, insert_index, lines.len());

        if need_blank_separator {
            lines.insert(insert_at, String::new());
            endings.insert(insert_at, ending.clone());
            lines.insert(insert_at + 1, new_line);
            endings.insert(insert_at + 1, ending.clone());
        } else {
            lines.insert(insert_at, new_line);
            endings.insert(insert_at, ending.clone());
        }
    }

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

fn validate_add_target(target: &str) -> Result<String, Diagnostic> {
    let decoded = validate_target(target)
        .map_err(|code| Diagnostic::new(code, format!("target '{target}' is invalid")))?;
    if !decoded.ends_with(".md") {
        return Err(Diagnostic::new(
            DiagnosticCode::InvalidTargetPath,
            format!("target '{target}' is not a markdown file"),
        ));
    }
    if decoded == BINDER_FILENAME {
        return Err(Diagnostic::new(
            DiagnosticCode::TargetIsBinder,
            "target may not be the binder file itself",
        ));
    }
    Ok(decoded)
}

pub(crate) fn derive_indent_and_marker(
    parent: &Node,
    children: &[Node],
    insert_index: usize,
) -> (usize, bool, String) {
    if let Some(first) = children.first() {
        let marker = derive_marker(children, insert_index, &first.source.marker);
        (
            first.source.indent_width,
            first.source.indent_is_tabs,
            marker,
        )
    } else if parent.is_root() {
        (0, false, "-".to_string())
    } else {
        let width = if parent.source.indent_is_tabs {
            parent.source.indent_width + 1
        } else {
            parent.source.indent_width + 2
        };
        (width, parent.source.indent_is_tabs, "-".to_string())
    }
}

pub(crate) fn derive_marker(children: &[Node], insert_index: usize, sample: &str) -> String {
    match ordinal_style(sample) {
        Some(style) => {
            let max_ord = children
                .iter()
                .filter_map(|c| ordinal_value(&c.source.marker))
                .max()
                .unwrap_or(0);
            let new_ord = if insert_index > 0 {
                children
                    .get(insert_index - 1)
                    .and_then(|c| ordinal_value(&c.source.marker))
                    .map(|v| v + 1)
                    .unwrap_or(max_ord + 1)
            } else {
                max_ord + 1
            };
            format!("{new_ord}{style}")
        }
        None => sample.to_string(),
    }
}

pub(crate) fn ordinal_style(marker: &str) -> Option<char> {
    if marker.ends_with('.') && marker.len() > 1 {
        Some('.')
    } else if marker.ends_with(')') && marker.len() > 1 {
        Some(')')
    } else {
        None
    }
}

pub(crate) fn ordinal_value(marker: &str) -> Option<usize> {
    marker.trim_end_matches(['.', ')']).parse().ok()
}

/// Returns (0-based insertion index into the line buffer, whether a blank
/// separator line must precede it).
pub(crate) fn compute_insert_line_index(
    parent: &Node,
    children: &[Node],
    insert_index: usize,
    buffer_len: usize,
) -> (usize, bool) {
    if insert_index < children.len() {
        (children[insert_index].source.line - 1, false)
    } else if children.is_empty() {
        if parent.is_root() {
            (buffer_len, true)
        } else {
            (parent.source.last_own_line, false)
        }
    } else {
        let last_child = &children[children.len() - 1];
        (last_child.source.last_subtree_line, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use pretty_assertions::assert_eq;

    fn params(parent: &str, target: &str, title: &str) -> AddChildParams {
        AddChildParams {
            parent: parent.to_string(),
            target: target.to_string(),
            title: title.to_string(),
            position: None,
            at: None,
            before: None,
            after: None,
            force: false,
        }
    }

    #[test]
    fn aborts_unchanged_when_document_already_has_a_fatal_parse_diagnostic() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [x](bad|name.md)\n";
        let out = add_child(src, None, &params(".", "chapter-two.md", "Chapter Two")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.bytes, src);
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.code == DiagnosticCode::IllegalPathChars)
        );
    }

    #[test]
    fn adds_first_child_under_root() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Chapter One](chapter-one.md)\n";
        let out = add_child(src, None, &params(".", "chapter-two.md", "Chapter Two")).unwrap();
        assert!(out.changed);
        assert!(out.diagnostics.is_empty());
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("chapter-one.md"));
        assert!(text.contains("chapter-two.md"));
        assert!(text.find("chapter-one.md").unwrap() < text.find("chapter-two.md").unwrap());
    }

    #[test]
    fn inserts_at_explicit_index() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Alpha](alpha.md)\n- [Beta](beta.md)\n- [Gamma](gamma.md)\n";
        let mut p = params(".", "interlude.md", "Interlude");
        p.at = Some(1);
        let out = add_child(src, None, &p).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        let order: Vec<&str> = text.lines().filter(|l| l.starts_with('-')).collect();
        assert!(order[0].contains("alpha.md"));
        assert!(order[1].contains("interlude.md"));
        assert!(order[2].contains("beta.md"));
        assert!(order[3].contains("gamma.md"));
    }

    #[test]
    fn duplicate_without_force_is_skipped_and_unchanged() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Chapter One](chapter-one.md)\n";
        let out = add_child(src, None, &params(".", "chapter-one.md", "")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.bytes, src.to_vec());
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.code == DiagnosticCode::DuplicateSkipped)
        );
    }

    #[test]
    fn force_allows_duplicate() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Chapter One](chapter-one.md)\n";
        let mut p = params(".", "chapter-one.md", "Again");
        p.force = true;
        let out = add_child(src, None, &p).unwrap();
        assert!(out.changed);
    }

    #[test]
    fn title_defaults_to_target_stem() {
        let src = b"<!-- prosemark-binder:v1 -->\n";
        let out = add_child(src, None, &params(".", "my-notes.md", "")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("[my-notes](my-notes.md)"));
    }

    #[test]
    fn rejects_non_markdown_target() {
        let src = b"<!-- prosemark-binder:v1 -->\n";
        let out = add_child(src, None, &params(".", "image.png", "Image")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.bytes, src.to_vec());
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::InvalidTargetPath);
    }

    #[test]
    fn rejects_root_escaping_target() {
        let src = b"<!-- prosemark-binder:v1 -->\n";
        let out = add_child(src, None, &params(".", "../outside.md", "Outside")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::PathEscapesRoot);
    }

    #[test]
    fn adds_nested_child_under_existing_node() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Part One](part-one.md)\n";
        let out = add_child(src, None, &params("part-one.md", "ch1.md", "Chapter 1")).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("  - [Chapter 1](ch1.md)"));
    }

    #[test]
    fn inherits_ordered_marker_style_and_increments() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n1. [One](one.md)\n2. [Two](two.md)\n";
        let mut p = params(".", "three.md", "Three");
        p.position = Some(Position::Last);
        let out = add_child(src, None, &p).unwrap();
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("3. [Three](three.md)"));
    }
}
