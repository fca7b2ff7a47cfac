//! Two-pass binder parser.
//!
//! Grounded on the teacher's `parsing/mod.rs` ADR describing a two-phase block
//! parse (line classification, then block construction via a container stack).
//! Pass 1 here plays the classification role (pragma, fences, reference
//! definitions, links-in-fences); pass 2 plays the construction role, building
//! the node tree via an indent stack.

pub(crate) mod fence;
pub mod link;

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use std::sync::OnceLock;

use crate::error::CoreError;
use crate::lines::split_lines;
use crate::model::{
    Diagnostic, DiagnosticCode, Node, ParseResult, Project, RefDef, SourceMeta, Tag,
};
use fence::{CodeFence, FenceKind};
use link::{FoundLink, LinkForm, scan_links, validate_target};

const PRAGMA: &str = "<!-- prosemark-binder:v1 -->";
const BINDER_FILENAME: &str = "_binder.md";

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)([-*+]|\d+[.)])\s(.*)$").unwrap())
}

fn ref_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\[([^\]]+)\]:\s*(\S+)(?:\s+"([^"]*)")?\s*$"#).unwrap())
}

struct Pass1 {
    had_pragma: bool,
    pragma_line: usize,
    ref_defs: BTreeMap<String, RefDef>,
    fence_lines: Vec<bool>,
    diagnostics: Vec<Diagnostic>,
}

fn run_pass1(lines: &[String]) -> Pass1 {
    let mut had_pragma = false;
    let mut pragma_line = 0usize;
    let mut ref_defs = BTreeMap::new();
    let mut fence_lines = vec![false; lines.len()];
    let mut diagnostics = Vec::new();

    let mut in_fence: Option<(FenceKind, usize)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;

        if let Some(opener) = in_fence {
            fence_lines[idx] = true;
            if CodeFence::closes(opener, line) {
                in_fence = None;
            } else {
                for found in scan_links(line) {
                    if is_markdown_like(&found) {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticCode::LinkInsideFence,
                                "link found inside a code fence is not structural",
                            )
                            .at(line_no, 1, 0),
                        );
                    }
                }
            }
            continue;
        }

        if CodeFence::sig(line).is_some() {
            in_fence = Some(CodeFence::sig(line).unwrap());
            fence_lines[idx] = true;
            continue;
        }

        if !had_pragma && line.trim() == PRAGMA {
            had_pragma = true;
            pragma_line = line_no;
            continue;
        }

        if let Some(caps) = ref_def_re().captures(line) {
            let label = caps[1].to_lowercase();
            let target = caps[2].to_string();
            let title = caps.get(3).map(|m| m.as_str().to_string());
            ref_defs.entry(label.clone()).or_insert(RefDef {
                label,
                target,
                title,
                line: line_no,
            });
        }
    }

    if !had_pragma {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::MissingPragma,
            "binder file has no prosemark-binder pragma comment",
        ));
    }

    Pass1 {
        had_pragma,
        pragma_line,
        ref_defs,
        fence_lines,
        diagnostics,
    }
}

/// Recomputes which lines fall inside a code fence, for callers (the mutation
/// operations) that need this after the original `ParseResult` was produced.
pub(crate) fn fence_line_flags(lines: &[String]) -> Vec<bool> {
    let mut flags = vec![false; lines.len()];
    let mut in_fence: Option<(FenceKind, usize)> = None;
    for (idx, line) in lines.iter().enumerate() {
        if let Some(opener) = in_fence {
            flags[idx] = true;
            if CodeFence::closes(opener, line) {
                in_fence = None;
            }
            continue;
        }
        if let Some(sig) = CodeFence::sig(line) {
            in_fence = Some(sig);
            flags[idx] = true;
        }
    }
    flags
}

fn is_markdown_like(found: &FoundLink) -> bool {
    match &found.form {
        LinkForm::Inline { target, .. } => target.ends_with(".md"),
        _ => false,
    }
}

struct ListItemLine {
    indent: usize,
    indent_is_tabs: bool,
    marker: String,
    content: String,
}

fn classify_list_item(line: &str) -> Option<ListItemLine> {
    let caps = list_item_re().captures(line)?;
    let indent_str = &caps[1];
    let marker = caps[2].to_string();
    let content = caps[3].to_string();
    Some(ListItemLine {
        indent: indent_str.chars().count(),
        indent_is_tabs: indent_str.contains('\t'),
        marker,
        content,
    })
}

fn strip_checkbox_and_strike(content: &str) -> String {
    let mut s = content;
    for prefix in ["[ ] ", "[x] ", "[X] "] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    let s = s.trim();
    if let Some(inner) = s.strip_prefix("~~").and_then(|r| r.strip_suffix("~~")) {
        inner.to_string()
    } else {
        s.to_string()
    }
}

struct WikiIndex {
    by_stem_lower: HashMap<String, Vec<String>>,
}

fn build_wiki_index(project: Option<&Project>) -> WikiIndex {
    let mut by_stem_lower: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(project) = project {
        for file in &project.files {
            let stem = crate::model::stem_of(file).to_lowercase();
            by_stem_lower.entry(stem).or_default().push(file.clone());
        }
    }
    WikiIndex { by_stem_lower }
}

struct Resolved {
    target: String,
    title: String,
    diagnostics: Vec<Diagnostic>,
    fatal: bool,
    attach: bool,
}

fn resolve_link(
    found: &[FoundLink],
    ref_defs: &BTreeMap<String, RefDef>,
    wiki_index: &WikiIndex,
    project: Option<&Project>,
    line_no: usize,
) -> Option<Resolved> {
    let inline_links: Vec<&FoundLink> = found
        .iter()
        .filter(|f| matches!(f.form, LinkForm::Inline { .. }))
        .collect();

    if !inline_links.is_empty() {
        let mut diagnostics = Vec::new();
        let mut md_targets = Vec::new();
        for f in &inline_links {
            if let LinkForm::Inline {
                text,
                target,
                title,
            } = &f.form
            {
                match validate_target(target) {
                    Ok(decoded) if decoded.ends_with(".md") => {
                        md_targets.push((decoded, title.clone().unwrap_or_else(|| text.clone())));
                    }
                    Ok(_decoded) => {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticCode::NonMarkdownTarget,
                                format!("link target '{target}' is not a markdown file"),
                            )
                            .at(line_no, 1, 0),
                        );
                    }
                    Err(code) => {
                        return Some(Resolved {
                            target: String::new(),
                            title: String::new(),
                            diagnostics: vec![
                                Diagnostic::new(code, format!("link target '{target}' is invalid"))
                                    .at(line_no, 1, 0),
                            ],
                            fatal: true,
                            attach: true,
                        });
                    }
                }
            }
        }
        if !md_targets.is_empty() {
            if md_targets.len() > 1 {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::MultipleStructuralLinks,
                        "list item contains more than one markdown link",
                    )
                    .at(line_no, 1, 0),
                );
            }
            let (target, title) = md_targets.into_iter().next().unwrap();
            diagnostics.extend(target_diagnostics(&target, project, line_no));
            let attach = target != BINDER_FILENAME;
            return Some(Resolved {
                target,
                title,
                diagnostics,
                fatal: false,
                attach,
            });
        }
    }

    for f in found {
        if let LinkForm::Wiki {
            stem,
            fragment: _,
            alias,
        } = &f.form
        {
            if stem.is_empty() {
                return Some(Resolved {
                    target: String::new(),
                    title: String::new(),
                    diagnostics: vec![
                        Diagnostic::new(
                            DiagnosticCode::IllegalPathChars,
                            "wikilink has no stem, only a fragment",
                        )
                        .at(line_no, 1, 0),
                    ],
                    fatal: true,
                    attach: true,
                });
            }
            let title = alias.clone().unwrap_or_else(|| stem.clone());
            let mut diagnostics = Vec::new();
            let candidates = wiki_index.by_stem_lower.get(&stem.to_lowercase());
            let target = match candidates {
                Some(paths) if !paths.is_empty() => {
                    let exact: Vec<&String> = paths
                        .iter()
                        .filter(|p| {
                            crate::model::stem_of(p) == stem.as_str() || p.as_str() == stem.as_str()
                        })
                        .collect();
                    let chosen = if !exact.is_empty() {
                        exact
                    } else {
                        diagnostics.push(Diagnostic::new(
                            DiagnosticCode::CaseInsensitiveMatchRecovered,
                            format!("wikilink '{stem}' recovered via case-insensitive match"),
                        ));
                        paths.iter().collect()
                    };
                    if chosen.len() > 1 {
                        let min_depth =
                            chosen.iter().map(|p| p.matches('/').count()).min().unwrap();
                        let shallow: Vec<&&String> = chosen
                            .iter()
                            .filter(|p| p.matches('/').count() == min_depth)
                            .collect();
                        if shallow.len() > 1 {
                            return Some(Resolved {
                                target: String::new(),
                                title: String::new(),
                                diagnostics: vec![
                                    Diagnostic::new(
                                        DiagnosticCode::AmbiguousWikilink,
                                        format!("wikilink '{stem}' matches multiple files"),
                                    )
                                    .at(line_no, 1, 0),
                                ],
                                fatal: true,
                                attach: true,
                            });
                        }
                        (*shallow[0]).clone()
                    } else {
                        (*chosen[0]).clone()
                    }
                }
                _ => format!("{stem}.md"),
            };
            diagnostics.extend(target_diagnostics(&target, project, line_no));
            let attach = target != BINDER_FILENAME;
            return Some(Resolved {
                target,
                title,
                diagnostics,
                fatal: false,
                attach,
            });
        }
    }

    for f in found {
        let label = match &f.form {
            LinkForm::FullRef { text: _, label } => Some(label.to_lowercase()),
            LinkForm::CollapsedRef { text } => Some(text.to_lowercase()),
            LinkForm::Shortcut { text } => Some(text.to_lowercase()),
            _ => None,
        };
        if let Some(label) = label
            && let Some(def) = ref_defs.get(&label) {
                let title = def.title.clone().unwrap_or_else(|| def.label.clone());
                let mut diagnostics = Vec::new();
                match validate_target(&def.target) {
                    Ok(target) => {
                        diagnostics.extend(target_diagnostics(&target, project, line_no));
                        let attach = target != BINDER_FILENAME;
                        return Some(Resolved {
                            target,
                            title,
                            diagnostics,
                            fatal: false,
                            attach,
                        });
                    }
                    Err(code) => {
                        return Some(Resolved {
                            target: String::new(),
                            title: String::new(),
                            diagnostics: vec![
                                Diagnostic::new(
                                    code,
                                    format!("reference target '{}' is invalid", def.target),
                                )
                                .at(line_no, 1, 0),
                            ],
                            fatal: true,
                            attach: true,
                        });
                    }
                }
            }
    }

    None
}

fn target_diagnostics(target: &str, project: Option<&Project>, line_no: usize) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if target == BINDER_FILENAME {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::SelfReferentialLink,
                "node links to the binder file itself",
            )
            .at(line_no, 1, 0),
        );
    }
    if let Some(project) = project
        && !project.contains_target(target) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::MissingTargetFile,
                    format!("target file '{target}' was not found in the project"),
                )
                .at(line_no, 1, 0),
            );
        }
    diagnostics
}

/// Parses binder source bytes into a tree plus diagnostics. The only `Err`
/// path is invalid UTF-8; every other malformed input is a diagnostic.
pub fn parse(
    bytes: &[u8],
    project: Option<&Project>,
) -> Result<(ParseResult, Vec<Diagnostic>), CoreError> {
    let split = split_lines(bytes)?;
    let lines = split.lines;
    let endings = split.endings;

    let pass1 = run_pass1(&lines);
    let mut diagnostics = pass1.diagnostics;

    if split.had_bom {
        diagnostics.push(Diagnostic::new(
            DiagnosticCode::BomPresence,
            "input begins with a UTF-8 byte order mark",
        ));
    }

    let wiki_index = build_wiki_index(project);

    let mut stack: Vec<(isize, Node)> = vec![(-1, Node::root())];
    let mut seen_targets: HashSet<String> = HashSet::new();
    let mut idx = 0usize;

    while idx < lines.len() {
        let line = &lines[idx];
        let line_no = idx + 1;

        if pass1.fence_lines[idx] {
            idx += 1;
            continue;
        }

        let Some(item) = classify_list_item(line) else {
            for found in scan_links(line) {
                if is_markdown_like(&found) {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::LinkOutsideList,
                            "markdown link found outside a list item",
                        )
                        .at(line_no, 1, 0),
                    );
                }
            }
            idx += 1;
            continue;
        };

        let normalized = strip_checkbox_and_strike(&item.content);
        let mut found = scan_links(&normalized);
        let mut last_own_line = line_no;

        if found.is_empty() && idx + 1 < lines.len() && !pass1.fence_lines[idx + 1] {
            let next = &lines[idx + 1];
            let next_indent = next.chars().take_while(|c| c.is_whitespace()).count();
            if classify_list_item(next).is_none()
                && !next.trim().is_empty()
                && next_indent > item.indent
            {
                found = scan_links(next.trim());
                if !found.is_empty() {
                    last_own_line = idx + 2;
                    idx += 1;
                }
            }
        }

        let resolved = resolve_link(&found, &pass1.ref_defs, &wiki_index, project, line_no);

        match resolved {
            None => {}
            Some(resolved) if resolved.fatal || !resolved.attach => {
                diagnostics.extend(resolved.diagnostics);
            }
            Some(resolved) => {
                diagnostics.extend(resolved.diagnostics);
                if !seen_targets.insert(resolved.target.clone()) {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::DuplicateFileReference,
                            format!("target '{}' is referenced more than once", resolved.target),
                        )
                        .at(line_no, 1, 0),
                    );
                }

                let node = Node {
                    tag: Tag::Item,
                    target: resolved.target,
                    title: resolved.title,
                    children: Vec::new(),
                    source: SourceMeta {
                        line: line_no,
                        column: item.indent + item.marker.len() + 2,
                        byte_offset: 0,
                        last_own_line,
                        last_subtree_line: last_own_line,
                        indent_width: item.indent,
                        indent_is_tabs: item.indent_is_tabs,
                        marker: item.marker.clone(),
                        raw_line: line.clone(),
                        in_fence: false,
                    },
                };

                while stack.last().unwrap().0 >= item.indent as isize {
                    let (_, popped) = stack.pop().unwrap();
                    attach_and_extend(&mut stack, popped);
                }
                stack.push((item.indent as isize, node));
            }
        }

        idx += 1;
    }

    while stack.len() > 1 {
        let (_, popped) = stack.pop().unwrap();
        attach_and_extend(&mut stack, popped);
    }
    let (_, mut root) = stack.pop().unwrap();
    recompute_subtree_lines(&mut root);

    let mut result = ParseResult::new(root, lines, endings);
    result.ref_defs = pass1.ref_defs;
    result.had_bom = split.had_bom;
    result.had_pragma = pass1.had_pragma;
    result.pragma_line = pass1.pragma_line;

    Ok((result, diagnostics))
}

fn attach_and_extend(stack: &mut [(isize, Node)], child: Node) {
    stack.last_mut().unwrap().1.children.push(child);
}

fn recompute_subtree_lines(node: &mut Node) {
    for child in &mut node.children {
        recompute_subtree_lines(child);
    }
    let own = node.source.last_own_line;
    let max_child = node
        .children
        .iter()
        .map(|c| c.source.last_subtree_line)
        .max()
        .unwrap_or(0);
    node.source.last_subtree_line = own.max(max_child);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[derive(serde::Serialize)]
    struct ParseSnapshot {
        tree: crate::wire::TreeWire,
        diagnostics: Vec<&'static str>,
    }

    #[rstest]
    #[case(
        "<!-- prosemark-binder:v1 -->\n\n- [Alpha](alpha.md)\n- [Beta](beta.md)\n",
        "flat_list"
    )]
    #[case(
        "<!-- prosemark-binder:v1 -->\n\n- [Part One](part-one.md)\n  - [Ch 1](ch1.md)\n  - [Ch 2](ch2.md)\n",
        "nested_list"
    )]
    #[case("<!-- prosemark-binder:v1 -->\n- [Self](_binder.md)\n", "self_referential")]
    #[case("- [Alpha](alpha.md)\n", "missing_pragma")]
    #[case(
        "<!-- prosemark-binder:v1 -->\n```\n- [a](a.md)\n```\n- [Real](real.md)\n",
        "fenced_link"
    )]
    fn parse_snapshot(#[case] src: &str, #[case] name: &str) {
        let (result, diagnostics) = parse(src.as_bytes(), None).unwrap();
        let snap = ParseSnapshot {
            tree: crate::wire::TreeWire::from_root(&result.root),
            diagnostics: diagnostics.iter().map(|d| d.code.wire_code()).collect(),
        };
        insta::assert_yaml_snapshot!(name, snap);
    }

    #[test]
    fn parses_flat_list_into_children_of_root() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Alpha](alpha.md)\n- [Beta](beta.md)\n";
        let (result, diags) = parse(src, None).unwrap();
        assert_eq!(result.root.children.len(), 2);
        assert_eq!(result.root.children[0].target, "alpha.md");
        assert_eq!(result.root.children[1].target, "beta.md");
        assert!(diags.iter().all(|d| !d.is_fatal()));
    }

    #[test]
    fn parses_nested_list_into_tree() {
        let src = b"<!-- prosemark-binder:v1 -->\n\n- [Part One](part-one.md)\n  - [Ch 1](ch1.md)\n  - [Ch 2](ch2.md)\n";
        let (result, _) = parse(src, None).unwrap();
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].children.len(), 2);
    }

    #[test]
    fn missing_pragma_is_a_warning_not_fatal() {
        let src = b"- [Alpha](alpha.md)\n";
        let (_, diags) = parse(src, None).unwrap();
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::MissingPragma)
        );
    }

    #[test]
    fn links_inside_fence_are_not_structural() {
        let src = b"<!-- prosemark-binder:v1 -->\n```\n- [a](a.md)\n```\n- [Real](real.md)\n";
        let (result, diags) = parse(src, None).unwrap();
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].target, "real.md");
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::LinkInsideFence)
        );
    }

    #[test]
    fn duplicate_targets_emit_warning() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n- [Again](a.md)\n";
        let (_, diags) = parse(src, None).unwrap();
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::DuplicateFileReference)
        );
    }

    #[test]
    fn wikilink_resolves_against_project_index() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [[chapter-one]]\n";
        let project = Project::new(vec!["notes/chapter-one.md".to_string()]);
        let (result, _) = parse(src, Some(&project)).unwrap();
        assert_eq!(result.root.children[0].target, "notes/chapter-one.md");
    }

    #[test]
    fn ambiguous_wikilink_is_fatal_and_drops_node() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [[dup]]\n";
        let project = Project::new(vec!["a/dup.md".to_string(), "b/dup.md".to_string()]);
        let (result, diags) = parse(src, Some(&project)).unwrap();
        assert!(result.root.children.is_empty());
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::AmbiguousWikilink)
        );
    }

    #[test]
    fn non_markdown_target_falls_back_to_second_inline_link() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [img](pic.png) and [real](real.md)\n";
        let (result, diags) = parse(src, None).unwrap();
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].target, "real.md");
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::NonMarkdownTarget)
        );
    }

    #[test]
    fn reference_style_link_resolves_via_definition() {
        let src =
            b"<!-- prosemark-binder:v1 -->\n- [Chapter One][ch1]\n\n[ch1]: chapter-one.md \"Ch. 1\"\n";
        let (result, _) = parse(src, None).unwrap();
        assert_eq!(result.root.children[0].target, "chapter-one.md");
        assert_eq!(result.root.children[0].title, "Ch. 1");
    }

    #[test]
    fn self_referential_link_is_flagged() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [Self](_binder.md)\n";
        let (result, diags) = parse(src, None).unwrap();
        assert!(
            diags
                .iter()
                .any(|d| d.code == DiagnosticCode::SelfReferentialLink)
        );
        assert!(result.root.children.is_empty());
    }
}
