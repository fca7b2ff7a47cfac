//! JSON wire shapes for the boundary the core sits behind (spec §6). The CLI
//! collaborator owns actual `serde_json::to_string` calls; this module only
//! owns the shapes so fixtures produced by either side agree.

use serde::Serialize;

use crate::model::{Diagnostic, Node, OperationOutcome, Severity, WireNodeTag};

/// `{ "version": "1", "root": N }`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TreeWire {
    pub version: &'static str,
    pub root: NodeWire,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeWire {
    #[serde(rename = "type")]
    pub tag: WireNodeTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub children: Vec<NodeWire>,
}

impl From<&Node> for NodeWire {
    fn from(node: &Node) -> Self {
        if node.is_root() {
            NodeWire {
                tag: WireNodeTag::Root,
                target: None,
                title: None,
                children: node.children.iter().map(NodeWire::from).collect(),
            }
        } else {
            NodeWire {
                tag: WireNodeTag::Node,
                target: Some(node.target.clone()),
                title: Some(node.title.clone()),
                children: node.children.iter().map(NodeWire::from).collect(),
            }
        }
    }
}

impl TreeWire {
    pub fn from_root(root: &Node) -> Self {
        TreeWire {
            version: "1",
            root: NodeWire::from(root),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum SeverityWire {
    Error,
    Warning,
}

impl From<Severity> for SeverityWire {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Error => SeverityWire::Error,
            Severity::Warning => SeverityWire::Warning,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LocationWire {
    pub line: usize,
    pub column: usize,
    #[serde(rename = "byteOffset")]
    pub byte_offset: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiagnosticWire {
    severity: SeverityWire,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<LocationWire>,
}

impl From<&Diagnostic> for DiagnosticWire {
    fn from(d: &Diagnostic) -> Self {
        DiagnosticWire {
            severity: d.severity().into(),
            code: d.code.wire_code(),
            message: d.message.clone(),
            location: d.location.as_ref().map(|l| LocationWire {
                line: l.line,
                column: l.column,
                byte_offset: l.byte_offset,
            }),
        }
    }
}

/// `{ "version": "1", "diagnostics": [ D, … ] }`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiagnosticsWire {
    pub version: &'static str,
    pub diagnostics: Vec<DiagnosticWire>,
}

impl DiagnosticsWire {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        DiagnosticsWire {
            version: "1",
            diagnostics: diagnostics.iter().map(DiagnosticWire::from).collect(),
        }
    }
}

/// `{ "version": "1", "changed": bool, "diagnostics": […] }`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OperationResultWire {
    pub version: &'static str,
    pub changed: bool,
    pub diagnostics: Vec<DiagnosticWire>,
}

impl OperationResultWire {
    pub fn from_outcome(outcome: &OperationOutcome) -> Self {
        OperationResultWire {
            version: "1",
            changed: outcome.changed,
            diagnostics: outcome
                .diagnostics
                .iter()
                .map(DiagnosticWire::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeleteParams;
    use crate::ops::delete::delete;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn tree_wire_omits_source_metadata_and_root_fields() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n";
        let (result, _) = parse(src, None).unwrap();
        let wire = TreeWire::from_root(&result.root);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["version"], "1");
        assert_eq!(json["root"]["type"], "root");
        assert!(json["root"].get("target").is_none());
        assert_eq!(json["root"]["children"][0]["type"], "node");
        assert_eq!(json["root"]["children"][0]["target"], "a.md");
    }

    #[test]
    fn diagnostics_wire_uses_closed_taxonomy_codes() {
        let src = b"- [A](a.md)\n";
        let (_, diagnostics) = parse(src, None).unwrap();
        let wire = DiagnosticsWire::from_diagnostics(&diagnostics);
        assert!(
            wire.diagnostics
                .iter()
                .any(|d| d.code == "BNDW001" && d.severity == SeverityWire::Warning)
        );
    }

    #[test]
    fn operation_result_wire_changed_matches_outcome() {
        let src = b"<!-- prosemark-binder:v1 -->\n- [A](a.md)\n";
        let outcome = delete(
            src,
            None,
            &DeleteParams {
                selector: "a".to_string(),
                confirmed: true,
            },
        )
        .unwrap();
        let wire = OperationResultWire::from_outcome(&outcome);
        assert!(wire.changed);

        let unconfirmed = delete(
            src,
            None,
            &DeleteParams {
                selector: "a".to_string(),
                confirmed: false,
            },
        )
        .unwrap();
        let wire = OperationResultWire::from_outcome(&unconfirmed);
        assert!(!wire.changed);
    }
}
