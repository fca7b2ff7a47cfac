use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node in the parsed binder tree. The synthetic root has `tag == Tag::Root`
/// and empty `target`/`title`; every other node carries a structural link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: Tag,
    pub target: String,
    pub title: String,
    pub children: Vec<Node>,
    pub source: SourceMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Root,
    Item,
}

/// Everything the operations need to locate and rewrite a node's source line(s).
/// Never serialized to the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceMeta {
    /// 1-based line number of the node's own list-item line. 0 for the root.
    pub line: usize,
    /// 1-based column where the structural link begins. 0 for the root.
    pub column: usize,
    /// 0-based byte offset of the structural link. 0 for the root.
    pub byte_offset: usize,
    /// 1-based line number of the last line belonging to this node's own item
    /// (before any children). Equals `line` unless a continuation line was consumed.
    pub last_own_line: usize,
    /// 1-based line number of the last line in this node's entire subtree.
    pub last_subtree_line: usize,
    /// Count of leading whitespace characters before the marker.
    pub indent_width: usize,
    /// True if the leading whitespace uses tabs, false if spaces.
    pub indent_is_tabs: bool,
    /// The original marker string, e.g. "-", "*", "1.", "2)".
    pub marker: String,
    /// The exact original line bytes (sans line ending), for diagnostics.
    pub raw_line: String,
    /// True if this node's link was found while scanning inside a code fence.
    pub in_fence: bool,
}

impl Node {
    pub fn root() -> Self {
        Node {
            tag: Tag::Root,
            target: String::new(),
            title: String::new(),
            children: Vec::new(),
            source: SourceMeta::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.tag, Tag::Root)
    }

    /// The target's basename without its final extension.
    pub fn stem(&self) -> &str {
        stem_of(&self.target)
    }
}

pub fn stem_of(target: &str) -> &str {
    let base = target.rsplit('/').next().unwrap_or(target);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    // Parse errors
    IllegalPathChars,
    PathEscapesRoot,
    AmbiguousWikilink,
    // Parse warnings
    MissingPragma,
    MultipleStructuralLinks,
    DuplicateFileReference,
    MissingTargetFile,
    LinkInsideFence,
    LinkOutsideList,
    NonMarkdownTarget,
    SelfReferentialLink,
    CaseInsensitiveMatchRecovered,
    BomPresence,
    // Operation errors
    RootGuard,
    SelectorNoMatch,
    AmbiguousBareStem,
    CycleDetected,
    InvalidTargetPath,
    TargetIsBinder,
    NodeInCodeFence,
    SiblingNotFound,
    MissingConfirmation,
    IndexOutOfBounds,
    IoOrParseFailure,
    ConflictingFlags,
    // Operation warnings
    MultiMatch,
    DuplicateSkipped,
    NonStructuralDestroyed,
    EmptySublistPruned,
    CascadeDelete,
}

impl DiagnosticCode {
    pub fn severity(self) -> Severity {
        use DiagnosticCode::*;
        match self {
            IllegalPathChars | PathEscapesRoot | AmbiguousWikilink | RootGuard
            | SelectorNoMatch | AmbiguousBareStem | CycleDetected | InvalidTargetPath
            | TargetIsBinder | NodeInCodeFence | SiblingNotFound | MissingConfirmation
            | IndexOutOfBounds | IoOrParseFailure | ConflictingFlags => Severity::Error,
            _ => Severity::Warning,
        }
    }

    pub fn wire_code(self) -> &'static str {
        use DiagnosticCode::*;
        match self {
            IllegalPathChars => "BNDE001",
            PathEscapesRoot => "BNDE002",
            AmbiguousWikilink => "BNDE003",
            MissingPragma => "BNDW001",
            MultipleStructuralLinks => "BNDW002",
            DuplicateFileReference => "BNDW003",
            MissingTargetFile => "BNDW004",
            LinkInsideFence => "BNDW005",
            LinkOutsideList => "BNDW006",
            NonMarkdownTarget => "BNDW007",
            SelfReferentialLink => "BNDW008",
            CaseInsensitiveMatchRecovered => "BNDW009",
            BomPresence => "BNDW010",
            RootGuard => "OPE001",
            SelectorNoMatch => "OPE002",
            AmbiguousBareStem => "OPE003",
            CycleDetected => "OPE004",
            InvalidTargetPath => "OPE005",
            TargetIsBinder => "OPE006",
            NodeInCodeFence => "OPE007",
            SiblingNotFound => "OPE008",
            MissingConfirmation => "OPE009",
            IndexOutOfBounds => "OPE010",
            IoOrParseFailure => "OPE011",
            ConflictingFlags => "OPE012",
            MultiMatch => "OPW001",
            DuplicateSkipped => "OPW002",
            NonStructuralDestroyed => "OPW003",
            EmptySublistPruned => "OPW004",
            CascadeDelete => "OPW005",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize, byte_offset: usize) -> Self {
        self.location = Some(Location {
            line,
            column,
            byte_offset,
        });
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefDef {
    pub label: String,
    pub target: String,
    pub title: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub version: &'static str,
    pub root: Node,
    pub lines: Vec<String>,
    pub endings: Vec<String>,
    pub ref_defs: BTreeMap<String, RefDef>,
    pub had_bom: bool,
    pub had_pragma: bool,
    pub pragma_line: usize,
}

impl ParseResult {
    pub fn new(root: Node, lines: Vec<String>, endings: Vec<String>) -> Self {
        ParseResult {
            version: "1",
            root,
            lines,
            endings,
            ref_defs: BTreeMap::new(),
            had_bom: false,
            had_pragma: false,
            pragma_line: 0,
        }
    }
}

/// The caller-supplied file inventory used to resolve wiki-links and validate
/// `missing-target-file` diagnostics. Read-only input; the core never scans disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub files: Vec<String>,
    pub binder_dir: Option<String>,
}

impl Project {
    pub fn new(files: Vec<String>) -> Self {
        Project {
            files,
            binder_dir: None,
        }
    }

    pub fn contains_target(&self, target: &str) -> bool {
        self.files.iter().any(|f| f == target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddChildParams {
    pub parent: String,
    pub target: String,
    pub title: String,
    pub position: Option<Position>,
    pub at: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteParams {
    pub selector: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveParams {
    pub source: String,
    pub destination: String,
    pub position: Option<Position>,
    pub at: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub confirmed: bool,
}

/// Result of any mutation operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub changed: bool,
}

// Wire-facing serde shapes live in `wire.rs`; kept separate so that `Node`
// itself can carry non-serializable source metadata without leaking it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireNodeTag {
    Root,
    Node,
}
