//! Source-preserving parser, selector evaluator, and mutation operations for
//! binder Markdown documents (spec §1–§8): parse bytes into a diagnostic-
//! annotated tree, resolve selectors against it, and apply add-child/delete/
//! move while leaving every non-structural byte of the source untouched.

pub mod error;
pub mod lines;
pub mod model;
pub mod ops;
pub mod parser;
pub mod selector;
pub mod serializer;
pub mod wire;

pub use error::CoreError;
pub use model::{
    AddChildParams, DeleteParams, Diagnostic, DiagnosticCode, Location, MoveParams, Node,
    OperationOutcome, ParseResult, Position, Project, RefDef, Severity, Tag,
};
pub use ops::add_child::add_child;
pub use ops::delete::delete;
pub use ops::move_op::move_node;
pub use parser::parse;
pub use selector::evaluate as evaluate_selector;
pub use serializer::serialize;
