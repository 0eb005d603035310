pub mod document;
pub mod dom_patch;
pub mod forms;
pub mod fragment;
pub mod scripts;
pub mod serialize;
pub mod traverse;

mod entities;
mod tokenizer;
mod types;

pub use crate::document::{Document, DomError, FilePart, NodeData, Preorder};
pub use crate::dom_patch::{DomPatcher, PatchError, Position, resolve_id};
pub use crate::forms::{ControlKind, FieldValue, HarvestScope, control_kind, harvest_fields};
pub use crate::fragment::{
    HostParser, MarkupParser, ParseError, parse_document, parse_fragment, parse_xml,
};
pub use crate::scripts::{
    NoScripts, ScriptError, ScriptHost, ScriptRunner, ScriptSource, ScriptSpec,
};
pub use crate::tokenizer::{ScanMode, tokenize};
pub use crate::types::{Node, NodeKey, Token};

