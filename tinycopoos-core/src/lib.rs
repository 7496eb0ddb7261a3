//! Shared data model for the TinyCoPoOS compiler.
//!
//! Three concerns live here, leaves-first: text handling (`chars`), output
//! (`sink`), and the structures the parser and transformer build and walk
//! (`interner`, `tree`, `grammar`, `diagnostics`).

pub mod chars;
pub mod diagnostics;
pub mod grammar;
pub mod interner;
pub mod sink;
pub mod tree;

pub use chars::{CharClass, Cursor};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use interner::{Interner, Symbol};
pub use sink::{BufSink, FileSink, Sink};
pub use tree::{ChildListArena, ChildListId, Node, NodeId, NodePayload, Position, Tree};
