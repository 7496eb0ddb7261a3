//! Typed view over the generic AST arena for the C + TinyCoPoOS grammar.
//!
//! `grammar_c` tags every synthesized tree node with one of the `&'static
//! str` constants below as its `type_name` (spec.md §4.I: "Tree construction
//! callbacks are standardized"). This module is the one place that knows
//! what those tags mean, so the transformation passes and the unparser can
//! dispatch on them without scattering string literals everywhere.

use tinycopoos_core::tree::{NodeId, Tree};

pub mod expr {
    pub const MUL: &str = "mul";
    pub const DIV: &str = "div";
    pub const MOD: &str = "mod";
    pub const ADD: &str = "add";
    pub const SUB: &str = "sub";
    pub const SHL: &str = "shl";
    pub const SHR: &str = "shr";
    pub const LT: &str = "lt";
    pub const GT: &str = "gt";
    pub const LE: &str = "le";
    pub const GE: &str = "ge";
    pub const EQ: &str = "eq";
    pub const NE: &str = "ne";
    pub const BAND: &str = "band";
    pub const BXOR: &str = "bxor";
    pub const BOR: &str = "bor";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const COND: &str = "cond";
    pub const ASSIGN: &str = "assign";
    pub const COMPOUND_ASSIGN: &str = "compound_assign";
    pub const CAST: &str = "cast";
    pub const NEG: &str = "neg";
    pub const NOT: &str = "not";
    pub const BNOT: &str = "bnot";
    pub const DEREF: &str = "deref";
    pub const ADDR: &str = "addr";
    pub const PREINC: &str = "preinc";
    pub const PREDEC: &str = "predec";
    pub const POSTINC: &str = "postinc";
    pub const POSTDEC: &str = "postdec";
    pub const INDEX: &str = "index";
    pub const CALL: &str = "call";
    pub const MEMBER: &str = "member";
    pub const ARROW: &str = "arrow";
    pub const SIZEOF: &str = "sizeof";
    pub const PAREN: &str = "paren";
    /// Placeholder for an omitted `for` clause (`for (;;)`'s init,
    /// condition, or update) — a zero-child, empty-`fmt` leaf so the
    /// unparser renders it as nothing while `for`'s child count stays
    /// fixed at 4 regardless of which clauses were actually written.
    pub const EMPTY: &str = "empty";
}

pub mod decl {
    pub const DECL: &str = "decl";
    pub const INIT_DECLARATOR: &str = "init_declarator";
    pub const DECLARATOR: &str = "declarator";
    pub const POINTER: &str = "pointer";
    pub const ARRAY_OF: &str = "array_of";
    pub const FUNCTION_OF: &str = "function_of";
    pub const PARAM: &str = "param";
    pub const FUNC_DEF: &str = "func_def";
    pub const TYPE_SPECIFIER: &str = "type_specifier";
    pub const STRUCT_SPEC: &str = "struct_spec";
    pub const UNION_SPEC: &str = "union_spec";
    pub const ENUM_SPEC: &str = "enum_spec";
    pub const FIELD_DECL: &str = "field_decl";
    pub const ENUMERATOR: &str = "enumerator";
    pub const STORAGE_CLASS: &str = "storage_class";
    pub const DECL_SPECIFIERS: &str = "decl_specifiers";
    pub const TRANSLATION_UNIT: &str = "translation_unit";
    /// A K&R old-style function definition (distinct from [`FUNC_DEF`] since
    /// its children layout — return type, name, parameter-name list,
    /// parameter-declaration list, then body statements — doesn't match
    /// `FUNC_DEF`'s `[specifiers, declarator, ...body]` shape the transform
    /// passes index into). Never treated as a task definition: TinyCoPoOS
    /// tasks are always declared new-style.
    pub const FUNC_DEF_KR: &str = "func_def_kr";
}

pub mod stmt {
    pub const BLOCK: &str = "block";
    pub const EXPR_STMT: &str = "expr_stmt";
    pub const EMPTY_STMT: &str = "empty_stmt";
    pub const IF: &str = "if";
    pub const IF_ELSE: &str = "if_else";
    pub const WHILE: &str = "while";
    pub const DO_WHILE: &str = "do_while";
    pub const FOR: &str = "for";
    pub const RETURN: &str = "return";
    pub const RETURN_VOID: &str = "return_void";
    pub const BREAK: &str = "break";
    pub const CONTINUE: &str = "continue";
    pub const GOTO: &str = "goto";
    pub const LABEL: &str = "label";
    pub const SWITCH: &str = "switch";
    pub const CASE: &str = "case";
    pub const DEFAULT: &str = "default";
    pub const QUEUE_FOR: &str = "queue_for";
    pub const POLL: &str = "poll";
    pub const POLL_AT_MOST: &str = "poll_at_most";
    pub const TIMER: &str = "timer";
    pub const EVERY_START: &str = "every_start";
}

/// Storage-class keyword recorded on a declaration's specifiers
/// (spec.md §4.I: "A new storage-class keyword `task`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    None,
    Static,
    Extern,
    Typedef,
    Task,
}

/// A generic accessor for a tree node's children, regardless of which tag
/// it carries — convenient for passes that only need positional access.
pub fn children<'t>(tree: &'t Tree, id: NodeId) -> &'t [NodeId] {
    tree.expect_tree(id, "ast child access").2
}

/// The children of a `list` sentinel node (comma- or bare-repeated items
/// the grammar built with `comma_list`/`bare_list`), as opposed to a tagged
/// tree's children.
pub fn list_children<'t>(tree: &'t Tree, id: NodeId) -> &'t [NodeId] {
    match tree.get(id) {
        tinycopoos_core::tree::NodePayload::List { children, .. } => children,
        other => panic!("internal invariant broken: expected list node, found {:?}", std::mem::discriminant(other)),
    }
}

/// The literal text a fixed-keyword leaf node (`storage_class`,
/// `type_specifier`) was built from, stored in the node's format string
/// since it has no children to carry it.
pub fn keyword_text(tree: &Tree, id: NodeId) -> &'static str {
    tree.expect_tree(id, "keyword leaf").1
}

pub fn storage_class_of(tree: &Tree, id: NodeId) -> StorageClass {
    match keyword_text(tree, id) {
        "static" => StorageClass::Static,
        "extern" => StorageClass::Extern,
        "typedef" => StorageClass::Typedef,
        "task" => StorageClass::Task,
        other => panic!("internal invariant broken: unknown storage class keyword {other:?}"),
    }
}

pub fn type_name(tree: &Tree, id: NodeId) -> &'static str {
    tree.type_name(id)
}

/// True if `id` is a `call` expression whose callee identifier resolves to
/// `task_name` — the suspension-point recognition rule of spec.md §4.J
/// ("a call to another task (recognized by the callee's identifier matching
/// any registered task name)").
pub fn call_target_name<'a>(tree: &Tree, interner: &'a tinycopoos_core::interner::Interner, id: NodeId) -> Option<&'a str> {
    if tree.type_name(id) != expr::CALL {
        return None;
    }
    let callee = children(tree, id)[0];
    if tree.type_name(callee) != "ident" {
        return None;
    }
    let (sym, _) = tree.expect_ident(callee);
    Some(interner.resolve(sym))
}
