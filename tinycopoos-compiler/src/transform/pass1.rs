//! Pass 1 (spec.md §4.J): discover task names, then for each task walk its
//! body once, promoting local declarations to globals and recording the
//! rename each promotion requires of the identifier references following
//! it, plus what to do with the now-homeless declaration statement itself.

use std::collections::{HashMap, HashSet};

use tinycopoos_core::interner::{Interner, Symbol};
use tinycopoos_core::tree::{NodeId, NodePayload, Tree};

use crate::ast::{self, decl, StorageClass};

use super::{PromotedGlobal, TransformDiagnostic};

/// What happens to a local declaration statement once its declarator(s)
/// have been promoted to task-global storage: it either disappears
/// entirely (no initializer to preserve), becomes a plain assignment (a
/// non-suspending initializer), or marks the suspension boundary itself (a
/// task call used as an initializer — spec.md §4.J's "task call" case
/// covers both statement-level calls and calls used to initialize a local).
#[derive(Clone)]
pub enum DeclRewrite {
    Removed,
    Assign { name: String, init: NodeId },
    CallBoundary { callee: String },
}

/// Every top-level `task`-storage-class function, collected by name so
/// call sites elsewhere in the program can be recognized as suspension
/// points (spec.md §4.J: "a call to another task, recognized by the
/// callee's identifier matching any registered task name").
pub fn task_names(tree: &Tree, interner: &Interner, root: NodeId) -> HashSet<String> {
    let mut names = HashSet::new();
    for &item in ast::children(tree, root) {
        if tree.type_name(item) != decl::FUNC_DEF {
            continue;
        }
        let children = ast::children(tree, item);
        let specifiers = children[0];
        if task_storage_class(tree, specifiers) == Some(StorageClass::Task) {
            let declarator = children[1];
            if let Some(name) = declarator_name(tree, interner, declarator) {
                names.insert(name.to_owned());
            }
        }
    }
    names
}

/// `decl_specifiers` has one child (just a type specifier) or two (a
/// storage-class keyword followed by the type specifier); only the latter
/// carries a storage class.
pub fn task_storage_class(tree: &Tree, specifiers: NodeId) -> Option<StorageClass> {
    let children = ast::children(tree, specifiers);
    if children.len() == 2 {
        Some(ast::storage_class_of(tree, children[0]))
    } else {
        None
    }
}

/// The name a declarator ultimately binds, peeling through `pointer`,
/// `array_of`, and `function_of` wrappers to the base identifier (a task's
/// own declarator is usually just a bare name plus an empty parameter
/// list, i.e. a `function_of` wrapping an `ident`).
pub fn declarator_name<'i>(tree: &Tree, interner: &'i Interner, declarator: NodeId) -> Option<&'i str> {
    if tree.type_name(declarator) == "ident" {
        let (sym, _) = tree.expect_ident(declarator);
        return Some(interner.resolve(sym));
    }
    match tree.type_name(declarator) {
        decl::POINTER | decl::ARRAY_OF | decl::FUNCTION_OF => {
            let children = ast::children(tree, declarator);
            declarator_name(tree, interner, children[0])
        }
        _ => None,
    }
}

/// Result of promoting every local declaration found (at any nesting
/// depth) inside one task's body. `decl_rewrites` holds one entry per
/// `decl` statement, a Vec in declarator order — a single `decl` can carry
/// several comma-separated declarators (`int x = 1, y = g();`), each with
/// its own independent rewrite, so a single `DeclRewrite` per statement
/// would let a later declarator's rewrite silently clobber an earlier
/// one's.
pub struct Promotion {
    pub globals: Vec<PromotedGlobal>,
    pub decl_rewrites: HashMap<NodeId, Vec<DeclRewrite>>,
}

pub fn promote_locals(
    tree: &mut Tree,
    interner: &mut Interner,
    task_names: &HashSet<String>,
    task_text: &str,
    body_stmts: &[NodeId],
    diagnostics: &mut Vec<TransformDiagnostic>,
) -> Promotion {
    let mut globals = Vec::new();
    let mut decl_rewrites = HashMap::new();
    let mut rename_map: HashMap<Symbol, Symbol> = HashMap::new();
    let mut counter = 1u32;

    let mut decl_ids = Vec::new();
    for &s in body_stmts {
        collect_tagged(tree, s, decl::DECL, &mut decl_ids);
    }

    for decl_id in decl_ids {
        let children = ast::children(tree, decl_id).to_vec();
        if children.len() != 2 {
            // `struct Foo;`-style declaration with no declarators: nothing
            // to promote.
            continue;
        }
        let specifiers = children[0];
        let type_text = crate::unparse::Unparser::to_string(tree, interner, specifiers);
        let declarator_list = ast::list_children(tree, children[1]).to_vec();

        for item in declarator_list {
            let (name_node, init) = match tree.type_name(item) {
                "ident" => (item, None),
                decl::INIT_DECLARATOR => {
                    let parts = ast::children(tree, item);
                    (parts[0], Some(parts[1]))
                }
                _ => {
                    diagnostics.push(TransformDiagnostic::skipped(
                        "complex_declarator_promotion",
                        tree.position(item),
                    ));
                    continue;
                }
            };
            if tree.type_name(name_node) != "ident" {
                diagnostics.push(TransformDiagnostic::skipped(
                    "complex_declarator_promotion",
                    tree.position(name_node),
                ));
                continue;
            }
            let (orig_sym, _) = tree.expect_ident(name_node);
            let orig_text = interner.resolve(orig_sym).to_owned();
            let new_name = format!("{task_text}_var{counter}_{orig_text}");
            counter += 1;
            let new_sym = interner.intern(&new_name);
            rename_map.insert(orig_sym, new_sym);

            globals.push(PromotedGlobal {
                name: new_name.clone(),
                type_text: type_text.clone(),
            });

            let rewrite = match init {
                None => DeclRewrite::Removed,
                Some(init_node) => match ast::call_target_name(tree, interner, init_node) {
                    Some(callee) if task_names.contains(callee) => {
                        DeclRewrite::CallBoundary { callee: callee.to_owned() }
                    }
                    _ => DeclRewrite::Assign { name: new_name.clone(), init: init_node },
                },
            };
            decl_rewrites.entry(decl_id).or_insert_with(Vec::new).push(rewrite);
        }
    }

    // Rewrite every reference — including the declarator's own name, which
    // is harmless since the declaration statement itself is about to be
    // removed or replaced — to the promoted global's interned name.
    let mut ident_ids = Vec::new();
    for &s in body_stmts {
        collect_idents(tree, s, &mut ident_ids);
    }
    for id in ident_ids {
        let (sym, _) = tree.expect_ident(id);
        if let Some(&renamed) = rename_map.get(&sym) {
            tree.rename_ident(id, renamed);
        }
    }

    Promotion { globals, decl_rewrites }
}

fn collect_tagged(tree: &Tree, id: NodeId, tag: &'static str, out: &mut Vec<NodeId>) {
    if tree.type_name(id) == tag {
        out.push(id);
    }
    for_each_child(tree, id, |c| collect_tagged(tree, c, tag, out));
}

fn collect_idents(tree: &Tree, id: NodeId, out: &mut Vec<NodeId>) {
    if matches!(tree.get(id), NodePayload::Ident { .. }) {
        out.push(id);
    }
    for_each_child(tree, id, |c| collect_idents(tree, c, out));
}

/// Generic descent used by the collectors above: recurse through whatever
/// children `id` has, regardless of its tag.
pub fn for_each_child(tree: &Tree, id: NodeId, mut visit: impl FnMut(NodeId)) {
    match tree.get(id) {
        NodePayload::Tree { children, .. } | NodePayload::List { children, .. } => {
            for &c in children {
                visit(c);
            }
        }
        _ => {}
    }
}
