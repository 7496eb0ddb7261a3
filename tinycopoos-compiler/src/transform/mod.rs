//! Task transformation (spec.md §4.J): lowers `task`-storage-class
//! functions and the TinyCoPoOS statement extensions they contain into
//! plain C plus calls into the cooperative scheduler (whose own runtime is
//! out of scope here — see spec.md's Non-goals).
//!
//! Two passes, grounded directly in spec.md's own two-pass description:
//! [`pass1`] discovers task names and promotes each task's locals to
//! global storage; [`pass2`] walks the now-flat body again, splitting it
//! into `<task>_step<k>` functions at every suspension point.

mod pass1;
mod pass2;

use indexmap::IndexMap;

use tinycopoos_core::interner::Interner;
use tinycopoos_core::tree::{NodeId, Position, Tree};

use crate::ast::{self, decl, stmt, StorageClass};
use crate::unparse::Unparser;

pub use pass2::StmtItem;

/// A variable hoisted from a task's stack frame to file scope because the
/// task's execution is split across multiple step functions that must
/// share it (spec.md §4.J: "no task-local storage survives a suspension
/// point except via promotion").
pub struct PromotedGlobal {
    pub name: String,
    pub type_text: String,
}

/// One `<task>_step<k>` function.
pub struct Step {
    pub name: String,
    pub body: Vec<StmtItem>,
}

/// A fully-lowered task: its step functions, in the order step numbers
/// were assigned.
pub struct TaskPlan {
    pub name: String,
    pub result_type: Option<String>,
    pub steps: Vec<Step>,
}

/// A top-level `every (<period>) start <task>;` (spec.md §4.J rule e),
/// relocated into the generated `os_init`.
pub struct EveryStart {
    pub period: NodeId,
    pub task: String,
}

/// A statement form the transform chose not to lower (an unsupported
/// declarator shape, or a suspension point nested somewhere pass 2
/// doesn't decompose, such as inside a loop). Recorded rather than
/// silently dropped; surfaced to the caller so a real implementation could
/// report it without this pass needing to know how diagnostics are
/// rendered.
pub struct TransformDiagnostic {
    pub stmt_kind: &'static str,
    pub position: Position,
}

impl TransformDiagnostic {
    pub fn skipped(stmt_kind: &'static str, position: Position) -> Self {
        Self { stmt_kind, position }
    }
}

/// Task table and promoted-globals list both use `IndexMap` (spec.md's
/// ambient "ordered collections" requirement): insertion order survives for
/// rendering, and callers can still look a task or global up by name
/// without a linear scan.
pub struct TransformOutput {
    pub leading_decls: Vec<String>,
    pub tasks: IndexMap<String, TaskPlan>,
    pub promoted: IndexMap<String, PromotedGlobal>,
    pub every_starts: Vec<EveryStart>,
    pub diagnostics: Vec<TransformDiagnostic>,
}

/// Run both passes over every task in the program, plus the top-level
/// `every` collection for ordinary (non-task) functions.
pub fn transform(tree: &mut Tree, interner: &mut Interner, root: NodeId) -> TransformOutput {
    let task_names = pass1::task_names(tree, interner, root);
    let mut leading_decls = Vec::new();
    let mut promoted = IndexMap::new();
    let mut tasks = IndexMap::new();
    let mut every_starts = Vec::new();
    let mut diagnostics = Vec::new();

    let items: Vec<NodeId> = ast::children(tree, root).to_vec();
    for item in items {
        if tree.type_name(item) != decl::FUNC_DEF {
            leading_decls.push(Unparser::to_string(tree, interner, item));
            continue;
        }
        let children = ast::children(tree, item).to_vec();
        let specifiers = children[0];
        let declarator = children[1];
        let body_stmts = children[2..].to_vec();
        let is_task = pass1::task_storage_class(tree, specifiers) == Some(StorageClass::Task);

        if !is_task {
            leading_decls.push(render_plain_function(
                tree,
                interner,
                specifiers,
                declarator,
                &body_stmts,
                &mut every_starts,
                &mut diagnostics,
            ));
            continue;
        }

        let task_text = pass1::declarator_name(tree, interner, declarator)
            .expect("a task's declarator always resolves to a name")
            .to_owned();
        let result_type = task_result_type(tree, interner, specifiers);

        let promotion = pass1::promote_locals(
            tree,
            interner,
            &task_names,
            &task_text,
            &body_stmts,
            &mut diagnostics,
        );
        for global in promotion.globals {
            promoted.insert(global.name.clone(), global);
        }

        let steps = pass2::lower_task(
            tree,
            interner,
            &task_names,
            &promotion.decl_rewrites,
            &task_text,
            &body_stmts,
            &mut diagnostics,
        );
        tasks.insert(task_text.clone(), TaskPlan { name: task_text, result_type, steps });
    }

    TransformOutput { leading_decls, tasks, promoted, every_starts, diagnostics }
}

fn task_result_type(tree: &Tree, interner: &Interner, specifiers: NodeId) -> Option<String> {
    let children = ast::children(tree, specifiers);
    let type_spec = *children.last().expect("decl_specifiers always has a type specifier");
    if tree.type_name(type_spec) == decl::TYPE_SPECIFIER && ast::keyword_text(tree, type_spec) == "void" {
        None
    } else {
        Some(Unparser::to_string(tree, interner, type_spec))
    }
}

/// Render a non-task function close to verbatim, except that its
/// top-level `every (...) start <task>;` statements (rule e) are pulled
/// out into `every_starts` instead of being printed in place.
fn render_plain_function(
    tree: &Tree,
    interner: &Interner,
    specifiers: NodeId,
    declarator: NodeId,
    body_stmts: &[NodeId],
    every_starts: &mut Vec<EveryStart>,
    diagnostics: &mut Vec<TransformDiagnostic>,
) -> String {
    let signature = format!(
        "{} {}",
        Unparser::to_string(tree, interner, specifiers),
        Unparser::to_string(tree, interner, declarator),
    );
    let mut body = String::new();
    for &s in body_stmts {
        if tree.type_name(s) == stmt::EVERY_START {
            let children = ast::children(tree, s);
            let period = children[0];
            let task_ident = children[1];
            let (sym, _) = tree.expect_ident(task_ident);
            every_starts.push(EveryStart { period, task: interner.resolve(sym).to_owned() });
            continue;
        }
        if tree.type_name(s) == stmt::QUEUE_FOR || tree.type_name(s) == stmt::POLL || tree.type_name(s) == stmt::POLL_AT_MOST {
            diagnostics.push(TransformDiagnostic::skipped(
                "tinycopoos_statement_outside_task",
                tree.position(s),
            ));
        }
        body.push_str(&Unparser::to_string(tree, interner, s));
        body.push('\n');
    }
    format!("{signature} {{\n{body}}}\n")
}

/// Render one lowered step to C source text, recursing through nested
/// `if` splits.
pub fn render_step_body(tree: &Tree, interner: &Interner, items: &[StmtItem]) -> String {
    let mut out = String::new();
    render_items(tree, interner, items, &mut out);
    out
}

fn render_items(tree: &Tree, interner: &Interner, items: &[StmtItem], out: &mut String) {
    for item in items {
        match item {
            StmtItem::Verbatim(id) => {
                out.push_str(&Unparser::to_string(tree, interner, *id));
                out.push('\n');
            }
            StmtItem::Assign { name, init } => {
                out.push_str(&format!("{name} = {};\n", Unparser::to_string(tree, interner, *init)));
            }
            StmtItem::CallTask { callee, caller, next_step } => {
                out.push_str(&format!("os_call_task({callee}, {caller}, {next_step});\n"));
            }
            StmtItem::QueueFor { queue, caller, next_step } => {
                let queue_text = Unparser::to_string(tree, interner, *queue);
                out.push_str(&format!("os_queue_for({queue_text}, {caller}, {next_step});\n"));
            }
            StmtItem::Poll { caller, next_step } => {
                out.push_str(&format!("os_poll({caller}, {next_step});\n"));
            }
            StmtItem::PollAtMost { caller, timeout, timeout_step } => {
                let timeout_text = Unparser::to_string(tree, interner, *timeout);
                out.push_str(&format!("os_poll_at_most({caller}, {timeout_text}, {timeout_step});\n"));
            }
            StmtItem::Return => out.push_str("return;\n"),
            StmtItem::If { cond, then_branch, else_branch } => {
                let cond_text = Unparser::to_string(tree, interner, *cond);
                out.push_str(&format!("if ({cond_text}) {{\n"));
                render_items(tree, interner, then_branch, out);
                out.push_str("}\n");
                if let Some(else_branch) = else_branch {
                    out.push_str("else {\n");
                    render_items(tree, interner, else_branch, out);
                    out.push_str("}\n");
                }
            }
        }
    }
}

/// Render a task's promoted globals, step prototypes, and step bodies.
pub fn render_task(tree: &Tree, interner: &Interner, task: &TaskPlan) -> String {
    let mut out = String::new();
    for step in &task.steps {
        out.push_str(&format!("void {}(void);\n", step.name));
    }
    if let Some(result_type) = &task.result_type {
        out.push_str(&format!("{result_type} {}_result;\n", task.name));
    }
    for step in &task.steps {
        out.push_str(&format!("void {}(void) {{\n", step.name));
        out.push_str(&render_step_body(tree, interner, &step.body));
        out.push_str("}\n");
    }
    out
}

/// Render the generated `os_init`, collecting every relocated `every`
/// statement (rule e).
pub fn render_os_init(tree: &Tree, interner: &Interner, every_starts: &[EveryStart]) -> String {
    let mut body = String::new();
    for e in every_starts {
        let period_text = Unparser::to_string(tree, interner, e.period);
        body.push_str(&format!("os_every({period_text}, {});\n", e.task));
    }
    format!("void os_init(void) {{\n{body}}}\n")
}

/// Assemble the whole transformed program: ordinary top-level
/// declarations first (in source order), then every task's promoted
/// globals and step functions, then the generated `os_init`.
pub fn render_program(tree: &Tree, interner: &Interner, out: &TransformOutput) -> String {
    let mut text = String::new();
    for decl in &out.leading_decls {
        text.push_str(decl);
        text.push('\n');
    }
    for global in out.promoted.values() {
        text.push_str(&format!("{} {};\n", global.type_text, global.name));
    }
    for task in out.tasks.values() {
        text.push_str(&render_task(tree, interner, task));
    }
    text.push_str(&render_os_init(tree, interner, &out.every_starts));
    text
}
