//! Pass 2 (spec.md §4.J): walk a task's (already-promoted) body once more,
//! splitting it at every suspension point into `<task>_step<k>` functions.
//!
//! Rather than literally splicing the arena's tree nodes — which would
//! mean giving `Tree` a way to mutate a node's child list in place, purely
//! for this one pass — a lowered step's body is built up as a small
//! `StmtItem` tree that interleaves untouched subtrees (rendered later by
//! [`crate::unparse`]) with the synthesized calls and control-flow
//! reconstruction the splitting requires. This is the free-function
//! "statement-trace" idea re-expressed as an owned, directly-renderable
//! value instead of a cons-list walked a second time.

use std::collections::HashMap;

use tinycopoos_core::interner::Interner;
use tinycopoos_core::tree::{NodeId, Tree};

use crate::ast::{self, stmt};

use super::pass1::{for_each_child, DeclRewrite};
use super::{Step, TransformDiagnostic};

/// One lowered statement (or fragment of one) inside a step's body.
pub enum StmtItem {
    /// An original statement untouched by the transform, rendered as-is.
    Verbatim(NodeId),
    /// A promoted local's non-suspending initializer, now a plain
    /// assignment to the global.
    Assign { name: String, init: NodeId },
    /// The call-another-task suspension point (spec.md §4.J rule a).
    CallTask { callee: String, caller: String, next_step: String },
    /// `queue for` (rule b).
    QueueFor { queue: NodeId, caller: String, next_step: String },
    /// `poll` (rule c).
    Poll { caller: String, next_step: String },
    /// The `at most` clause of a `poll`, registered as its own independent
    /// timeout step (rule c).
    PollAtMost { caller: String, timeout: NodeId, timeout_step: String },
    Return,
    /// An `if`/`if-else` whose boundary required splitting the enclosing
    /// step (rule d); branches are themselves lowered statement lists.
    If {
        cond: NodeId,
        then_branch: Vec<StmtItem>,
        else_branch: Option<Vec<StmtItem>>,
    },
}

struct Lowerer<'a> {
    tree: &'a Tree,
    interner: &'a Interner,
    task_names: &'a std::collections::HashSet<String>,
    decl_rewrites: &'a HashMap<NodeId, Vec<DeclRewrite>>,
    task_text: String,
    next_step: u32,
    steps: Vec<Step>,
    diagnostics: &'a mut Vec<TransformDiagnostic>,
}

impl<'a> Lowerer<'a> {
    fn new_step(&mut self, stmts: &[NodeId]) -> String {
        let name = format!("{}_step{}", self.task_text, self.next_step);
        self.next_step += 1;
        let body = self.lower_sequence(stmts);
        self.steps.push(Step { name: name.clone(), body });
        name
    }

    /// Lowers the declarators of one `decl` statement in order, splitting
    /// recursively at the first `CallBoundary` found — any declarators
    /// after it, plus `remainder` (the rest of the enclosing statement
    /// sequence), continue in a freshly registered step. A `decl` with no
    /// `CallBoundary` declarator falls through to lowering `remainder` in
    /// the current step, same as any other non-suspending statement.
    fn lower_declarators(&mut self, rewrites: &[DeclRewrite], remainder: &[NodeId]) -> Vec<StmtItem> {
        let mut out = Vec::new();
        for (idx, rewrite) in rewrites.iter().enumerate() {
            match rewrite {
                DeclRewrite::Removed => continue,
                DeclRewrite::Assign { name, init } => {
                    out.push(StmtItem::Assign { name: name.clone(), init: *init });
                }
                DeclRewrite::CallBoundary { callee } => {
                    let callee = callee.clone();
                    let rest = rewrites[idx + 1..].to_vec();
                    let next_step = self.new_step_from_declarators(rest, remainder.to_vec());
                    out.push(StmtItem::CallTask { callee, caller: self.task_text.clone(), next_step });
                    out.push(StmtItem::Return);
                    return out;
                }
            }
        }
        out.extend(self.lower_sequence(remainder));
        out
    }

    fn new_step_from_declarators(&mut self, rewrites: Vec<DeclRewrite>, remainder: Vec<NodeId>) -> String {
        let name = format!("{}_step{}", self.task_text, self.next_step);
        self.next_step += 1;
        let body = self.lower_declarators(&rewrites, &remainder);
        self.steps.push(Step { name: name.clone(), body });
        name
    }

    fn stmt_as_sequence(&self, s: NodeId) -> Vec<NodeId> {
        if self.tree.type_name(s) == stmt::BLOCK {
            ast::children(self.tree, s).to_vec()
        } else {
            vec![s]
        }
    }

    fn is_boundary_trigger(&self, id: NodeId) -> bool {
        match self.tree.type_name(id) {
            stmt::QUEUE_FOR | stmt::POLL | stmt::POLL_AT_MOST => true,
            crate::ast::decl::DECL => self
                .decl_rewrites
                .get(&id)
                .map(|rewrites| rewrites.iter().any(|r| matches!(r, DeclRewrite::CallBoundary { .. })))
                .unwrap_or(false),
            stmt::EXPR_STMT => {
                let call = ast::children(self.tree, id)[0];
                ast::call_target_name(self.tree, self.interner, call)
                    .map(|name| self.task_names.contains(name))
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    fn contains_boundary(&self, id: NodeId) -> bool {
        if self.is_boundary_trigger(id) {
            return true;
        }
        let mut found = false;
        for_each_child(self.tree, id, |c| found |= self.contains_boundary(c));
        found
    }

    fn lower_sequence(&mut self, stmts: &[NodeId]) -> Vec<StmtItem> {
        let mut out = Vec::new();
        for (i, &s) in stmts.iter().enumerate() {
            let tag = self.tree.type_name(s);

            if tag == crate::ast::decl::DECL {
                if let Some(rewrites) = self.decl_rewrites.get(&s) {
                    let rewrites = rewrites.clone();
                    out.extend(self.lower_declarators(&rewrites, &stmts[i + 1..]));
                    return out;
                }
            }

            if tag == stmt::EXPR_STMT {
                let call = ast::children(self.tree, s)[0];
                if let Some(callee) = ast::call_target_name(self.tree, self.interner, call) {
                    if self.task_names.contains(callee) {
                        let callee = callee.to_owned();
                        let next_step = self.new_step(&stmts[i + 1..]);
                        out.push(StmtItem::CallTask { callee, caller: self.task_text.clone(), next_step });
                        out.push(StmtItem::Return);
                        return out;
                    }
                }
            }

            if tag == stmt::QUEUE_FOR {
                let children = ast::children(self.tree, s);
                let queue = children[0];
                let body_stmt = children[1];
                let mut cont = vec![body_stmt];
                cont.extend_from_slice(&stmts[i + 1..]);
                let next_step = self.new_step(&cont);
                out.push(StmtItem::QueueFor { queue, caller: self.task_text.clone(), next_step });
                out.push(StmtItem::Return);
                return out;
            }

            if tag == stmt::POLL {
                let children = ast::children(self.tree, s);
                let body_stmt = children[0];
                let mut cont = vec![body_stmt];
                cont.extend_from_slice(&stmts[i + 1..]);
                let next_step = self.new_step(&cont);
                out.push(StmtItem::Poll { caller: self.task_text.clone(), next_step });
                out.push(StmtItem::Return);
                return out;
            }

            if tag == stmt::POLL_AT_MOST {
                let children = ast::children(self.tree, s);
                let body_stmt = children[0];
                let timeout_expr = children[1];
                let timeout_body = children[2];
                let mut cont = vec![body_stmt];
                cont.extend_from_slice(&stmts[i + 1..]);
                let next_step = self.new_step(&cont);
                let timeout_step = self.new_step(&[timeout_body]);
                out.push(StmtItem::Poll { caller: self.task_text.clone(), next_step });
                out.push(StmtItem::PollAtMost {
                    caller: self.task_text.clone(),
                    timeout: timeout_expr,
                    timeout_step,
                });
                out.push(StmtItem::Return);
                return out;
            }

            if tag == stmt::BLOCK && self.contains_boundary(s) {
                let mut combined = ast::children(self.tree, s).to_vec();
                combined.extend_from_slice(&stmts[i + 1..]);
                out.extend(self.lower_sequence(&combined));
                return out;
            }

            if (tag == stmt::IF || tag == stmt::IF_ELSE) && self.contains_boundary(s) {
                let children = ast::children(self.tree, s);
                let cond = children[0];
                let then_stmt = children[1];
                let else_stmt = if tag == stmt::IF_ELSE { Some(children[2]) } else { None };
                let remainder: Vec<NodeId> = stmts[i + 1..].to_vec();

                let mut then_seq = self.stmt_as_sequence(then_stmt);
                then_seq.extend(remainder.iter().copied());
                let then_branch = self.lower_sequence(&then_seq);

                let else_branch = else_stmt.map(|e| {
                    let mut else_seq = self.stmt_as_sequence(e);
                    else_seq.extend(remainder.iter().copied());
                    self.lower_sequence(&else_seq)
                });

                out.push(StmtItem::If { cond, then_branch, else_branch });
                if else_stmt.is_none() {
                    // The condition-false path never entered the branch
                    // that suspended, so it still needs to run `remainder`
                    // in this same step.
                    out.extend(self.lower_sequence(&remainder));
                }
                return out;
            }

            if self.contains_boundary(s) {
                self.diagnostics.push(TransformDiagnostic::skipped(tag, self.tree.position(s)));
            }
            out.push(StmtItem::Verbatim(s));
        }
        out
    }
}

pub fn lower_task(
    tree: &Tree,
    interner: &Interner,
    task_names: &std::collections::HashSet<String>,
    decl_rewrites: &HashMap<NodeId, Vec<DeclRewrite>>,
    task_text: &str,
    body_stmts: &[NodeId],
    diagnostics: &mut Vec<TransformDiagnostic>,
) -> Vec<Step> {
    let mut lowerer = Lowerer {
        tree,
        interner,
        task_names,
        decl_rewrites,
        task_text: task_text.to_owned(),
        next_step: 2,
        steps: Vec::new(),
        diagnostics,
    };
    let entry_body = lowerer.lower_sequence(body_stmts);
    let mut steps = vec![Step { name: format!("{task_text}_step1"), body: entry_body }];
    steps.append(&mut lowerer.steps);
    steps
}
