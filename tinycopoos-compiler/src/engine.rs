//! The parser engine (spec.md §4.E): a back-tracking recursive-descent
//! interpreter over a [`Grammar`], built around three mutually recursive
//! procedures (`parse_non_terminal`, `parse_rule`, `parse_sequence`) plus
//! `parse_element`'s dispatch on element kind.
//!
//! Grounded on the teacher's `Parser` struct idiom (small methods, an
//! explicit cursor, checkpoint/restore around speculative attempts) with the
//! grammar itself re-expressed as an interpreted data structure rather than
//! hand-written per-production methods.

use std::collections::HashMap;

use tinycopoos_core::chars::Cursor;
use tinycopoos_core::grammar::{Element, ElementKind, Grammar, NonTerminalId, Rule, Seed};
use tinycopoos_core::interner::Interner;
use tinycopoos_core::tree::{ChildListArena, NodeId, Position, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Fail,
    Success,
}

struct MemoEntry {
    status: Status,
    result: Option<NodeId>,
    cursor: Cursor,
}

/// One recorded failed expectation: the non-terminal call stack active when
/// it was recorded, plus the element's diagnostic message.
#[derive(Debug, Clone)]
pub struct ExpectationRecord {
    pub stack: Vec<(&'static str, Cursor)>,
    pub msg: &'static str,
}

/// The furthest point reached during a parse attempt and what was expected
/// there (spec.md §4.E "Expectation tracking"), capped at 200 entries.
#[derive(Debug, Default)]
pub struct ExpectationReport {
    pub highest_offset: u32,
    pub entries: Vec<ExpectationRecord>,
}

const MAX_EXPECTATIONS: usize = 200;

/// Everything a parse produces: the AST arena, its auxiliary arenas, and the
/// furthest-reached failure diagnostics.
pub struct ParseOutcome {
    pub tree: Tree,
    pub lists: ChildListArena,
    pub interner: Interner,
    pub root: Option<NodeId>,
    pub expectations: ExpectationReport,
}

/// Parse `source` as `root_nt` under `grammar`.
pub fn parse(source: &[u8], grammar: &Grammar, root_nt: NonTerminalId) -> ParseOutcome {
    let mut p = Parser {
        source,
        tree: Tree::new(),
        lists: ChildListArena::new(),
        interner: Interner::new(),
        memo: HashMap::new(),
        highest_offset: 0,
        expectations: Vec::new(),
        nt_stack: Vec::new(),
    };
    let root = p
        .parse_non_terminal(grammar, root_nt, Cursor::start())
        .map(|(id, _)| id);
    ParseOutcome {
        tree: p.tree,
        lists: p.lists,
        interner: p.interner,
        root,
        expectations: ExpectationReport {
            highest_offset: p.highest_offset,
            entries: p.expectations,
        },
    }
}

struct Parser<'s> {
    source: &'s [u8],
    tree: Tree,
    lists: ChildListArena,
    interner: Interner,
    memo: HashMap<(u32, NonTerminalId), MemoEntry>,
    highest_offset: u32,
    expectations: Vec<ExpectationRecord>,
    nt_stack: Vec<(&'static str, Cursor)>,
}

impl<'s> Parser<'s> {
    fn peek(&self, cursor: Cursor) -> Option<u8> {
        self.source.get(cursor.offset as usize).copied()
    }

    fn step(&self, cursor: Cursor, byte: u8) -> Cursor {
        let mut c = cursor;
        c.advance(byte);
        c
    }

    fn record_expectation(&mut self, cursor: Cursor, elem: &Element) {
        let Some(msg) = elem.expect_msg else {
            return;
        };
        if cursor.offset > self.highest_offset {
            self.highest_offset = cursor.offset;
            self.expectations.clear();
        }
        if cursor.offset == self.highest_offset && self.expectations.len() < MAX_EXPECTATIONS {
            self.expectations.push(ExpectationRecord {
                stack: self.nt_stack.clone(),
                msg,
            });
        }
    }

    /// spec.md §4.E step 1: memoized by (offset, non-terminal); unknown
    /// entries are pre-marked `fail` before recursing so that indirect left
    /// recursion (unsupported) short-circuits instead of overflowing the
    /// stack, at the documented cost of sometimes preferring a shorter parse
    /// (see DESIGN.md).
    fn parse_non_terminal(
        &mut self,
        grammar: &Grammar,
        id: NonTerminalId,
        cursor: Cursor,
    ) -> Option<(NodeId, Cursor)> {
        let key = (cursor.offset, id);
        if let Some(entry) = self.memo.get(&key) {
            return match entry.status {
                Status::Success => Some((entry.result.unwrap(), entry.cursor)),
                Status::Fail => None,
            };
        }
        self.memo.insert(
            key,
            MemoEntry {
                status: Status::Fail,
                result: None,
                cursor,
            },
        );

        let nt = grammar.non_terminal(id);
        self.nt_stack.push((nt.name, cursor));

        let mut best = None;
        for &rule_id in &nt.normal_rules {
            let rule = grammar.rule(rule_id);
            if let Some(hit) = self.parse_rule(grammar, rule, 0, Seed::Empty, cursor, cursor) {
                best = Some(hit);
                break;
            }
        }

        if let Some((mut result, mut cur)) = best {
            loop {
                let mut grew = false;
                for &rule_id in &nt.left_recursive_rules {
                    let rule = grammar.rule(rule_id);
                    let seed = match &rule.start_hook {
                        Some(hook) => hook(result, &mut self.tree, &mut self.lists),
                        None => Seed::Single(result),
                    };
                    if let Some((new_result, new_cur)) = self.parse_rule(grammar, rule, 0, seed, cur, cur) {
                        debug_assert!(
                            new_cur.offset >= cur.offset,
                            "left-recursive growth must not move the cursor backwards"
                        );
                        result = new_result;
                        cur = new_cur;
                        grew = true;
                        break;
                    }
                }
                if !grew {
                    break;
                }
            }
            self.nt_stack.pop();
            self.memo.insert(
                key,
                MemoEntry {
                    status: Status::Success,
                    result: Some(result),
                    cursor: cur,
                },
            );
            return Some((result, cur));
        }

        self.nt_stack.pop();
        None
    }

    /// spec.md §4.E step 2. `start` is the rule's entry cursor, threaded
    /// through unchanged so the end-callback can stamp a synthesized tree
    /// node with where the rule began rather than where it finished.
    fn parse_rule(
        &mut self,
        grammar: &Grammar,
        rule: &Rule,
        idx: usize,
        seed: Seed,
        start: Cursor,
        cursor: Cursor,
    ) -> Option<(NodeId, Cursor)> {
        if idx >= rule.elements.len() {
            let result = match &rule.end_hook {
                Some(hook) => hook(seed, start, &mut self.tree, &mut self.lists),
                None => match seed {
                    Seed::Single(id) => id,
                    _ => panic!(
                        "internal invariant broken: rule with no end_hook did not settle on a single result"
                    ),
                },
            };
            return Some((result, cursor));
        }

        let elem = &rule.elements[idx];

        if elem.modifiers.optional && elem.modifiers.avoid {
            let skip_seed = self.apply_skip(elem, seed);
            if let Some(hit) = self.parse_rule(grammar, rule, idx + 1, skip_seed, start, cursor) {
                return Some(hit);
            }
        }

        let saved = cursor;
        let consumed = if elem.modifiers.sequence {
            self.parse_sequence(grammar, elem, rule, idx + 1, Vec::new(), seed, start, cursor)
        } else {
            self.parse_element(grammar, elem, cursor).and_then(|(result, next_cur)| {
                let new_seed = self.combine_add(elem, seed, result);
                self.parse_rule(grammar, rule, idx + 1, new_seed, start, next_cur)
            })
        };
        if consumed.is_some() {
            return consumed;
        }

        if elem.modifiers.optional && !elem.modifiers.avoid {
            let skip_seed = self.apply_skip(elem, seed);
            return self.parse_rule(grammar, rule, idx + 1, skip_seed, start, saved);
        }
        None
    }

    fn combine_add(&mut self, elem: &Element, seed: Seed, result: NodeId) -> Seed {
        match &elem.add {
            Some(hook) => hook(seed, result, &mut self.tree, &mut self.lists),
            None => seed,
        }
    }

    fn apply_skip(&mut self, elem: &Element, seed: Seed) -> Seed {
        match &elem.add_skip {
            Some(hook) => hook(seed, &mut self.tree),
            None => seed,
        }
    }

    fn combine_add_seq(&mut self, elem: &Element, prev_seed: Seed, items: Vec<NodeId>) -> Seed {
        match &elem.add_seq {
            Some(hook) => hook(prev_seed, items, &mut self.tree, &mut self.lists),
            None => prev_seed,
        }
    }

    /// spec.md §4.E step 3. `back_tracking` sequences retry shorter matches
    /// on downstream failure; the default (committing) variant accepts the
    /// first successful extension and never revisits it.
    fn parse_sequence(
        &mut self,
        grammar: &Grammar,
        elem: &Element,
        rule: &Rule,
        rest_idx: usize,
        mut items: Vec<NodeId>,
        prev_seed: Seed,
        start: Cursor,
        cursor: Cursor,
    ) -> Option<(NodeId, Cursor)> {
        if elem.modifiers.avoid {
            if let Some(hit) = self.try_end_sequence(grammar, elem, rule, rest_idx, &items, prev_seed, start, cursor) {
                return Some(hit);
            }
        }

        let saved = cursor;
        if let Some(next_cur) = self.try_one_more_item(grammar, elem, &mut items, cursor) {
            if elem.modifiers.back_tracking {
                if let Some(hit) = self.parse_sequence(
                    grammar,
                    elem,
                    rule,
                    rest_idx,
                    items.clone(),
                    prev_seed,
                    start,
                    next_cur,
                ) {
                    return Some(hit);
                }
                items.pop();
                return self.try_end_sequence(grammar, elem, rule, rest_idx, &items, prev_seed, start, saved);
            }
            if let Some(hit) =
                self.parse_sequence(grammar, elem, rule, rest_idx, items, prev_seed, start, next_cur)
            {
                return Some(hit);
            }
            return None;
        }

        if !elem.modifiers.avoid {
            return self.try_end_sequence(grammar, elem, rule, rest_idx, &items, prev_seed, start, cursor);
        }
        None
    }

    fn try_one_more_item(
        &mut self,
        grammar: &Grammar,
        elem: &Element,
        items: &mut Vec<NodeId>,
        cursor: Cursor,
    ) -> Option<Cursor> {
        let mut cur = cursor;
        if !items.is_empty() {
            if let Some(sep) = &elem.chain_rule {
                match self.parse_element(grammar, sep, cur) {
                    Some((_, next)) => cur = next,
                    None => return None,
                }
            }
        }
        match self.parse_element(grammar, elem, cur) {
            Some((result, next_cur)) => {
                items.push(result);
                Some(next_cur)
            }
            None => None,
        }
    }

    fn try_end_sequence(
        &mut self,
        grammar: &Grammar,
        elem: &Element,
        rule: &Rule,
        rest_idx: usize,
        items: &[NodeId],
        prev_seed: Seed,
        start: Cursor,
        cursor: Cursor,
    ) -> Option<(NodeId, Cursor)> {
        let combined = self.combine_add_seq(elem, prev_seed, items.to_vec());
        self.parse_rule(grammar, rule, rest_idx, combined, start, cursor)
    }

    /// spec.md §4.E "parse_element dispatches on element kind".
    fn parse_element(&mut self, grammar: &Grammar, elem: &Element, cursor: Cursor) -> Option<(NodeId, Cursor)> {
        let (result, next) = match &elem.kind {
            ElementKind::NonTerminal(id) => {
                let (node, next) = self.parse_non_terminal(grammar, *id, cursor)?;
                if let Some(cond) = &elem.condition {
                    if !cond(node, &self.tree, &mut self.interner) {
                        self.record_expectation(cursor, elem);
                        return None;
                    }
                }
                (node, next)
            }
            ElementKind::Char(byte) => match self.peek(cursor) {
                Some(b) if b == *byte => {
                    let node = self.tree.char(Position::from(cursor), b);
                    (node, self.step(cursor, b))
                }
                _ => {
                    self.record_expectation(cursor, elem);
                    return None;
                }
            },
            ElementKind::CharSet(set) => match self.peek(cursor) {
                Some(b) if set.contains(b) => {
                    let node = self.tree.char(Position::from(cursor), b);
                    (node, self.step(cursor, b))
                }
                _ => {
                    self.record_expectation(cursor, elem);
                    return None;
                }
            },
            ElementKind::End => {
                if cursor.offset as usize >= self.source.len() {
                    (self.tree.int(Position::from(cursor), 0), cursor)
                } else {
                    self.record_expectation(cursor, elem);
                    return None;
                }
            }
            ElementKind::Group(rules) => {
                let mut hit = None;
                for r in rules {
                    if let Some(result) = self.parse_rule(grammar, r, 0, Seed::Empty, cursor, cursor) {
                        hit = Some(result);
                        break;
                    }
                }
                match hit {
                    Some(result) => result,
                    None => {
                        self.record_expectation(cursor, elem);
                        return None;
                    }
                }
            }
            ElementKind::Terminal(scan) => match scan(self.source, cursor, &mut self.tree, &mut self.interner) {
                Some((next, node)) if next.offset > cursor.offset => (node, next),
                _ => {
                    self.record_expectation(cursor, elem);
                    return None;
                }
            },
        };

        if elem.set_pos {
            self.tree.set_position(result, Position::from(cursor));
        }
        Some((result, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinycopoos_core::chars::CharClass;
    use tinycopoos_core::grammar::GrammarBuilder;

    /// A minimal grammar for one non-terminal matching one or more digits,
    /// built with the `add_child`/`make_tree`-style hooks used throughout
    /// `grammar_c`, exercised here in isolation from the full C grammar.
    fn digits_grammar() -> (Grammar, NonTerminalId) {
        let mut b = GrammarBuilder::new();
        let digits = b.declare("digits");
        let mut digit_set = CharClass::new();
        digit_set.add_range(b'0', b'9');

        let digit_elem = Element::new(ElementKind::CharSet(digit_set))
            .sequence()
            .expect("expected a digit")
            .add_seq(Box::new(|_seed, items, _tree, lists| {
                let mut tail = None;
                for item in items {
                    tail = Some(lists.push(tail, item));
                }
                Seed::List(tail)
            }));

        b.rule(
            digits,
            Rule::new(vec![digit_elem]).ending(Box::new(|seed, cursor, tree, lists| {
                let children = lists.reverse_to_vec(seed.list_tail());
                tree.tree(Position::from(cursor), "digits", "%*", children)
            })),
        );
        let grammar = b.build();
        (grammar, digits)
    }

    #[test]
    fn parses_simple_sequence() {
        let (grammar, digits) = digits_grammar();
        let outcome = parse(b"123", &grammar, digits);
        let root = outcome.root.expect("parse should succeed");
        let (name, _, children) = outcome.tree.expect_tree(root, "test");
        assert_eq!(name, "digits");
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn reports_furthest_failure_position() {
        let (grammar, digits) = digits_grammar();
        let outcome = parse(b"", &grammar, digits);
        assert!(outcome.root.is_none());
        assert_eq!(outcome.expectations.highest_offset, 0);
        assert!(!outcome.expectations.entries.is_empty());
    }
}
