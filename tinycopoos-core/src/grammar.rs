//! The grammar model (spec.md §3/§4.D): non-terminals, rules, elements and
//! their modifiers and hook callbacks, built once at process start and
//! walked (never mutated) by the parser engine for the rest of the compile.
//!
//! Grammars are data. `compiler::grammar_c` builds the concrete C +
//! TinyCoPoOS grammar out of these types; `compiler::engine` is the only
//! thing that interprets them.

use crate::chars::{CharClass, Cursor};
use crate::interner::Interner;
use crate::tree::{ChildListArena, ChildListId, NodeId, Tree};

/// Index of a non-terminal within a [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonTerminalId(pub u32);

/// Index of a rule within a [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub u32);

/// A non-terminal's two rule lists (spec.md §3: "optional normal and
/// left-recursive rule lists. Indirect left recursion is not supported").
pub struct NonTerminal {
    pub name: &'static str,
    pub normal_rules: Vec<RuleId>,
    pub left_recursive_rules: Vec<RuleId>,
}

/// The accumulator threaded through a rule while it's being parsed — the
/// re-expression of spec.md's "prev-child list" as either a single carried
/// value or a (possibly empty) reversed cons-list of children.
#[derive(Debug, Clone, Copy)]
pub enum Seed {
    /// Nothing accumulated yet (a rule's starting seed).
    Empty,
    /// A single carried value, as produced by `take_child`.
    Single(NodeId),
    /// A prev-child list in progress, as produced by `add_child`.
    List(Option<ChildListId>),
}

impl Seed {
    pub fn list_tail(self) -> Option<ChildListId> {
        match self {
            Seed::List(tail) => tail,
            Seed::Empty => None,
            Seed::Single(_) => {
                panic!("internal invariant broken: mixed Single/List seed in one rule")
            }
        }
    }
}

pub type AddHook = Box<dyn Fn(Seed, NodeId, &mut Tree, &mut ChildListArena) -> Seed + Send + Sync>;
pub type AddSkipHook = Box<dyn Fn(Seed, &mut Tree) -> Seed + Send + Sync>;
pub type BeginSeqHook = Box<dyn Fn() -> Seed + Send + Sync>;
pub type AddSeqHook =
    Box<dyn Fn(Seed, Vec<NodeId>, &mut Tree, &mut ChildListArena) -> Seed + Send + Sync>;
pub type ConditionHook = Box<dyn Fn(NodeId, &Tree, &mut Interner) -> bool + Send + Sync>;
pub type EndHook = Box<dyn Fn(Seed, Cursor, &mut Tree, &mut ChildListArena) -> NodeId + Send + Sync>;
/// Folds the previous rule's winning result into the seed a left-recursive
/// rule continues from (spec.md §4.E step 4: "using the previous winning
/// result as the recursive seed transformed by that rule's start-callback,
/// which may discard or wrap it").
pub type StartHook = Box<dyn Fn(NodeId, &mut Tree, &mut ChildListArena) -> Seed + Send + Sync>;

/// User scanner for a terminal-function element (spec.md §4.D): given the
/// source bytes and the current cursor, either advance the cursor and
/// produce a node, or fail (returning `None`) without consuming input —
/// used for the token grammars of §4.H (`ident`, `int`, `char`, `string`),
/// which scan several bytes at once rather than going through per-character
/// grammar elements.
pub type TerminalFn = fn(&[u8], Cursor, &mut Tree, &mut Interner) -> Option<(Cursor, NodeId)>;

/// What an [`Element`] matches.
pub enum ElementKind {
    NonTerminal(NonTerminalId),
    Char(u8),
    CharSet(CharClass),
    End,
    /// Inline anonymous rules, tried in order; the first match wins.
    Group(Vec<Rule>),
    Terminal(TerminalFn),
}

/// Per-element modifiers (spec.md §4.D).
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub optional: bool,
    pub sequence: bool,
    /// Only meaningful when `sequence` is set: back-track through each item
    /// one at a time, rather than using the inlined committing-loop variant.
    pub back_tracking: bool,
    /// Prefer the shorter/absent form first (end-of-sequence-now, or
    /// skip-this-optional-element, before trying to consume more).
    pub avoid: bool,
}

/// One grammar element plus its modifiers and hooks.
pub struct Element {
    pub kind: ElementKind,
    pub modifiers: Modifiers,
    /// Separator element parsed between sequence items, discarded.
    pub chain_rule: Option<Box<Element>>,
    pub add: Option<AddHook>,
    pub add_skip: Option<AddSkipHook>,
    pub begin_seq: Option<BeginSeqHook>,
    pub add_seq: Option<AddSeqHook>,
    pub condition: Option<ConditionHook>,
    pub set_pos: bool,
    pub expect_msg: Option<&'static str>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            modifiers: Modifiers::default(),
            chain_rule: None,
            add: None,
            add_skip: None,
            begin_seq: None,
            add_seq: None,
            condition: None,
            set_pos: false,
            expect_msg: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.modifiers.optional = true;
        self
    }

    pub fn sequence(mut self) -> Self {
        self.modifiers.sequence = true;
        self
    }

    pub fn back_tracking(mut self) -> Self {
        self.modifiers.sequence = true;
        self.modifiers.back_tracking = true;
        self
    }

    pub fn avoid(mut self) -> Self {
        self.modifiers.avoid = true;
        self
    }

    pub fn chained_by(mut self, sep: Element) -> Self {
        self.chain_rule = Some(Box::new(sep));
        self
    }

    pub fn add(mut self, hook: AddHook) -> Self {
        self.add = Some(hook);
        self
    }

    pub fn add_skip(mut self, hook: AddSkipHook) -> Self {
        self.add_skip = Some(hook);
        self
    }

    pub fn begin_seq(mut self, hook: BeginSeqHook) -> Self {
        self.begin_seq = Some(hook);
        self
    }

    pub fn add_seq(mut self, hook: AddSeqHook) -> Self {
        self.add_seq = Some(hook);
        self
    }

    pub fn condition(mut self, hook: ConditionHook) -> Self {
        self.condition = Some(hook);
        self
    }

    pub fn set_pos(mut self) -> Self {
        self.set_pos = true;
        self
    }

    pub fn expect(mut self, msg: &'static str) -> Self {
        self.expect_msg = Some(msg);
        self
    }
}

/// An ordered list of elements plus the rule-level hooks.
pub struct Rule {
    pub elements: Vec<Element>,
    pub end_hook: Option<EndHook>,
    /// Present only on left-recursive rules.
    pub start_hook: Option<StartHook>,
}

impl Rule {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            end_hook: None,
            start_hook: None,
        }
    }

    pub fn ending(mut self, hook: EndHook) -> Self {
        self.end_hook = Some(hook);
        self
    }

    pub fn starting(mut self, hook: StartHook) -> Self {
        self.start_hook = Some(hook);
        self
    }
}

/// The grammar: a flat table of non-terminals, each owning its rules.
/// Built once via [`GrammarBuilder`] and never mutated afterward.
pub struct Grammar {
    non_terminals: Vec<NonTerminal>,
    rules: Vec<Rule>,
}

impl Grammar {
    pub fn non_terminal(&self, id: NonTerminalId) -> &NonTerminal {
        &self.non_terminals[id.0 as usize]
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0 as usize]
    }

    pub fn non_terminal_count(&self) -> usize {
        self.non_terminals.len()
    }

    pub fn find(&self, name: &str) -> Option<NonTerminalId> {
        self.non_terminals
            .iter()
            .position(|nt| nt.name == name)
            .map(|i| NonTerminalId(i as u32))
    }
}

/// Incrementally builds a [`Grammar`]. Non-terminals are declared up front
/// (so forward references via [`GrammarBuilder::id_of`] work), then rules
/// are attached to them.
#[derive(Default)]
pub struct GrammarBuilder {
    non_terminals: Vec<NonTerminal>,
    rules: Vec<Rule>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a non-terminal by name, returning its id. Declaring the same
    /// name twice returns the existing id (lets grammar-construction code
    /// reference a non-terminal before its rules are attached, which is
    /// required for direct left recursion and for mutually-referencing
    /// productions like the C expression hierarchy).
    pub fn declare(&mut self, name: &'static str) -> NonTerminalId {
        if let Some(i) = self.non_terminals.iter().position(|nt| nt.name == name) {
            return NonTerminalId(i as u32);
        }
        let id = NonTerminalId(self.non_terminals.len() as u32);
        self.non_terminals.push(NonTerminal {
            name,
            normal_rules: Vec::new(),
            left_recursive_rules: Vec::new(),
        });
        id
    }

    fn push_rule(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(rule);
        id
    }

    /// Attach a normal (non-left-recursive) rule to `nt`, in declaration
    /// order (spec.md §4.E: "Try each normal rule in declared order").
    pub fn rule(&mut self, nt: NonTerminalId, rule: Rule) -> &mut Self {
        let id = self.push_rule(rule);
        self.non_terminals[nt.0 as usize].normal_rules.push(id);
        self
    }

    /// Attach a left-recursive rule (its first logical element is `nt`
    /// itself, folded through `rule.start_hook`).
    pub fn left_recursive_rule(&mut self, nt: NonTerminalId, rule: Rule) -> &mut Self {
        let id = self.push_rule(rule);
        self.non_terminals[nt.0 as usize]
            .left_recursive_rules
            .push(id);
        self
    }

    pub fn build(self) -> Grammar {
        Grammar {
            non_terminals: self.non_terminals,
            rules: self.rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_is_idempotent() {
        let mut b = GrammarBuilder::new();
        let a = b.declare("expr");
        let a2 = b.declare("expr");
        assert_eq!(a, a2);
        let g = b.build();
        assert_eq!(g.non_terminal_count(), 1);
    }

    #[test]
    fn rules_attach_in_declared_order() {
        let mut b = GrammarBuilder::new();
        let nt = b.declare("digit");
        b.rule(nt, Rule::new(vec![Element::new(ElementKind::Char(b'0'))]));
        b.rule(nt, Rule::new(vec![Element::new(ElementKind::Char(b'1'))]));
        let g = b.build();
        let nt = g.find("digit").unwrap();
        assert_eq!(g.non_terminal(nt).normal_rules.len(), 2);
    }
}
