//! The concrete C + TinyCoPoOS grammar (spec.md §4.I): expression
//! hierarchy, a pragmatic subset of C89 declarations and statements, and
//! the TinyCoPoOS extensions (`task`, `queue for`, `poll`/`at most`,
//! `timer`, `every (..) start`).
//!
//! Scope trims (recorded in DESIGN.md): no bit-fields, no function-pointer
//! declarators, no explicit C-style casts (`cast_expr` is a pass-through to
//! `unary_expr` — `ast::expr::CAST` stays a reserved, unused tag), `sizeof`
//! only takes a parenthesized expression rather than a type name, and the C
//! logical/relational ladder is folded into 9 `l_exprN` levels instead of
//! C's 10 to match spec.md's naming. Struct/union/enum bodies and K&R
//! old-style function definitions are implemented (`record_spec_nt`,
//! `enum_spec_nt`, `func_def`'s second rule in `build_declarations`), not
//! trimmed.

use tinycopoos_core::grammar::{
    AddHook, AddSeqHook, ConditionHook, Element, ElementKind, EndHook, GrammarBuilder, NonTerminalId, Rule, Seed,
    StartHook,
};
use tinycopoos_core::tree::Position;

use crate::ast::{self, decl, expr, stmt};
use crate::tokens::{self, Lexicon};

/// Non-terminal ids a caller needs to re-enter the grammar at a
/// non-`root` start symbol (tests, the REPL-less CLI's error recovery).
#[derive(Debug, Clone, Copy)]
pub struct Lang {
    pub lex: Lexicon,
    pub root: NonTerminalId,
    pub expr: NonTerminalId,
    pub stmt: NonTerminalId,
    pub decl: NonTerminalId,
}

pub fn build() -> (tinycopoos_core::grammar::Grammar, Lang) {
    let mut b = GrammarBuilder::new();
    let lex = tokens::build(&mut b);

    let expr_nt = build_expressions(&mut b, &lex);

    let stmt_nt = b.declare("stmt");
    let stmt_list = b.declare("stmt_list");

    let d = build_declarations(&mut b, &lex, expr_nt, stmt_list);
    build_statements(&mut b, &lex, stmt_nt, stmt_list, expr_nt, d.decl);
    let root = build_translation_unit(&mut b, &lex, d.external_decl);

    let lang = Lang {
        lex,
        root,
        expr: expr_nt,
        stmt: stmt_nt,
        decl: d.decl,
    };
    (b.build(), lang)
}

// ---------------------------------------------------------------------
// Standardized tree-construction actions (spec.md §4.I).
// ---------------------------------------------------------------------

fn add_child() -> AddHook {
    Box::new(|seed, result, _tree, lists| Seed::List(Some(lists.push(seed.list_tail(), result))))
}

fn take_child() -> AddHook {
    Box::new(|_seed, result, _tree, _lists| Seed::Single(result))
}

fn rec_add_child() -> StartHook {
    Box::new(|prev, _tree, lists| Seed::List(Some(lists.push(None, prev))))
}

fn collect_add_seq() -> AddSeqHook {
    Box::new(|seed, items, _tree, lists| {
        let mut tail = seed.list_tail();
        for item in items {
            tail = Some(lists.push(tail, item));
        }
        Seed::List(tail)
    })
}

fn make_tree(name: &'static str, fmt: &'static str) -> EndHook {
    Box::new(move |seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        tree.tree(Position::from(start), name, fmt, children)
    })
}

/// A rule whose whole body is a single `take_child`-carried reference,
/// surfacing it unchanged as the rule's result.
fn pass_single() -> EndHook {
    Box::new(|seed, _start, _tree, _lists| match seed {
        Seed::Single(id) => id,
        _ => unreachable!("pass_single used on a rule that didn't settle on Seed::Single"),
    })
}

/// If the accumulated children are exactly one `list`-tagged node, splice
/// its contents in as this tree's children instead of nesting a
/// list-of-one-list — used for constructs whose entire body is an
/// optional nested list reference (`block`).
fn make_tree_from_list(name: &'static str, fmt: &'static str) -> EndHook {
    Box::new(move |seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        let children = if children.len() == 1 && tree.is_list(children[0]) {
            ast::list_children(tree, children[0]).to_vec()
        } else {
            children
        };
        tree.tree(Position::from(start), name, fmt, children)
    })
}

fn make_list(sep: &'static str) -> EndHook {
    Box::new(move |seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        tree.list(Position::from(start), sep, children)
    })
}

/// A fixed-keyword leaf: no children, the matched keyword's own text
/// stored as the node's format string (spec.md §4.I's storage-class and
/// type-specifier keywords carry no further structure).
fn fixed_leaf(name: &'static str, text: &'static str) -> EndHook {
    Box::new(move |_seed, start, tree, _lists| tree.tree(Position::from(start), name, text, vec![]))
}

/// `postfix_expr`'s call rule: its accumulated children are `[callee,
/// arg_list]`; splice the argument list's items in after the callee so
/// `ast::children` sees a flat `[callee, arg0, arg1, ...]`.
fn make_call() -> EndHook {
    Box::new(|seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        let args = ast::list_children(tree, children[1]).to_vec();
        let mut flat = vec![children[0]];
        flat.extend(args);
        tree.tree(Position::from(start), expr::CALL, "%*(%*)", flat)
    })
}

/// `func_def`'s accumulated children are `[decl_specifiers, declarator,
/// body_list]`; splice the body's statements in after the signature.
fn make_func_def() -> EndHook {
    Box::new(|seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        let body = ast::list_children(tree, children[2]).to_vec();
        let mut flat = vec![children[0], children[1]];
        flat.extend(body);
        tree.tree(Position::from(start), decl::FUNC_DEF, "%* %* { %* }", flat)
    })
}

/// A `struct`/`union` tagged-with-body rule's accumulated children are
/// `[tag, field_decl_list]`; splice the field list's items in after the tag
/// the same way [`make_func_def`] splices a body in after a declarator.
fn make_tagged_record(name: &'static str, fmt: &'static str) -> EndHook {
    Box::new(move |seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        let fields = ast::list_children(tree, children[1]).to_vec();
        let mut flat = vec![children[0]];
        flat.extend(fields);
        tree.tree(Position::from(start), name, fmt, flat)
    })
}

/// The K&R old-style `func_def`'s accumulated children are `[decl_specifiers,
/// name, param_names, param_decls, body_list]`; splice the body in after the
/// three fixed slots, same convention as [`make_func_def`]. Tagged
/// `decl::FUNC_DEF_KR`, not `decl::FUNC_DEF` — see that constant's doc
/// comment for why the two children layouts can't share a tag.
fn make_kr_func_def() -> EndHook {
    Box::new(|seed, start, tree, lists| {
        let children = lists.reverse_to_vec(seed.list_tail());
        let body = ast::list_children(tree, children[4]).to_vec();
        let mut flat = vec![children[0], children[1], children[2], children[3]];
        flat.extend(body);
        tree.tree(Position::from(start), decl::FUNC_DEF_KR, "%* %* ( %* ) %* { %* }", flat)
    })
}

fn keyword_condition(name: &'static str) -> ConditionHook {
    Box::new(move |node, tree, interner| {
        let (sym, _) = tree.expect_ident(node);
        if interner.resolve(sym) == name {
            interner.mark_keyword(sym);
            true
        } else {
            false
        }
    })
}

// ---------------------------------------------------------------------
// Lexical helpers: every grammar reference to a token is preceded by an
// explicit (discarded) whitespace/comment skip, since the engine itself
// never skips whitespace implicitly.
// ---------------------------------------------------------------------

fn ws(lex: &Lexicon) -> Element {
    Element::new(ElementKind::NonTerminal(lex.white_space))
}

/// A multi-byte literal (operator/punctuation), preceded by whitespace,
/// discarded (no `add` hook).
fn lit(lex: &Lexicon, bytes: &'static [u8], msg: &'static str) -> Vec<Element> {
    let mut v = vec![ws(lex)];
    for &byte in bytes {
        v.push(Element::new(ElementKind::Char(byte)).expect(msg));
    }
    v
}

/// A reserved word: matched as a plain identifier, then gated by a
/// condition that checks its resolved text and marks it a keyword
/// (spec.md §4.I: "sets the keyword flag the first time the name is
/// interned"). Discarded — callers that need the matched text back don't
/// use this helper.
fn keyword(lex: &Lexicon, name: &'static str) -> Vec<Element> {
    vec![
        ws(lex),
        Element::new(ElementKind::NonTerminal(lex.ident)).expect(name).condition(keyword_condition(name)),
    ]
}

/// A non-terminal reference, preceded by whitespace, carried through via
/// `take_child` — for rules whose entire body is this one reference.
fn take(lex: &Lexicon, nt: NonTerminalId, msg: &'static str) -> Vec<Element> {
    vec![ws(lex), Element::new(ElementKind::NonTerminal(nt)).expect(msg).add(take_child())]
}

fn take_ident(lex: &Lexicon, msg: &'static str) -> Vec<Element> {
    vec![ws(lex), Element::new(ElementKind::NonTerminal(lex.ident)).expect(msg).add(take_child())]
}

/// A non-terminal reference, preceded by whitespace, appended via
/// `add_child` — for rules that accumulate more than one child.
fn push(lex: &Lexicon, nt: NonTerminalId, msg: &'static str) -> Vec<Element> {
    vec![ws(lex), Element::new(ElementKind::NonTerminal(nt)).expect(msg).add(add_child())]
}

fn push_ident(lex: &Lexicon, msg: &'static str) -> Vec<Element> {
    vec![ws(lex), Element::new(ElementKind::NonTerminal(lex.ident)).expect(msg).add(add_child())]
}

/// Wraps `elements` (whose last element must already settle the Group's
/// inner rule on `Seed::Single`) as one `Group` element, for use as a
/// sequence item or separator, or as an optional sub-construct.
fn wrap(elements: Vec<Element>) -> Element {
    Element::new(ElementKind::Group(vec![Rule::new(elements)]))
}

/// A literal-punctuation separator for `sequence`/`chained_by`, wrapped so
/// it can carry its own `take_child` (the separator's value is always
/// discarded by the engine, but the inner rule still needs to settle on a
/// single result to satisfy `parse_rule`'s no-end-hook fallback).
fn sep_tok(lex: &Lexicon, bytes: &'static [u8], msg: &'static str) -> Element {
    let mut inner = vec![ws(lex)];
    for (i, &byte) in bytes.iter().enumerate() {
        let mut e = Element::new(ElementKind::Char(byte)).expect(msg);
        if i + 1 == bytes.len() {
            e = e.add(take_child());
        }
        inner.push(e);
    }
    wrap(inner)
}

/// A slot that's either an `expr` or, if none is written, an
/// `expr::EMPTY` placeholder — used for `for`'s three independently
/// optional clauses so the rule always appends exactly one child per
/// clause (fixed arity of 4 for `for`, matching its 4-slot `%*` template)
/// instead of using `.optional()`+`.add_skip()`, which would need the
/// list-arena access that hook doesn't receive. The real-expression
/// alternative is tried first; the empty alternative matches zero input
/// and never fails, so this Group always succeeds.
fn optional_expr_slot(lex: &Lexicon, expr_nt: NonTerminalId, msg: &'static str) -> Element {
    let real = Rule::new(take(lex, expr_nt, msg));
    let empty = Rule::new(vec![]).ending(fixed_leaf(expr::EMPTY, ""));
    Element::new(ElementKind::Group(vec![real, empty])).add(add_child())
}

/// `item (',' item)*`, collected into a `list` sentinel node (spec.md §3).
fn comma_list(b: &mut GrammarBuilder, lex: &Lexicon, name: &'static str, item_nt: NonTerminalId, item_msg: &'static str) -> NonTerminalId {
    let nt = b.declare(name);
    let item_elem = wrap(take(lex, item_nt, item_msg))
        .sequence()
        .chained_by(sep_tok(lex, b",", "','"))
        .add_seq(collect_add_seq());
    b.rule(nt, Rule::new(vec![item_elem]).ending(make_list(",")));
    nt
}

/// `item*`, collected into a `list` sentinel node with no separator — the
/// same shape `stmt_list`/`translation_unit` build inline, factored out here
/// so `field_decl_list` (each field already ends with its own `;`) can reuse
/// it instead of repeating the inline pattern a third time.
fn bare_list_nt(b: &mut GrammarBuilder, lex: &Lexicon, name: &'static str, item_nt: NonTerminalId, item_msg: &'static str) -> NonTerminalId {
    let nt = b.declare(name);
    let item_elem = wrap(take(lex, item_nt, item_msg)).sequence().add_seq(collect_add_seq());
    b.rule(nt, Rule::new(vec![item_elem]).ending(make_list("")));
    nt
}

// ---------------------------------------------------------------------
// Expressions: primary -> postfix -> unary -> cast -> l_expr1..9 ->
// conditional -> assignment -> expr.
// ---------------------------------------------------------------------

fn binary_level(
    b: &mut GrammarBuilder,
    lex: &Lexicon,
    name: &'static str,
    operand: NonTerminalId,
    ops: &[(&'static [u8], &'static str, &'static str, &'static str)],
) -> NonTerminalId {
    let nt = b.declare(name);
    b.rule(nt, Rule::new(take(lex, operand, "operand")).ending(pass_single()));
    for &(bytes, msg, tag, fmt) in ops {
        let mut elements = lit(lex, bytes, msg);
        elements.extend(push(lex, operand, "operand"));
        b.left_recursive_rule(nt, Rule::new(elements).starting(rec_add_child()).ending(make_tree(tag, fmt)));
    }
    nt
}

fn build_expressions(b: &mut GrammarBuilder, lex: &Lexicon) -> NonTerminalId {
    let primary = b.declare("primary_expr");
    let postfix = b.declare("postfix_expr");
    let unary = b.declare("unary_expr");
    let cast = b.declare("cast_expr");
    let expr_nt = b.declare("expr");

    // primary_expr: ident | int | char | string | '(' expr ')'
    b.rule(primary, Rule::new(take_ident(lex, "identifier")).ending(pass_single()));
    b.rule(primary, Rule::new(take(lex, lex.int, "number")).ending(pass_single()));
    b.rule(primary, Rule::new(take(lex, lex.char_lit, "char literal")).ending(pass_single()));
    b.rule(primary, Rule::new(take(lex, lex.string_lit, "string literal")).ending(pass_single()));
    {
        let mut elements = lit(lex, b"(", "'('");
        elements.extend(push(lex, expr_nt, "expression"));
        elements.extend(lit(lex, b")", "')'"));
        b.rule(primary, Rule::new(elements).ending(make_tree(expr::PAREN, "( %* )")));
    }

    // postfix_expr: primary_expr, then index/call/member/arrow/inc/dec
    // (all left-recursive, folding the previous result in via start_hook).
    b.rule(postfix, Rule::new(take(lex, primary, "operand")).ending(pass_single()));
    {
        let mut index = lit(lex, b"[", "'['");
        index.extend(push(lex, expr_nt, "index"));
        index.extend(lit(lex, b"]", "']'"));
        b.left_recursive_rule(postfix, Rule::new(index).starting(rec_add_child()).ending(make_tree(expr::INDEX, "%*[%*]")));
    }
    {
        let args = comma_list(b, lex, "arg_list", expr_nt, "argument");
        let mut call = lit(lex, b"(", "'('");
        call.extend(push(lex, args, "arguments"));
        call.extend(lit(lex, b")", "')'"));
        b.left_recursive_rule(postfix, Rule::new(call).starting(rec_add_child()).ending(make_call()));
    }
    {
        let mut member = lit(lex, b".", "'.'");
        member.extend(push_ident(lex, "member name"));
        b.left_recursive_rule(postfix, Rule::new(member).starting(rec_add_child()).ending(make_tree(expr::MEMBER, "%*.%*")));
    }
    {
        let mut arrow = lit(lex, b"->", "'->'");
        arrow.extend(push_ident(lex, "member name"));
        b.left_recursive_rule(postfix, Rule::new(arrow).starting(rec_add_child()).ending(make_tree(expr::ARROW, "%*->%*")));
    }
    for (bytes, msg, tag, fmt) in [(&b"++"[..], "'++'", expr::POSTINC, "%*++"), (&b"--"[..], "'--'", expr::POSTDEC, "%*--")] {
        let elements = lit(lex, bytes, msg);
        b.left_recursive_rule(postfix, Rule::new(elements).starting(rec_add_child()).ending(make_tree(tag, fmt)));
    }

    // unary_expr: postfix_expr | prefix-op cast_expr | sizeof '(' expr ')'
    b.rule(unary, Rule::new(take(lex, postfix, "operand")).ending(pass_single()));
    for (bytes, msg, tag, fmt) in [
        (&b"-"[..], "'-'", expr::NEG, "-%*"),
        (&b"!"[..], "'!'", expr::NOT, "!%*"),
        (&b"~"[..], "'~'", expr::BNOT, "~%*"),
        (&b"*"[..], "'*'", expr::DEREF, "*%*"),
        (&b"&"[..], "'&'", expr::ADDR, "&%*"),
        (&b"++"[..], "'++'", expr::PREINC, "++%*"),
        (&b"--"[..], "'--'", expr::PREDEC, "--%*"),
    ] {
        let mut elements = lit(lex, bytes, msg);
        elements.extend(push(lex, cast, "operand"));
        b.rule(unary, Rule::new(elements).ending(make_tree(tag, fmt)));
    }
    {
        let mut elements = keyword(lex, "sizeof");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "expression"));
        elements.extend(lit(lex, b")", "')'"));
        b.rule(unary, Rule::new(elements).ending(make_tree(expr::SIZEOF, "sizeof ( %* )")));
    }

    // cast_expr: unary_expr (explicit casts are a documented scope trim).
    b.rule(cast, Rule::new(take(lex, unary, "operand")).ending(pass_single()));

    let l1 = binary_level(
        b,
        lex,
        "l_expr1",
        cast,
        &[(b"*", "'*'", expr::MUL, "%* * %*"), (b"/", "'/'", expr::DIV, "%* / %*"), (b"%", "'%'", expr::MOD, "%* % %*")],
    );
    let l2 = binary_level(b, lex, "l_expr2", l1, &[(b"+", "'+'", expr::ADD, "%* + %*"), (b"-", "'-'", expr::SUB, "%* - %*")]);
    let l3 = binary_level(b, lex, "l_expr3", l2, &[(b"<<", "'<<'", expr::SHL, "%* << %*"), (b">>", "'>>'", expr::SHR, "%* >> %*")]);
    let l4 = binary_level(
        b,
        lex,
        "l_expr4",
        l3,
        &[
            (b"<=", "'<='", expr::LE, "%* <= %*"),
            (b">=", "'>='", expr::GE, "%* >= %*"),
            (b"<", "'<'", expr::LT, "%* < %*"),
            (b">", "'>'", expr::GT, "%* > %*"),
        ],
    );
    let l5 = binary_level(b, lex, "l_expr5", l4, &[(b"==", "'=='", expr::EQ, "%* == %*"), (b"!=", "'!='", expr::NE, "%* != %*")]);
    let l6 = binary_level(b, lex, "l_expr6", l5, &[(b"&", "'&'", expr::BAND, "%* & %*")]);
    let l7 = binary_level(b, lex, "l_expr7", l6, &[(b"^", "'^'", expr::BXOR, "%* ^ %*")]);
    let l8 = binary_level(b, lex, "l_expr8", l7, &[(b"|", "'|'", expr::BOR, "%* | %*")]);
    let l9 = binary_level(b, lex, "l_expr9", l8, &[(b"&&", "'&&'", expr::AND, "%* && %*"), (b"||", "'||'", expr::OR, "%* || %*")]);

    let conditional = b.declare("conditional_expr");
    b.rule(conditional, Rule::new(take(lex, l9, "operand")).ending(pass_single()));
    {
        let mut elements = push(lex, l9, "condition");
        elements.extend(lit(lex, b"?", "'?'"));
        elements.extend(push(lex, conditional, "then-branch"));
        elements.extend(lit(lex, b":", "':'"));
        elements.extend(push(lex, conditional, "else-branch"));
        b.rule(conditional, Rule::new(elements).ending(make_tree(expr::COND, "%* ? %* : %*")));
    }

    let assignment = b.declare("assignment_expr");
    b.rule(assignment, Rule::new(take(lex, conditional, "operand")).ending(pass_single()));
    {
        let mut elements = push(lex, unary, "assignment target");
        elements.extend(lit(lex, b"=", "'='"));
        elements.extend(push(lex, assignment, "value"));
        b.rule(assignment, Rule::new(elements).ending(make_tree(expr::ASSIGN, "%* = %*")));
    }
    for (bytes, msg, fmt) in [
        (&b"+="[..], "'+='", "%* += %*"),
        (&b"-="[..], "'-='", "%* -= %*"),
        (&b"*="[..], "'*='", "%* *= %*"),
        (&b"/="[..], "'/='", "%* /= %*"),
    ] {
        let mut elements = push(lex, unary, "assignment target");
        elements.extend(lit(lex, bytes, msg));
        elements.extend(push(lex, assignment, "value"));
        b.rule(assignment, Rule::new(elements).ending(make_tree(expr::COMPOUND_ASSIGN, fmt)));
    }

    b.rule(expr_nt, Rule::new(take(lex, assignment, "expression")).ending(pass_single()));
    expr_nt
}

// ---------------------------------------------------------------------
// Declarations.
// ---------------------------------------------------------------------

struct Decls {
    decl: NonTerminalId,
    external_decl: NonTerminalId,
}

fn storage_class_nt(b: &mut GrammarBuilder, lex: &Lexicon) -> NonTerminalId {
    let nt = b.declare("storage_class");
    for name in ["static", "extern", "typedef", "task"] {
        b.rule(nt, Rule::new(keyword(lex, name)).ending(fixed_leaf(decl::STORAGE_CLASS, name)));
    }
    nt
}

/// `struct`/`union` (spec.md §4.I: "struct/union/enum"): tag-with-body is
/// tried before anonymous-body before bare tag reference, so a trailing
/// `{ ... }` is never left dangling on the shorter reference-only rule.
/// `field_decl_list` stays a single nested list child (like `param_list`/
/// `init_declarator_list` elsewhere in this grammar) rather than spliced
/// flat, since no pass needs to walk struct fields as direct AST children.
fn record_spec_nt(
    b: &mut GrammarBuilder,
    lex: &Lexicon,
    keyword_name: &'static str,
    nt_name: &'static str,
    tag_tree: &'static str,
    field_decl_list: NonTerminalId,
) -> NonTerminalId {
    let (tagged_body_fmt, anon_body_fmt, bare_fmt): (&'static str, &'static str, &'static str) = if keyword_name == "struct" {
        ("struct %* { %* }", "struct { %* }", "struct %*")
    } else {
        ("union %* { %* }", "union { %* }", "union %*")
    };
    let nt = b.declare(nt_name);
    {
        let mut elements = keyword(lex, keyword_name);
        elements.extend(push_ident(lex, "tag"));
        elements.extend(lit(lex, b"{", "'{'"));
        elements.extend(push(lex, field_decl_list, "fields"));
        elements.extend(lit(lex, b"}", "'}'"));
        b.rule(nt, Rule::new(elements).ending(make_tagged_record(tag_tree, tagged_body_fmt)));
    }
    {
        let mut elements = keyword(lex, keyword_name);
        elements.extend(lit(lex, b"{", "'{'"));
        elements.extend(push(lex, field_decl_list, "fields"));
        elements.extend(lit(lex, b"}", "'}'"));
        b.rule(nt, Rule::new(elements).ending(make_tree_from_list(tag_tree, anon_body_fmt)));
    }
    {
        let mut elements = keyword(lex, keyword_name);
        elements.extend(push_ident(lex, "tag"));
        b.rule(nt, Rule::new(elements).ending(make_tree(tag_tree, bare_fmt)));
    }
    nt
}

/// `enum` (spec.md §4.I): same tag-with-body / anonymous-body / bare-tag
/// shape as [`record_spec_nt`], but enumerator values are plain integer
/// literals rather than a full constant-expression, matching this grammar's
/// existing trim for array-size expressions (`direct_declarator`'s
/// `[ %* ]` rule below also takes `lex.int` directly, not a constant-expr).
fn enum_spec_nt(b: &mut GrammarBuilder, lex: &Lexicon) -> NonTerminalId {
    let enumerator = b.declare("enumerator");
    b.rule(enumerator, Rule::new(take_ident(lex, "enumerator")).ending(pass_single()));
    {
        let mut elements = push_ident(lex, "enumerator");
        elements.extend(lit(lex, b"=", "'='"));
        elements.extend(push(lex, lex.int, "enumerator value"));
        b.rule(enumerator, Rule::new(elements).ending(make_tree(decl::ENUMERATOR, "%* = %*")));
    }
    let enumerator_list = comma_list(b, lex, "enumerator_list", enumerator, "enumerator");

    let nt = b.declare("enum_spec");
    {
        let mut elements = keyword(lex, "enum");
        elements.extend(push_ident(lex, "tag"));
        elements.extend(lit(lex, b"{", "'{'"));
        elements.extend(push(lex, enumerator_list, "values"));
        elements.extend(lit(lex, b"}", "'}'"));
        b.rule(nt, Rule::new(elements).ending(make_tree(decl::ENUM_SPEC, "enum %* { %* }")));
    }
    {
        let mut elements = keyword(lex, "enum");
        elements.extend(lit(lex, b"{", "'{'"));
        elements.extend(push(lex, enumerator_list, "values"));
        elements.extend(lit(lex, b"}", "'}'"));
        b.rule(nt, Rule::new(elements).ending(make_tree(decl::ENUM_SPEC, "enum { %* }")));
    }
    {
        let mut elements = keyword(lex, "enum");
        elements.extend(push_ident(lex, "tag"));
        b.rule(nt, Rule::new(elements).ending(make_tree(decl::ENUM_SPEC, "enum %*")));
    }
    nt
}

fn type_specifier_nt(
    b: &mut GrammarBuilder,
    lex: &Lexicon,
    struct_spec: NonTerminalId,
    union_spec: NonTerminalId,
    enum_spec: NonTerminalId,
) -> NonTerminalId {
    let nt = b.declare("type_specifier");
    for name in ["void", "char", "int"] {
        b.rule(nt, Rule::new(keyword(lex, name)).ending(fixed_leaf(decl::TYPE_SPECIFIER, name)));
    }
    b.rule(nt, Rule::new(take(lex, struct_spec, "type")).ending(pass_single()));
    b.rule(nt, Rule::new(take(lex, union_spec, "type")).ending(pass_single()));
    b.rule(nt, Rule::new(take(lex, enum_spec, "type")).ending(pass_single()));
    nt
}

fn decl_specifiers_nt(b: &mut GrammarBuilder, lex: &Lexicon, storage: NonTerminalId, type_spec: NonTerminalId) -> NonTerminalId {
    let nt = b.declare("decl_specifiers");
    {
        let mut elements = push(lex, storage, "storage class");
        elements.extend(push(lex, type_spec, "type"));
        b.rule(nt, Rule::new(elements).ending(make_tree(decl::DECL_SPECIFIERS, "%* %*")));
    }
    b.rule(nt, Rule::new(push(lex, type_spec, "type")).ending(make_tree(decl::DECL_SPECIFIERS, "%*")));
    nt
}

fn build_declarations(b: &mut GrammarBuilder, lex: &Lexicon, expr_nt: NonTerminalId, stmt_list: NonTerminalId) -> Decls {
    let storage = storage_class_nt(b, lex);

    // `declarator` is forward-declared here (rules attached further down,
    // once `decl_specifiers` exists) so `field_decl` can reference it while
    // building struct/union bodies, the same forward-reference-by-id trick
    // `stmt_nt`/`stmt_list` use across `build()`'s two top-level calls.
    let declarator = b.declare("declarator");
    let field_declarator_list = comma_list(b, lex, "field_declarator_list", declarator, "field declarator");
    let field_decl = b.declare("field_decl");
    let field_decl_list = bare_list_nt(b, lex, "field_decl_list", field_decl, "field");

    let struct_spec = record_spec_nt(b, lex, "struct", "struct_spec", decl::STRUCT_SPEC, field_decl_list);
    let union_spec = record_spec_nt(b, lex, "union", "union_spec", decl::UNION_SPEC, field_decl_list);
    let enum_spec = enum_spec_nt(b, lex);
    let type_spec = type_specifier_nt(b, lex, struct_spec, union_spec, enum_spec);
    let decl_specifiers = decl_specifiers_nt(b, lex, storage, type_spec);

    {
        // A field's declaration specifiers can't themselves carry a storage
        // class (`static int x;` makes no sense inside a struct body), but
        // reusing `decl_specifiers` rather than a narrower non-terminal
        // keeps this grammar's "one decl_specifiers shape" convention; a
        // storage-class-carrying field is simply never produced by any
        // caller, not rejected at parse time.
        let mut elements = push(lex, decl_specifiers, "field type");
        elements.extend(push(lex, field_declarator_list, "field declarators"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(field_decl, Rule::new(elements).ending(make_tree(decl::FIELD_DECL, "%* %* ;")));
    }

    let param = b.declare("param");
    let param_list = comma_list(b, lex, "param_list", param, "parameter");

    // direct_declarator: ident, then array/function suffixes, built the
    // same way `postfix_expr`'s suffixes are (a base rule plus one
    // left-recursive rule per suffix kind, folding the previous result in
    // via `start_hook`).
    let direct_declarator = b.declare("direct_declarator");
    b.rule(direct_declarator, Rule::new(take_ident(lex, "declarator name")).ending(pass_single()));
    {
        let mut elements = lit(lex, b"[", "'['");
        elements.extend(push(lex, lex.int, "array size"));
        elements.extend(lit(lex, b"]", "']'"));
        b.left_recursive_rule(direct_declarator, Rule::new(elements).starting(rec_add_child()).ending(make_tree(decl::ARRAY_OF, "%*[%*]")));
    }
    {
        let mut elements = lit(lex, b"[", "'['");
        elements.extend(lit(lex, b"]", "']'"));
        b.left_recursive_rule(direct_declarator, Rule::new(elements).starting(rec_add_child()).ending(make_tree(decl::ARRAY_OF, "%*[]")));
    }
    {
        // `param_list` (a `comma_list`) matches zero items too, so a single
        // rule covers both `f()` and `f(int x, int y)`.
        let mut elements = lit(lex, b"(", "'('");
        elements.extend(push(lex, param_list, "parameters"));
        elements.extend(lit(lex, b")", "')'"));
        b.left_recursive_rule(direct_declarator, Rule::new(elements).starting(rec_add_child()).ending(make_tree(decl::FUNCTION_OF, "%*(%*)")));
    }

    {
        let mut elements = lit(lex, b"*", "'*'");
        elements.extend(push(lex, declarator, "pointee"));
        b.rule(declarator, Rule::new(elements).ending(make_tree(decl::POINTER, "*%*")));
    }
    b.rule(declarator, Rule::new(take(lex, direct_declarator, "declarator")).ending(pass_single()));

    {
        let mut elements = push(lex, decl_specifiers, "parameter type");
        elements.extend(push(lex, declarator, "parameter declarator"));
        b.rule(param, Rule::new(elements).ending(make_tree(decl::PARAM, "%* %*")));
    }

    let init_declarator = b.declare("init_declarator");
    {
        let mut elements = push(lex, declarator, "declarator");
        elements.extend(lit(lex, b"=", "'='"));
        elements.extend(push(lex, expr_nt, "initializer"));
        b.rule(init_declarator, Rule::new(elements).ending(make_tree(decl::INIT_DECLARATOR, "%* = %*")));
    }
    b.rule(init_declarator, Rule::new(take(lex, declarator, "declarator")).ending(pass_single()));
    let init_declarator_list = comma_list(b, lex, "init_declarator_list", init_declarator, "declarator");

    let decl_nt = b.declare("decl");
    {
        let mut elements = push(lex, decl_specifiers, "declaration specifiers");
        elements.extend(push(lex, init_declarator_list, "declarators"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(decl_nt, Rule::new(elements).ending(make_tree(decl::DECL, "%* %* ;")));
    }
    {
        let mut elements = push(lex, decl_specifiers, "declaration specifiers");
        elements.extend(lit(lex, b";", "';'"));
        b.rule(decl_nt, Rule::new(elements).ending(make_tree(decl::DECL, "%* ;")));
    }

    let func_def = b.declare("func_def");
    {
        let mut elements = push(lex, decl_specifiers, "function return type");
        elements.extend(push(lex, declarator, "function declarator"));
        elements.extend(compound_body_elements(lex, stmt_list));
        b.rule(func_def, Rule::new(elements).ending(make_func_def()));
    }
    {
        // K&R old-style function definition (spec.md §4.I: "function
        // definitions (new-style and K&R old-style)"): the declarator's
        // parameter list is bare identifiers, followed by a declaration
        // for each one, then the body — e.g. `int f(a, b) int a; int b; {
        // return a + b; }`. Tried after the new-style rule, since the
        // new-style rule's typed `param_list` already rejects a bare
        // identifier list and so never shadows this one.
        let kr_param_names = comma_list(b, lex, "kr_param_names", lex.ident, "parameter name");
        let kr_param_decls = bare_list_nt(b, lex, "kr_param_decl_list", decl_nt, "parameter declaration");
        let mut elements = push(lex, decl_specifiers, "function return type");
        elements.extend(push_ident(lex, "function name"));
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, kr_param_names, "parameter names"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, kr_param_decls, "parameter declarations"));
        elements.extend(compound_body_elements(lex, stmt_list));
        b.rule(func_def, Rule::new(elements).ending(make_kr_func_def()));
    }

    let external_decl = b.declare("external_decl");
    b.rule(external_decl, Rule::new(take(lex, func_def, "function definition")).ending(pass_single()));
    b.rule(external_decl, Rule::new(take(lex, decl_nt, "declaration")).ending(pass_single()));

    Decls { decl: decl_nt, external_decl }
}

fn compound_body_elements(lex: &Lexicon, stmt_list: NonTerminalId) -> Vec<Element> {
    // `stmt_list` itself matches zero statements (producing an empty
    // `list` node), so its reference here is never actually optional.
    let mut elements = lit(lex, b"{", "'{'");
    elements.extend(push(lex, stmt_list, "statement"));
    elements.extend(lit(lex, b"}", "'}'"));
    elements
}

// ---------------------------------------------------------------------
// Statements.
// ---------------------------------------------------------------------

fn build_statements(b: &mut GrammarBuilder, lex: &Lexicon, stmt_nt: NonTerminalId, stmt_list: NonTerminalId, expr_nt: NonTerminalId, decl_nt: NonTerminalId) {
    // block
    b.rule(stmt_nt, Rule::new(compound_body_elements(lex, stmt_list)).ending(make_tree_from_list(stmt::BLOCK, "{ %* }")));

    // declaration-as-statement, then bare expression statement / empty statement.
    b.rule(stmt_nt, Rule::new(take(lex, decl_nt, "declaration")).ending(pass_single()));
    {
        let mut elements = push(lex, expr_nt, "expression");
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::EXPR_STMT, "%* ;")));
    }
    b.rule(stmt_nt, Rule::new(lit(lex, b";", "';'")).ending(fixed_leaf(stmt::EMPTY_STMT, ";")));

    // label: ident ':' stmt — tried before the bare expression/goto rules
    // so a leading identifier followed by ':' is recognized as a label.
    {
        let mut elements = push_ident(lex, "label");
        elements.extend(lit(lex, b":", "':'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::LABEL, "%* : %*")));
    }

    // if / else — the else-carrying rule must be tried first so a
    // trailing `else` isn't left dangling on the shorter rule.
    {
        let mut elements = keyword(lex, "if");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "condition"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "then-branch"));
        elements.extend(keyword(lex, "else"));
        elements.extend(push(lex, stmt_nt, "else-branch"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::IF_ELSE, "if ( %* ) %* else %*")));
    }
    {
        let mut elements = keyword(lex, "if");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "condition"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "then-branch"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::IF, "if ( %* ) %*")));
    }

    // while
    {
        let mut elements = keyword(lex, "while");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "condition"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::WHILE, "while ( %* ) %*")));
    }

    // do-while
    {
        let mut elements = keyword(lex, "do");
        elements.extend(push(lex, stmt_nt, "body"));
        elements.extend(keyword(lex, "while"));
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "condition"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::DO_WHILE, "do %* while ( %* ) ;")));
    }

    // for — each clause is independently optional, but the rule always
    // appends exactly one child per clause (a real expression or an
    // `expr::EMPTY` placeholder), so `for`'s children count is always 4
    // and lines up with the 4 `%*` slots in its template.
    {
        let mut elements = keyword(lex, "for");
        elements.extend(lit(lex, b"(", "'('"));
        elements.push(optional_expr_slot(lex, expr_nt, "init"));
        elements.extend(lit(lex, b";", "';'"));
        elements.push(optional_expr_slot(lex, expr_nt, "condition"));
        elements.extend(lit(lex, b";", "';'"));
        elements.push(optional_expr_slot(lex, expr_nt, "update"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::FOR, "for ( %* ; %* ; %* ) %*")));
    }

    // return
    {
        let mut elements = keyword(lex, "return");
        elements.extend(push(lex, expr_nt, "value"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::RETURN, "return %* ;")));
    }
    {
        let mut elements = keyword(lex, "return");
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(fixed_leaf(stmt::RETURN_VOID, "return ;")));
    }

    {
        let mut elements = keyword(lex, "break");
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(fixed_leaf(stmt::BREAK, "break ;")));
    }
    {
        let mut elements = keyword(lex, "continue");
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(fixed_leaf(stmt::CONTINUE, "continue ;")));
    }

    {
        let mut elements = keyword(lex, "goto");
        elements.extend(push_ident(lex, "label"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::GOTO, "goto %* ;")));
    }

    // switch / case / default
    {
        let mut elements = keyword(lex, "switch");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "selector"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::SWITCH, "switch ( %* ) %*")));
    }
    {
        let mut elements = keyword(lex, "case");
        elements.extend(push(lex, expr_nt, "label"));
        elements.extend(lit(lex, b":", "':'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::CASE, "case %* : %*")));
    }
    {
        let mut elements = keyword(lex, "default");
        elements.extend(lit(lex, b":", "':'"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::DEFAULT, "default : %*")));
    }

    // TinyCoPoOS extensions.
    {
        let mut elements = keyword(lex, "queue");
        elements.extend(keyword(lex, "for"));
        elements.extend(push_ident(lex, "queue name"));
        elements.extend(push(lex, stmt_nt, "body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::QUEUE_FOR, "queue for %* %*")));
    }
    {
        let mut elements = keyword(lex, "poll");
        elements.extend(push(lex, stmt_nt, "poll body"));
        elements.extend(keyword(lex, "at"));
        elements.extend(keyword(lex, "most"));
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "timeout"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(push(lex, stmt_nt, "timeout body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::POLL_AT_MOST, "poll %* at most ( %* ) %*")));
    }
    {
        let mut elements = keyword(lex, "poll");
        elements.extend(push(lex, stmt_nt, "poll body"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::POLL, "poll %*")));
    }
    {
        let mut elements = keyword(lex, "timer");
        elements.extend(push_ident(lex, "timer name"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::TIMER, "timer %* ;")));
    }
    {
        let mut elements = keyword(lex, "every");
        elements.extend(lit(lex, b"(", "'('"));
        elements.extend(push(lex, expr_nt, "period"));
        elements.extend(lit(lex, b")", "')'"));
        elements.extend(keyword(lex, "start"));
        elements.extend(push_ident(lex, "task name"));
        elements.extend(lit(lex, b";", "';'"));
        b.rule(stmt_nt, Rule::new(elements).ending(make_tree(stmt::EVERY_START, "every ( %* ) start %* ;")));
    }

    // `stmt_list` was forward-declared (along with `stmt_nt`) so `block`
    // and `func_def` could reference its id before any of `stmt`'s own
    // rules existed; attach its body now that `stmt_nt` is fully built.
    let item_elem = wrap(take(lex, stmt_nt, "statement")).sequence().add_seq(collect_add_seq());
    b.rule(stmt_list, Rule::new(vec![item_elem]).ending(make_list("")));
}

// ---------------------------------------------------------------------
// Translation unit.
// ---------------------------------------------------------------------

fn build_translation_unit(b: &mut GrammarBuilder, lex: &Lexicon, external_decl: NonTerminalId) -> NonTerminalId {
    let nt = b.declare("translation_unit");
    let item_elem = wrap(take(lex, external_decl, "top-level declaration")).sequence().add_seq(collect_add_seq());
    let mut elements = vec![item_elem, ws(lex)];
    elements.push(Element::new(ElementKind::End).expect("end of input"));
    b.rule(nt, Rule::new(elements).ending(make_tree(decl::TRANSLATION_UNIT, "%*")));
    nt
}
