//! Token grammars (spec.md §4.H): `white_space`, `ident`, `int`, `char`,
//! `string`.
//!
//! `white_space` is expressed with the generic grammar combinators (it has
//! no semantic payload, just a shape to match and discard — a natural fit
//! for `CharSet`/`Group`/`avoid`). The other four scan several bytes at a
//! time with state a per-character hook would have to thread awkwardly
//! (hex/octal/decimal dispatch, octal-escape run-length, suffix stripping),
//! so they're built as terminal-function scanners (spec.md §4.D's "terminal
//! function (user scanner returning an advanced cursor)") instead — see
//! DESIGN.md for why that split was chosen over chasing the single
//! character-add accumulator the source used.

use tinycopoos_core::chars::{CharClass, Cursor};
use tinycopoos_core::grammar::{Element, ElementKind, GrammarBuilder, NonTerminalId, Rule, Seed};
use tinycopoos_core::interner::Interner;
use tinycopoos_core::tree::{NodeId, NodePayload, Position, Tree};

/// Non-terminal ids for the five token productions, threaded into
/// `grammar_c` so the C grammar's rules can reference them.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon {
    pub white_space: NonTerminalId,
    pub ident: NonTerminalId,
    pub int: NonTerminalId,
    pub char_lit: NonTerminalId,
    pub string_lit: NonTerminalId,
}

const MAX_IDENT_LEN: usize = 64;

pub fn build(b: &mut GrammarBuilder) -> Lexicon {
    let white_space = build_white_space(b);
    let ident = build_terminal(b, "ident", scan_ident);
    let int = build_terminal(b, "int", scan_int);
    let char_lit = build_terminal(b, "char", scan_char);
    let string_lit = build_string(b, white_space);
    Lexicon {
        white_space,
        ident,
        int,
        char_lit,
        string_lit,
    }
}

fn build_terminal(
    b: &mut GrammarBuilder,
    name: &'static str,
    scan: tinycopoos_core::grammar::TerminalFn,
) -> NonTerminalId {
    let nt = b.declare(name);
    b.rule(
        nt,
        Rule::new(vec![Element::new(ElementKind::Terminal(scan))
            .expect(name)
            .add(Box::new(|_seed, result, _tree, _lists| Seed::Single(result)))])
        .ending(Box::new(|seed, _cursor, _tree, _lists| match seed {
            Seed::Single(id) => id,
            _ => unreachable!("terminal rule always produces Single"),
        })),
    );
    nt
}

fn build_white_space(b: &mut GrammarBuilder) -> NonTerminalId {
    let ws = b.declare("white_space");

    let mut ws_chars = CharClass::new();
    ws_chars.add(b' ').add(b'\t').add(b'\n').add(b'\r');

    let mut not_newline = CharClass::new();
    not_newline.add_range(0, 255);
    not_newline.remove(b'\n');

    let mut any_byte = CharClass::new();
    any_byte.add_range(0, 255);

    let simple = Rule::new(vec![Element::new(ElementKind::CharSet(ws_chars))]);

    let line_comment = Rule::new(vec![
        Element::new(ElementKind::Char(b'/')),
        Element::new(ElementKind::Char(b'/')),
        Element::new(ElementKind::CharSet(not_newline)).sequence(),
    ]);

    // `avoid` on the inner run-of-any-byte means "try to end (match `*/`)
    // before consuming one more byte" — a shortest-match scan-until, so the
    // comment ends at the *first* `*/` rather than the last.
    let block_comment = Rule::new(vec![
        Element::new(ElementKind::Char(b'/')),
        Element::new(ElementKind::Char(b'*')),
        Element::new(ElementKind::CharSet(any_byte)).avoid().sequence(),
        Element::new(ElementKind::Char(b'*')),
        Element::new(ElementKind::Char(b'/')),
    ]);

    let unit = Element::new(ElementKind::Group(vec![simple, line_comment, block_comment]))
        .sequence()
        .add_seq(Box::new(|_seed, _items, _tree, _lists| Seed::Empty));

    b.rule(
        ws,
        Rule::new(vec![unit]).ending(Box::new(|_seed, cursor, tree, _lists| {
            tree.int(Position::from(cursor), 0)
        })),
    );
    ws
}

fn build_string(b: &mut GrammarBuilder, ws: NonTerminalId) -> NonTerminalId {
    let string_lit = b.declare("string");

    let run = Element::new(ElementKind::Terminal(scan_string_run))
        .expect("string literal")
        .sequence()
        .chained_by(Element::new(ElementKind::NonTerminal(ws)))
        .add_seq(Box::new(|_seed, items, tree, _lists| {
            // Position of the whole literal is the first run's position
            // (each run is stamped with its own start cursor by the scanner).
            let pos = tree.position(items[0]);
            let mut bytes = Vec::new();
            for item in items {
                if let NodePayload::Str(run) = tree.get(item) {
                    bytes.extend_from_slice(run);
                }
            }
            bytes.push(0);
            Seed::Single(tree.string(pos, bytes.into_boxed_slice()))
        }));

    b.rule(
        string_lit,
        Rule::new(vec![run]).ending(Box::new(|seed, _cursor, _tree, _lists| match seed {
            Seed::Single(id) => id,
            _ => unreachable!("string rule always produces Single"),
        })),
    );
    string_lit
}

fn scan_ident(source: &[u8], cursor: Cursor, tree: &mut Tree, interner: &mut Interner) -> Option<(Cursor, NodeId)> {
    let start = cursor.offset as usize;
    let b0 = *source.get(start)?;
    if !(b0.is_ascii_alphabetic() || b0 == b'_') {
        return None;
    }
    let mut end = start + 1;
    while end < source.len() {
        let b = source[end];
        if b.is_ascii_alphanumeric() || b == b'_' {
            end += 1;
        } else {
            break;
        }
    }
    let significant_end = (start + MAX_IDENT_LEN).min(end);
    let text = std::str::from_utf8(&source[start..significant_end]).ok()?;
    let sym = interner.intern(text);
    let keyword = interner.is_keyword(sym);

    let mut cur = cursor;
    for &b in &source[start..end] {
        cur.advance(b);
    }
    let node = tree.ident(Position::from(cursor), sym, keyword);
    Some((cur, node))
}

fn scan_int(source: &[u8], cursor: Cursor, tree: &mut Tree, _interner: &mut Interner) -> Option<(Cursor, NodeId)> {
    let start = cursor.offset as usize;
    let mut i = start;
    let negative = source.get(i) == Some(&b'-');
    if negative {
        i += 1;
    }

    let magnitude: i64 = if source.get(i) == Some(&b'0') && matches!(source.get(i + 1), Some(b'x') | Some(b'X')) {
        i += 2;
        let digits_start = i;
        while source.get(i).is_some_and(u8::is_ascii_hexdigit) {
            i += 1;
        }
        if i == digits_start {
            return None;
        }
        i64::from_str_radix(std::str::from_utf8(&source[digits_start..i]).ok()?, 16).ok()?
    } else if source.get(i) == Some(&b'0') {
        let digits_start = i + 1;
        i += 1;
        while source.get(i).is_some_and(|b| (b'0'..=b'7').contains(b)) {
            i += 1;
        }
        let text = &source[digits_start..i];
        if text.is_empty() {
            0
        } else {
            i64::from_str_radix(std::str::from_utf8(text).ok()?, 8).ok()?
        }
    } else if source.get(i).is_some_and(|b| (b'1'..=b'9').contains(b)) {
        let digits_start = i;
        while source.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        std::str::from_utf8(&source[digits_start..i]).ok()?.parse().ok()?
    } else {
        return None;
    };

    while source.get(i).is_some_and(|b| matches!(b, b'U' | b'u' | b'L' | b'l')) {
        i += 1;
    }

    let value = if negative { -magnitude } else { magnitude };
    let mut cur = cursor;
    for &b in &source[start..i] {
        cur.advance(b);
    }
    let node = tree.int(Position::from(cursor), value);
    Some((cur, node))
}

fn escape_byte(esc: u8) -> Option<u8> {
    Some(match esc {
        b'0' => 0,
        b'"' => b'"',
        b'\'' => b'\'',
        b'\\' => b'\\',
        b'a' => 0x07,
        b'b' => 0x08,
        b'f' => 0x0C,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'v' => 0x0B,
        _ => return None,
    })
}

fn scan_char(source: &[u8], cursor: Cursor, tree: &mut Tree, _interner: &mut Interner) -> Option<(Cursor, NodeId)> {
    let start = cursor.offset as usize;
    if source.get(start) != Some(&b'\'') {
        return None;
    }
    let mut i = start + 1;
    let value = if source.get(i) == Some(&b'\\') {
        i += 1;
        let esc = *source.get(i)?;
        i += 1;
        escape_byte(esc)?
    } else {
        let b = *source.get(i)?;
        i += 1;
        b
    };
    if source.get(i) != Some(&b'\'') {
        return None;
    }
    i += 1;
    let mut cur = cursor;
    for &b in &source[start..i] {
        cur.advance(b);
    }
    let node = tree.char(Position::from(cursor), value);
    Some((cur, node))
}

/// Scans exactly one `"..."` run; `string` chains these together with
/// `white_space` as the separator so adjacent string-literal runs
/// concatenate (spec.md §4.H: "concatenation of one or more double-quoted
/// runs separated by white_space").
fn scan_string_run(source: &[u8], cursor: Cursor, tree: &mut Tree, _interner: &mut Interner) -> Option<(Cursor, NodeId)> {
    let start = cursor.offset as usize;
    if source.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    let mut bytes = Vec::new();
    loop {
        match source.get(i) {
            None => return None,
            Some(b'"') => {
                i += 1;
                break;
            }
            Some(b'\\') => {
                i += 1;
                let esc = *source.get(i)?;
                if (b'0'..=b'7').contains(&esc) {
                    let digits_start = i;
                    let mut len = 0;
                    while len < 3 && source.get(i).is_some_and(|b| (b'0'..=b'7').contains(b)) {
                        i += 1;
                        len += 1;
                    }
                    let val = u8::from_str_radix(std::str::from_utf8(&source[digits_start..i]).ok()?, 8).ok()?;
                    bytes.push(val);
                } else {
                    i += 1;
                    bytes.push(escape_byte(esc)?);
                }
            }
            Some(&b) => {
                bytes.push(b);
                i += 1;
            }
        }
    }
    let mut cur = cursor;
    for &b in &source[start..i] {
        cur.advance(b);
    }
    let node = tree.string(Position::from(cursor), bytes.into_boxed_slice());
    Some((cur, node))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &[u8], scan_fn: tinycopoos_core::grammar::TerminalFn) -> Option<(Cursor, NodeId, Tree, Interner)> {
        let mut tree = Tree::new();
        let mut interner = Interner::new();
        let (cur, id) = scan_fn(source, Cursor::start(), &mut tree, &mut interner)?;
        Some((cur, id, tree, interner))
    }

    #[test]
    fn ident_truncates_at_64_bytes_but_consumes_whole_lexeme() {
        let long = "a".repeat(70);
        let (cur, id, tree, interner) = scan(long.as_bytes(), scan_ident).unwrap();
        assert_eq!(cur.offset, 70);
        let (sym, keyword) = tree.expect_ident(id);
        assert_eq!(interner.resolve(sym).len(), 64);
        assert!(!keyword);
    }

    #[test]
    fn int_parses_hex_octal_decimal_and_negative() {
        assert_eq!(scan_one_int(b"123"), 123);
        assert_eq!(scan_one_int(b"0x1F"), 31);
        assert_eq!(scan_one_int(b"017"), 15);
        assert_eq!(scan_one_int(b"-5"), -5);
        assert_eq!(scan_one_int(b"10UL"), 10);
    }

    fn scan_one_int(source: &[u8]) -> i64 {
        let (_, id, tree, _) = scan(source, scan_int).unwrap();
        match tree.get(id) {
            NodePayload::Int(v) => *v,
            other => panic!("expected int, got {other:?}"),
        }
    }

    #[test]
    fn char_literal_handles_escapes() {
        let (_, id, tree, _) = scan(b"'\\n'", scan_char).unwrap();
        match tree.get(id) {
            NodePayload::Char(b) => assert_eq!(*b, b'\n'),
            other => panic!("expected char, got {other:?}"),
        }
    }

    #[test]
    fn string_run_handles_octal_escape() {
        let (_, id, tree, _) = scan(b"\"a\\101b\"", scan_string_run).unwrap();
        match tree.get(id) {
            NodePayload::Str(bytes) => assert_eq!(&**bytes, b"aAb"),
            other => panic!("expected string, got {other:?}"),
        }
    }
}
