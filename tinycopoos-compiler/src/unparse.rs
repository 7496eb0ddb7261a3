//! The unparser (spec.md §4.K): walks a tree, rendering each node through
//! the format string `grammar_c` stamped onto it at parse time, writing the
//! result through a [`Sink`].
//!
//! Every tree node already carries its own rendering template (`fmt`), so
//! this module has no C-specific knowledge at all — it only knows how to
//! interpret the four directives spec.md §4.K defines: `%*` (consume the
//! next child and recurse), `%%` (literal `%`), `%<`/`%>` (indent
//! decrement/increment), and a literal newline in the template (lazily
//! materialized, collapsing consecutive requests, flushed just before the
//! next non-whitespace character is written).

use std::io;

use tinycopoos_core::interner::Interner;
use tinycopoos_core::tree::{NodeId, NodePayload, Tree};
use tinycopoos_core::sink::Sink;

const INDENT_UNIT: &str = "    ";

/// Renders tree nodes to C source text. Carries the small amount of state
/// the directives above need across sibling writes: the pending (not yet
/// materialized) newline, the current indent depth, and whether the last
/// character written was identifier-like (for the alphanumeric-adjacency
/// rule: two identifier-like glyphs must never collide across a node
/// boundary, e.g. the `return` keyword directly followed by a variable
/// named `value`).
pub struct Unparser<'t, 'i> {
    tree: &'t Tree,
    interner: &'i Interner,
    indent: u32,
    pending_newline: bool,
    last_was_ident: bool,
}

impl<'t, 'i> Unparser<'t, 'i> {
    pub fn new(tree: &'t Tree, interner: &'i Interner) -> Self {
        Self {
            tree,
            interner,
            indent: 0,
            pending_newline: false,
            last_was_ident: false,
        }
    }

    pub fn unparse(tree: &'t Tree, interner: &'i Interner, root: NodeId, out: &mut dyn Sink) -> io::Result<()> {
        let mut u = Self::new(tree, interner);
        u.write_node(root, out)
    }

    /// Render a single node as a standalone string (used by the task
    /// transform to splice synthesized statements in amongst verbatim
    /// subtrees without re-walking the whole program).
    pub fn to_string(tree: &'t Tree, interner: &'i Interner, node: NodeId) -> String {
        let mut buf = tinycopoos_core::sink::BufSink::new();
        Self::unparse(tree, interner, node, &mut buf).expect("BufSink is infallible");
        buf.into_string()
    }

    fn write_node(&mut self, id: NodeId, out: &mut dyn Sink) -> io::Result<()> {
        match self.tree.get(id) {
            NodePayload::Ident { name, .. } => {
                let text = self.interner.resolve(*name).to_owned();
                self.write_text(&text, out)
            }
            NodePayload::Char(byte) => {
                let text = format!("'{}'", escape_char_literal(*byte));
                self.write_text(&text, out)
            }
            NodePayload::Str(bytes) => {
                let text = format_c_string(bytes);
                self.write_text(&text, out)
            }
            NodePayload::Int(value) => self.write_text(&value.to_string(), out),
            NodePayload::Tree { fmt, children, .. } => {
                let children = children.clone();
                self.write_fmt(fmt, &children, out)
            }
            NodePayload::List { sep, children } => {
                let sep = *sep;
                let children = children.clone();
                self.write_list(sep, &children, out)
            }
        }
    }

    /// Interpret `fmt` against `children`. `%*` consumes one child at a
    /// time and recurses into it; when `%*` is the *last* occurrence left
    /// in the template, it instead absorbs every remaining child in
    /// sequence (this is how `translation_unit`'s `"%*"` and `block`'s `"{
    /// %* }"` print an arbitrary number of top-level declarations or
    /// statements through a template written for exactly one).
    fn write_fmt(&mut self, fmt: &'static str, children: &[NodeId], out: &mut dyn Sink) -> io::Result<()> {
        let directive_count = fmt.matches("%*").count();
        let mut seen = 0usize;
        let mut next_child = 0usize;
        let mut chars = fmt.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '%' {
                match fmt[i + 1..].chars().next() {
                    Some('*') => {
                        chars.next();
                        seen += 1;
                        if seen == directive_count {
                            while next_child < children.len() {
                                self.write_node(children[next_child], out)?;
                                next_child += 1;
                            }
                        } else if next_child < children.len() {
                            self.write_node(children[next_child], out)?;
                            next_child += 1;
                        }
                        continue;
                    }
                    Some('%') => {
                        chars.next();
                        self.write_text("%", out)?;
                        continue;
                    }
                    Some('<') => {
                        chars.next();
                        self.indent = self.indent.saturating_sub(1);
                        continue;
                    }
                    Some('>') => {
                        chars.next();
                        self.indent += 1;
                        continue;
                    }
                    _ => {}
                }
            }
            if c == '\n' {
                self.pending_newline = true;
                continue;
            }
            let mut buf = [0u8; 4];
            self.write_text(c.encode_utf8(&mut buf), out)?;
        }
        Ok(())
    }

    fn write_list(&mut self, sep: &'static str, children: &[NodeId], out: &mut dyn Sink) -> io::Result<()> {
        for (i, &child) in children.iter().enumerate() {
            if i > 0 && !sep.is_empty() {
                self.write_text(sep, out)?;
            }
            self.write_node(child, out)?;
        }
        Ok(())
    }

    /// Write a literal chunk of text, applying the two stateful rules: a
    /// pending lazy newline is materialized (with the current indent)
    /// before any non-empty chunk, and a single space is inserted if doing
    /// so would otherwise glue two identifier-like glyphs together.
    fn write_text(&mut self, text: &str, out: &mut dyn Sink) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.pending_newline {
            out.write_str("\n")?;
            for _ in 0..self.indent {
                out.write_str(INDENT_UNIT)?;
            }
            self.pending_newline = false;
            self.last_was_ident = false;
        }
        let first_is_ident = is_ident_byte(text.as_bytes()[0]);
        if self.last_was_ident && first_is_ident {
            out.write_str(" ")?;
        }
        out.write_str(text)?;
        self.last_was_ident = is_ident_byte(*text.as_bytes().last().unwrap());
        Ok(())
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn escape_char_literal(byte: u8) -> String {
    match byte {
        b'\'' => "\\'".to_owned(),
        b'\\' => "\\\\".to_owned(),
        b'\n' => "\\n".to_owned(),
        b'\t' => "\\t".to_owned(),
        0x20..=0x7e => (byte as char).to_string(),
        other => format!("\\x{other:02x}"),
    }
}

/// `bytes` includes the trailing NUL the string grammar always appends
/// (spec.md §4.H); strip it before re-escaping the printable run.
fn format_c_string(bytes: &[u8]) -> String {
    let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for &b in text {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\x{other:02x}")),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinycopoos_core::chars::Cursor;

    #[test]
    fn binary_expr_round_trips_through_fmt() {
        let mut tree = Tree::new();
        let mut interner = Interner::new();
        let pos = Cursor::start().into();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let a_node = tree.ident(pos, a, false);
        let b_node = tree.ident(pos, b, false);
        let add = tree.tree(pos, "add", "%* + %*", vec![a_node, b_node]);
        let text = Unparser::to_string(&tree, &interner, add);
        assert_eq!(text, "a + b");
    }

    #[test]
    fn trailing_directive_absorbs_remaining_children() {
        let mut tree = Tree::new();
        let mut interner = Interner::new();
        let pos = Cursor::start().into();
        let x = interner.intern("x");
        let y = interner.intern("y");
        let x_node = tree.char(pos, b'1');
        let _ = x;
        let y_node = tree.char(pos, b'2');
        let _ = y;
        let block = tree.tree(pos, "block", "{ %* }", vec![x_node, y_node]);
        let text = Unparser::to_string(&tree, &interner, block);
        assert_eq!(text, "{ '1''2' }");
    }

    #[test]
    fn identifier_adjacency_inserts_a_space() {
        let mut tree = Tree::new();
        let mut interner = Interner::new();
        let pos = Cursor::start().into();
        let ret = interner.intern("return");
        let value = interner.intern("value");
        let ret_node = tree.ident(pos, ret, true);
        let value_node = tree.ident(pos, value, false);
        let stmt = tree.tree(pos, "return", "%* %* ;", vec![ret_node, value_node]);
        let text = Unparser::to_string(&tree, &interner, stmt);
        assert_eq!(text, "return value ;");
    }

    #[test]
    fn comma_list_uses_its_own_separator() {
        let mut tree = Tree::new();
        let mut interner = Interner::new();
        let pos = Cursor::start().into();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let a_node = tree.ident(pos, a, false);
        let b_node = tree.ident(pos, b, false);
        let list = tree.list(pos, ",", vec![a_node, b_node]);
        let text = Unparser::to_string(&tree, &interner, list);
        assert_eq!(text, "a,b");
    }
}
