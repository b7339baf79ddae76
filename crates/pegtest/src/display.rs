//! Canonical textual form of a grammar, re-parseable by the grammar parser.

use std::fmt::{Display, Write};

use crate::{
    grammar::Grammar,
    node::{CharSet, NodeId, NodeKind},
};

// binding strength of each syntactic level, mirrors the descent order of the parser
const CHOICE: u8 = 0;
const SEQUENCE: u8 = 1;
const ELEMENT: u8 = 2;
const EXTENDED: u8 = 3;
const PREFIX: u8 = 4;
const POSTFIX: u8 = 5;
const PRIMARY: u8 = 6;

fn precedence(kind: &NodeKind) -> u8 {
    match kind {
        NodeKind::OrderedChoice(_) => CHOICE,
        NodeKind::Sequence(_) => SEQUENCE,
        NodeKind::ZeroOrMore {
            separator: Some(_), ..
        }
        | NodeKind::OneOrMore {
            separator: Some(_), ..
        }
        | NodeKind::Permutation {
            separator: Some(_), ..
        } => ELEMENT,
        NodeKind::Permutation { .. } => EXTENDED,
        NodeKind::Predicate { .. } => PREFIX,
        NodeKind::ZeroOrMore { .. }
        | NodeKind::OneOrMore { .. }
        | NodeKind::ZeroOrOne(_)
        | NodeKind::Cut(_) => POSTFIX,
        NodeKind::EndOfInput
        | NodeKind::Epsilon
        | NodeKind::AnyChar
        | NodeKind::Whitespace
        | NodeKind::Fail
        | NodeKind::RuleReference(_)
        | NodeKind::CharSet(_)
        | NodeKind::Literal(_)
        | NodeKind::Tag { .. }
        | NodeKind::ShowTerminals(_) => PRIMARY,
    }
}

fn escape_char(buf: &mut dyn Write, c: char, in_set: bool) -> std::fmt::Result {
    match c {
        '\n' => buf.write_str("\\n"),
        '\r' => buf.write_str("\\r"),
        '\t' => buf.write_str("\\t"),
        '\\' => buf.write_str("\\\\"),
        '"' if !in_set => buf.write_str("\\\""),
        '^' | '[' | ']' | '-' if in_set => write!(buf, "\\{c}"),
        _ => buf.write_char(c),
    }
}

pub fn display_literal(buf: &mut dyn Write, text: &str) -> std::fmt::Result {
    buf.write_char('"')?;
    for c in text.chars() {
        escape_char(buf, c, false)?;
    }
    buf.write_char('"')
}

pub fn display_charset(buf: &mut dyn Write, set: &CharSet) -> std::fmt::Result {
    buf.write_str(if set.is_negated() { "[^" } else { "[" })?;
    for &(first, last) in set.ranges() {
        escape_char(buf, first, true)?;
        if first != last {
            buf.write_char('-')?;
            escape_char(buf, last, true)?;
        }
    }
    buf.write_char(']')
}

impl Grammar {
    /// Writes one `name = expr;` line per rule, in definition order.
    pub fn print(&self, buf: &mut dyn Write) -> std::fmt::Result {
        for (name, body) in self.rules() {
            write!(buf, "{name} = ")?;
            self.display_node_into(buf, body)?;
            buf.write_str(";\n")?;
        }
        Ok(())
    }

    pub fn display_node_into(&self, buf: &mut dyn Write, id: NodeId) -> std::fmt::Result {
        self.display_at(buf, id, CHOICE)
    }

    pub fn display_node(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay { grammar: self, id }
    }

    fn display_list(
        &self,
        buf: &mut dyn Write,
        children: &[NodeId],
        delimiter: &str,
        level: u8,
    ) -> std::fmt::Result {
        for (i, &child) in children.iter().enumerate() {
            if i > 0 {
                buf.write_str(delimiter)?;
            }
            self.display_at(buf, child, level)?;
        }
        Ok(())
    }

    fn display_at(&self, buf: &mut dyn Write, id: NodeId, min: u8) -> std::fmt::Result {
        let kind = self[id].kind();
        let parenthesize = precedence(kind) < min;
        if parenthesize {
            buf.write_char('(')?;
        }

        match kind {
            NodeKind::EndOfInput => buf.write_str("EOF")?,
            NodeKind::Epsilon => buf.write_str("EPSILON")?,
            NodeKind::AnyChar => buf.write_str("ANY")?,
            NodeKind::Whitespace => buf.write_str("WS")?,
            NodeKind::Fail => buf.write_str("ERROR")?,
            NodeKind::RuleReference(name) => buf.write_str(name)?,
            NodeKind::CharSet(set) => display_charset(buf, set)?,
            NodeKind::Literal(text) => display_literal(buf, text)?,
            NodeKind::OrderedChoice(children) => {
                self.display_list(buf, children, " / ", SEQUENCE)?
            }
            NodeKind::Sequence(children) => self.display_list(buf, children, " ", ELEMENT)?,
            &NodeKind::ZeroOrMore { child, separator } | &NodeKind::OneOrMore { child, separator } => {
                self.display_at(buf, child, POSTFIX)?;
                let op = match kind {
                    NodeKind::ZeroOrMore { .. } => '*',
                    _ => '+',
                };
                buf.write_char(op)?;
                if let Some(separator) = separator {
                    buf.write_str(" % ")?;
                    self.display_at(buf, separator, EXTENDED)?;
                }
            }
            &NodeKind::ZeroOrOne(child) => {
                self.display_at(buf, child, POSTFIX)?;
                buf.write_char('?')?;
            }
            &NodeKind::Cut(child) => {
                self.display_at(buf, child, POSTFIX)?;
                buf.write_char(',')?;
            }
            &NodeKind::Predicate { child, assert } => {
                buf.write_char(if assert { '&' } else { '!' })?;
                self.display_at(buf, child, PREFIX)?;
            }
            NodeKind::Tag { child, name } => {
                write!(buf, "<{name}>")?;
                self.display_at(buf, *child, CHOICE)?;
                write!(buf, "</{name}>")?;
            }
            &NodeKind::ShowTerminals(child) => {
                buf.write_char('{')?;
                self.display_at(buf, child, CHOICE)?;
                buf.write_char('}')?;
            }
            NodeKind::Permutation {
                children,
                separator,
                exhaustive,
            } => {
                let delimiter = if *exhaustive { " ^ " } else { " . " };
                self.display_list(buf, children, delimiter, PREFIX)?;
                if let Some(separator) = *separator {
                    buf.write_str(" % ")?;
                    self.display_at(buf, separator, EXTENDED)?;
                }
            }
        }

        if parenthesize {
            buf.write_char(')')?;
        }
        Ok(())
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.print(f)
    }
}

pub struct NodeDisplay<'a> {
    grammar: &'a Grammar,
    id: NodeId,
}

impl Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.grammar.display_node_into(f, self.id)
    }
}
