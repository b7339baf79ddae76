//! Grammar expression nodes. Nodes are stored in the arena of their [`Grammar`](crate::grammar::Grammar)
//! and referenced by [`NodeId`], which doubles as the node identity used for memoization.

use std::rc::Rc;

use cranelift_entity::{entity_impl, EntityRef};

use crate::span::Span;

pub type RcString = Rc<str>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

entity_impl! { NodeId }

/// Rules which are always available and cannot be defined by the user.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Builtin {
    Whitespace = 0,
    EndOfInput,
    AnyChar,
    Epsilon,
    Fail,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::Whitespace,
        Builtin::EndOfInput,
        Builtin::AnyChar,
        Builtin::Epsilon,
        Builtin::Fail,
    ];

    /// Names which are only rejected as rule names once the rule body has been read.
    pub const LATE_RESERVED: [&'static str; 3] = ["WS", "EOF", "EPSILON"];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Whitespace => "WS",
            Builtin::EndOfInput => "EOF",
            Builtin::AnyChar => "ANY",
            Builtin::Epsilon => "EPSILON",
            Builtin::Fail => "ERROR",
        }
    }
    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }
    /// Builtins occupy the first slots of every grammar arena.
    pub fn node_id(self) -> NodeId {
        NodeId::new(self as usize)
    }
    pub(crate) fn debug_id(self) -> &'static str {
        match self {
            Builtin::Whitespace => "WhiteSpace",
            Builtin::EndOfInput => "EOF",
            Builtin::AnyChar => "AnyNotEOF",
            Builtin::Epsilon => "Epsilon",
            Builtin::Fail => "Error",
        }
    }
    pub(crate) fn kind(self) -> NodeKind {
        match self {
            Builtin::Whitespace => NodeKind::Whitespace,
            Builtin::EndOfInput => NodeKind::EndOfInput,
            Builtin::AnyChar => NodeKind::AnyChar,
            Builtin::Epsilon => NodeKind::Epsilon,
            Builtin::Fail => NodeKind::Fail,
        }
    }
}

/// A set of characters stored as sorted, non-overlapping inclusive ranges.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CharSet {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharSet {
    pub fn new(negated: bool) -> CharSet {
        CharSet {
            negated,
            ranges: Vec::new(),
        }
    }
    pub fn insert(&mut self, c: char) {
        self.insert_range(c, c);
    }
    pub fn insert_range(&mut self, first: char, last: char) {
        assert!(first <= last, "Empty character interval");

        let index = self.ranges.partition_point(|&(start, _)| start < first);
        self.ranges.insert(index, (first, last));

        // merge overlapping and adjacent ranges
        let mut merged: Vec<(char, char)> = Vec::with_capacity(self.ranges.len());
        for &(start, end) in &self.ranges {
            match merged.last_mut() {
                Some((_, prev_end)) if start as u32 <= *prev_end as u32 + 1 => {
                    *prev_end = char::max(*prev_end, end);
                }
                _ => merged.push((start, end)),
            }
        }
        self.ranges = merged;
    }
    pub fn is_negated(&self) -> bool {
        self.negated
    }
    pub fn ranges(&self) -> &[(char, char)] {
        &self.ranges
    }
    /// Raw membership, ignoring negation.
    pub fn contains(&self, c: char) -> bool {
        let index = self.ranges.partition_point(|&(_, end)| end < c);
        match self.ranges.get(index) {
            Some(&(start, _)) => start <= c,
            None => false,
        }
    }
    pub fn matches(&self, c: char) -> bool {
        self.contains(c) != self.negated
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    EndOfInput,
    Epsilon,
    AnyChar,
    Whitespace,
    Fail,

    RuleReference(RcString),
    CharSet(CharSet),
    Literal(RcString),

    Sequence(Vec<NodeId>),
    OrderedChoice(Vec<NodeId>),
    ZeroOrMore {
        child: NodeId,
        separator: Option<NodeId>,
    },
    OneOrMore {
        child: NodeId,
        separator: Option<NodeId>,
    },
    ZeroOrOne(NodeId),
    Predicate {
        child: NodeId,
        assert: bool,
    },
    Tag {
        child: NodeId,
        name: RcString,
    },
    ShowTerminals(NodeId),
    Cut(NodeId),
    Permutation {
        children: Vec<NodeId>,
        separator: Option<NodeId>,
        exhaustive: bool,
    },
}

impl NodeKind {
    pub fn sequence(children: Vec<NodeId>) -> NodeKind {
        assert!(children.len() >= 2, "Sequence needs at least two children");
        NodeKind::Sequence(children)
    }
    pub fn ordered_choice(children: Vec<NodeId>) -> NodeKind {
        assert!(children.len() >= 2, "Ordered choice needs at least two children");
        NodeKind::OrderedChoice(children)
    }
    pub fn permutation(
        children: Vec<NodeId>,
        separator: Option<NodeId>,
        exhaustive: bool,
    ) -> NodeKind {
        assert!(children.len() >= 2, "Permutation needs at least two children");
        NodeKind::Permutation {
            children,
            separator,
            exhaustive,
        }
    }
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            NodeKind::EndOfInput
                | NodeKind::Epsilon
                | NodeKind::AnyChar
                | NodeKind::Whitespace
                | NodeKind::Fail
        )
    }
    pub fn separator(&self) -> Option<NodeId> {
        match *self {
            NodeKind::ZeroOrMore { separator, .. }
            | NodeKind::OneOrMore { separator, .. }
            | NodeKind::Permutation { separator, .. } => separator,
            _ => None,
        }
    }
    pub fn children(&self) -> &[NodeId] {
        match self {
            NodeKind::EndOfInput
            | NodeKind::Epsilon
            | NodeKind::AnyChar
            | NodeKind::Whitespace
            | NodeKind::Fail
            | NodeKind::RuleReference(_)
            | NodeKind::CharSet(_)
            | NodeKind::Literal(_) => &[],
            NodeKind::Sequence(children)
            | NodeKind::OrderedChoice(children)
            | NodeKind::Permutation { children, .. } => children,
            NodeKind::ZeroOrMore { child, .. }
            | NodeKind::OneOrMore { child, .. }
            | NodeKind::ZeroOrOne(child)
            | NodeKind::Predicate { child, .. }
            | NodeKind::Tag { child, .. }
            | NodeKind::ShowTerminals(child)
            | NodeKind::Cut(child) => std::slice::from_ref(child),
        }
    }
    fn label(&self) -> String {
        match self {
            NodeKind::EndOfInput => "EOF".into(),
            NodeKind::Epsilon => "Epsilon".into(),
            NodeKind::AnyChar => "AnyNotEOF".into(),
            NodeKind::Whitespace => "WhiteSpace".into(),
            NodeKind::Fail => "Error".into(),
            NodeKind::RuleReference(name) => format!("RuleUse '{name}'"),
            NodeKind::CharSet(_) => "Set".into(),
            NodeKind::Literal(_) => "String".into(),
            NodeKind::Sequence(_) => "Sequence".into(),
            NodeKind::OrderedChoice(_) => "Branch".into(),
            NodeKind::ZeroOrMore { .. } => "ZeroOrMore".into(),
            NodeKind::OneOrMore { .. } => "OneOrMore".into(),
            NodeKind::ZeroOrOne(_) => "ZeroOrOne".into(),
            NodeKind::Predicate { assert: true, .. } => "And-predicate".into(),
            NodeKind::Predicate { assert: false, .. } => "Not-predicate".into(),
            NodeKind::Tag { name, .. } => format!("Tag '{name}'"),
            NodeKind::ShowTerminals(_) => "Show".into(),
            NodeKind::Cut(_) => "Cut".into(),
            NodeKind::Permutation {
                exhaustive: true, ..
            } => "Permutation".into(),
            NodeKind::Permutation {
                exhaustive: false, ..
            } => "Options".into(),
        }
    }
}

/// The direct children of a node, as shown to tooling.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ChildrenInfo {
    pub children: Vec<NodeId>,
    pub separator: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Node {
    span: Option<Span>,
    debug_id: RcString,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn builtin(builtin: Builtin) -> Node {
        Node {
            span: None,
            debug_id: builtin.debug_id().into(),
            kind: builtin.kind(),
        }
    }
    pub(crate) fn new(kind: NodeKind, span: Span, serial: u32) -> Node {
        debug_assert!(!kind.is_builtin(), "Builtin nodes are singletons");
        Node {
            span: Some(span),
            debug_id: format!("{} {serial}", kind.label()).into(),
            kind,
        }
    }
    /// Span in the grammar source, `None` for builtin nodes.
    pub fn span(&self) -> Option<Span> {
        self.span
    }
    /// Human readable label, unique within a grammar.
    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
    pub fn children_info(&self) -> ChildrenInfo {
        ChildrenInfo {
            children: self.kind.children().to_vec(),
            separator: self.kind.separator(),
        }
    }
    /// The only mutation a node sees after construction. Returns false when the node does not
    /// support separators.
    pub(crate) fn attach_separator(&mut self, new: NodeId, to: u32) -> bool {
        match &mut self.kind {
            NodeKind::ZeroOrMore { separator, .. }
            | NodeKind::OneOrMore { separator, .. }
            | NodeKind::Permutation { separator, .. } => {
                *separator = Some(new);
                self.span = self.span.map(|span| span.widen_to(to));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_merges_ranges() {
        let mut set = CharSet::new(false);
        set.insert_range('a', 'f');
        set.insert('x');
        set.insert_range('d', 'k');
        set.insert('l');
        assert_eq!(set.ranges(), &[('a', 'l'), ('x', 'x')]);

        assert!(set.matches('a'));
        assert!(set.matches('l'));
        assert!(set.matches('x'));
        assert!(!set.matches('m'));
        assert!(!set.matches('A'));
    }

    #[test]
    fn charset_negated() {
        let mut set = CharSet::new(true);
        set.insert_range('0', '9');
        assert!(!set.matches('5'));
        assert!(set.matches('a'));
        assert!(set.contains('5'));
    }

    #[test]
    fn builtin_names() {
        let names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(names, ["WS", "EOF", "ANY", "EPSILON", "ERROR"]);
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(Builtin::from_name("ERORR"), None);
    }

    #[test]
    #[should_panic]
    fn sequence_needs_two_children() {
        NodeKind::sequence(vec![NodeId::new(0)]);
    }

    #[test]
    fn separator_attachment() {
        let mut node = Node::new(
            NodeKind::ZeroOrMore {
                child: NodeId::new(5),
                separator: None,
            },
            Span::new(2, 4),
            0,
        );
        assert!(node.attach_separator(NodeId::new(6), 9));
        assert_eq!(node.kind().separator(), Some(NodeId::new(6)));
        assert_eq!(node.span(), Some(Span::new(2, 9)));

        let mut node = Node::new(NodeKind::ZeroOrOne(NodeId::new(5)), Span::new(2, 4), 1);
        assert!(!node.attach_separator(NodeId::new(6), 9));
        assert_eq!(node.debug_id(), "ZeroOrOne 1");
    }
}
