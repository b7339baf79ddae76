use std::{collections::HashMap, collections::HashSet, ops::Index};

use cranelift_entity::PrimaryMap;

use crate::{
    error::ErrorAccumulator,
    node::{Builtin, ChildrenInfo, Node, NodeId, NodeKind, RcString},
    span::Span,
};

/// Name of the rule interpretation starts from.
pub const AXIOM_RULE_NAME: &str = "start";

/// A compiled grammar: the node arena and the rule table indexing into it.
///
/// Built once by the [`GrammarParser`](crate::parser::GrammarParser), read-only afterwards.
#[derive(Clone, Debug)]
pub struct Grammar {
    nodes: PrimaryMap<NodeId, Node>,
    rules: Vec<(RcString, NodeId)>,
    name_to_rule: HashMap<RcString, NodeId>,
    axiom: Option<NodeId>,
    serial: u32,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub(crate) fn new() -> Grammar {
        let mut nodes = PrimaryMap::new();
        for builtin in Builtin::ALL {
            let id = nodes.push(Node::builtin(builtin));
            debug_assert_eq!(id, builtin.node_id());
        }

        Grammar {
            nodes,
            rules: Vec::new(),
            name_to_rule: HashMap::new(),
            axiom: None,
            serial: 0,
        }
    }

    pub(crate) fn push_node(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let serial = self.serial;
        self.serial += 1;
        self.nodes.push(Node::new(kind, span, serial))
    }

    pub(crate) fn attach_separator(&mut self, node: NodeId, separator: NodeId, to: u32) -> bool {
        self.nodes[node].attach_separator(separator, to)
    }

    /// Registers a rule, the first definition of a name wins.
    pub(crate) fn define_rule(&mut self, name: RcString, body: NodeId) -> Result<(), ()> {
        if self.name_to_rule.contains_key(&name) {
            return Err(());
        }
        self.name_to_rule.insert(name.clone(), body);
        self.rules.push((name, body));
        Ok(())
    }

    pub(crate) fn initialize_axiom(&mut self) -> bool {
        self.axiom = self.rule(AXIOM_RULE_NAME);
        self.axiom.is_some()
    }

    /// Reports every reference to an undefined rule, once per name.
    pub(crate) fn check_rules(&self, err: &ErrorAccumulator) {
        let mut reported = HashSet::new();
        for &(_, body) in &self.rules {
            self.visit(body, |_, node| {
                if let NodeKind::RuleReference(name) = node.kind() {
                    if self.resolve(name).is_none() && reported.insert(name.clone()) {
                        let span = node.span().unwrap_or(Span::at(0));
                        err.error(span, format_args!("Rule '{name}' is not defined."));
                    }
                }
            });
        }
    }

    pub fn axiom(&self) -> Option<NodeId> {
        self.axiom
    }

    /// Rule names in definition order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules.iter().map(|(name, _)| &**name)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.rules.iter().map(|(name, body)| (&**name, *body))
    }

    /// The expression tree of a user defined rule.
    pub fn rule(&self, name: &str) -> Option<NodeId> {
        self.name_to_rule.get(name).copied()
    }

    /// Resolves a rule reference, user rules first, then builtins.
    pub fn resolve(&self, name: &str) -> Option<NodeId> {
        self.rule(name)
            .or_else(|| Builtin::from_name(name).map(Builtin::node_id))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: NodeId) -> ChildrenInfo {
        self.nodes[id].children_info()
    }

    /// Preorder traversal of the expression tree rooted at `id`, separators are visited after
    /// the children. Rule references are not followed.
    pub fn visit(&self, id: NodeId, mut f: impl FnMut(NodeId, &Node)) {
        self.visit_impl(id, &mut f)
    }

    fn visit_impl(&self, id: NodeId, f: &mut dyn FnMut(NodeId, &Node)) {
        let node = &self.nodes[id];
        f(id, node);
        for &child in node.kind().children() {
            self.visit_impl(child, f);
        }
        if let Some(separator) = node.kind().separator() {
            self.visit_impl(separator, f);
        }
    }
}

impl Index<NodeId> for Grammar {
    type Output = Node;
    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(grammar: &mut Grammar, text: &str, at: u32) -> NodeId {
        let len = text.len() as u32;
        grammar.push_node(NodeKind::Literal(text.into()), Span::new(at, at + len))
    }

    #[test]
    fn builtins_are_preallocated() {
        let grammar = Grammar::new();
        assert_eq!(grammar.node_count(), Builtin::ALL.len());
        for builtin in Builtin::ALL {
            let node = grammar.node(builtin.node_id());
            assert_eq!(node.span(), None);
            assert_eq!(grammar.resolve(builtin.name()), Some(builtin.node_id()));
        }
    }

    #[test]
    fn first_definition_wins() {
        let mut grammar = Grammar::new();
        let a = literal(&mut grammar, "a", 0);
        let b = literal(&mut grammar, "b", 4);
        assert!(grammar.define_rule("start".into(), a).is_ok());
        assert!(grammar.define_rule("start".into(), b).is_err());
        assert!(grammar.initialize_axiom());
        assert_eq!(grammar.axiom(), Some(a));
        assert_eq!(grammar.rule_names().collect::<Vec<_>>(), ["start"]);
    }

    #[test]
    fn undefined_references_reported_once() {
        let mut grammar = Grammar::new();
        let first = grammar.push_node(NodeKind::RuleReference("x".into()), Span::new(0, 1));
        let second = grammar.push_node(NodeKind::RuleReference("x".into()), Span::new(2, 3));
        let ws = grammar.push_node(NodeKind::RuleReference("WS".into()), Span::new(4, 6));
        let seq = grammar.push_node(NodeKind::sequence(vec![first, second, ws]), Span::new(0, 6));
        grammar.define_rule("start".into(), seq).unwrap();

        let err = ErrorAccumulator::new();
        grammar.check_rules(&err);
        let errors = err.into_located();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Rule 'x' is not defined.");
        assert_eq!(errors[0].span, Span::new(0, 1));
    }

    #[test]
    fn visit_reaches_separators() {
        let mut grammar = Grammar::new();
        let a = literal(&mut grammar, "a", 0);
        let comma = literal(&mut grammar, ",", 6);
        let rep = grammar.push_node(
            NodeKind::ZeroOrMore {
                child: a,
                separator: None,
            },
            Span::new(0, 4),
        );
        assert!(grammar.attach_separator(rep, comma, 9));

        let mut seen = Vec::new();
        grammar.visit(rep, |id, _| seen.push(id));
        assert_eq!(seen, [rep, a, comma]);
        assert_eq!(
            grammar.children(rep),
            ChildrenInfo {
                children: vec![a],
                separator: Some(comma)
            }
        );
    }
}
