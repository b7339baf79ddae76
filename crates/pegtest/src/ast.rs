use std::{
    fmt::Write,
    ops::{Index, IndexMut},
};

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::{memo::MemoId, node::NodeId, node::RcString, span::Span};

/// Name of the synthetic node wrapping a successful parse.
pub const ROOT_NAME: &str = "ROOT";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AstId(u32);

entity_impl! { AstId }

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AstNode {
    pub span: Span,
    /// Present for nodes created by a tag or the root, absent for terminals.
    pub name: Option<RcString>,
    pub children: Option<Vec<AstId>>,
    /// The grammar node which produced this node.
    pub node: NodeId,
    pub memo: Option<MemoId>,
}

impl AstNode {
    pub fn is_terminal(&self) -> bool {
        self.name.is_none()
    }
    pub fn children(&self) -> &[AstId] {
        self.children.as_deref().unwrap_or(&[])
    }
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        self.span.as_str(input)
    }
}

/// Arena of the AST nodes created during one interpretation run.
///
/// Nodes created by alternatives that were later abandoned stay in the arena, only nodes
/// reachable from the root form the tree.
#[derive(Clone, Default, Debug)]
pub struct SyntaxTree {
    nodes: PrimaryMap<AstId, AstNode>,
}

impl SyntaxTree {
    pub fn new() -> SyntaxTree {
        SyntaxTree::default()
    }

    pub(crate) fn push(&mut self, node: AstNode) -> AstId {
        self.nodes.push(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Structural view of the subtree at `id`: names, spans and nesting. Arena ids are left out,
    /// which makes results of separate runs comparable.
    pub fn shape(&self, id: AstId) -> AstShape {
        let node = &self.nodes[id];
        AstShape {
            name: node.name.as_deref().map(str::to_owned),
            span: node.span,
            children: node
                .children
                .as_ref()
                .map(|children| children.iter().map(|&child| self.shape(child)).collect()),
        }
    }

    /// Indented dump, `name from..to` for named nodes and the quoted text for terminals.
    pub fn display_into(&self, buf: &mut dyn Write, id: AstId, input: &str) -> std::fmt::Result {
        self.display_impl(buf, id, input, 0)
    }

    fn display_impl(
        &self,
        buf: &mut dyn Write,
        id: AstId,
        input: &str,
        depth: usize,
    ) -> std::fmt::Result {
        let node = &self.nodes[id];
        write!(buf, "{:indent$}", "", indent = depth * 2)?;
        match &node.name {
            Some(name) => writeln!(buf, "{name} {}", node.span)?,
            None => writeln!(buf, "{:?}", node.text(input))?,
        }
        for &child in node.children() {
            self.display_impl(buf, child, input, depth + 1)?;
        }
        Ok(())
    }
}

impl Index<AstId> for SyntaxTree {
    type Output = AstNode;
    fn index(&self, index: AstId) -> &Self::Output {
        &self.nodes[index]
    }
}

impl IndexMut<AstId> for SyntaxTree {
    fn index_mut(&mut self, index: AstId) -> &mut Self::Output {
        &mut self.nodes[index]
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AstShape {
    pub name: Option<String>,
    pub span: Span,
    pub children: Option<Vec<AstShape>>,
}
