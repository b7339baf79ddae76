use std::{borrow::Cow, cell::RefCell};

use crate::{
    node::NodeId,
    span::{Span, Spanned},
};

pub type Error = Cow<'static, str>;

/// Diagnostic anchored to a span.
///
/// When `node` is `None` the span points into the grammar source, otherwise it points into the
/// parsed input and `node` is the grammar node whose evaluation failed. The one exception is
/// "Invalid grammar", returned when input is run against a grammar without an axiom: it has no
/// node to name and carries an empty span at 0.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("{message} at {span}")]
pub struct LocatedError {
    pub message: String,
    pub span: Span,
    pub node: Option<NodeId>,
}

impl LocatedError {
    pub fn in_grammar(message: impl Into<String>, span: Span) -> LocatedError {
        LocatedError {
            message: message.into(),
            span,
            node: None,
        }
    }
    pub fn in_input(message: impl Into<String>, span: Span, node: NodeId) -> LocatedError {
        LocatedError {
            message: message.into(),
            span,
            node: Some(node),
        }
    }
    pub fn is_grammar_error(&self) -> bool {
        self.node.is_none()
    }
}

/// Conditions which abort an interpretation run outright, no enclosing choice may recover them.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Fatal {
    #[error("Left recursion detected in rules: {}", .rules.join(", "))]
    LeftRecursion {
        rules: Vec<String>,
        node: NodeId,
        position: u32,
    },
    #[error("Loop count exceeded limit.")]
    LoopLimit { node: NodeId, position: u32 },
}

impl Fatal {
    pub fn into_located(self) -> LocatedError {
        let message = self.to_string();
        match self {
            Fatal::LeftRecursion { node, position, .. } | Fatal::LoopLimit { node, position } => {
                LocatedError::in_input(message, Span::point(position), node)
            }
        }
    }
}

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<Spanned<Error>>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error_static(&self, span: Span, err: &'static str) {
        self.errors
            .borrow_mut()
            .push(Spanned::new(err.into(), span));
    }
    pub fn error(&self, span: Span, err: impl ToString) {
        self.errors
            .borrow_mut()
            .push(Spanned::new(err.to_string().into(), span));
    }
    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }
    pub fn into_located(self) -> Vec<LocatedError> {
        self.errors
            .into_inner()
            .into_iter()
            .map(|e| LocatedError::in_grammar(e.inner, e.span))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::EntityRef;

    use super::*;

    #[test]
    fn accumulator_keeps_order() {
        let err = ErrorAccumulator::new();
        err.error_static(Span::new(4, 5), "first");
        err.error(Span::new(0, 1), format_args!("second {}", 2));
        assert_eq!(err.len(), 2);

        let located = err.into_located();
        assert_eq!(located[0].message, "first");
        assert_eq!(located[1].message, "second 2");
        assert!(located.iter().all(LocatedError::is_grammar_error));
    }

    #[test]
    fn fatal_messages() {
        let fatal = Fatal::LeftRecursion {
            rules: vec!["start".into(), "expr".into()],
            node: NodeId::new(7),
            position: 3,
        };
        let located = fatal.into_located();
        assert_eq!(located.message, "Left recursion detected in rules: start, expr");
        assert_eq!(located.span, Span::new(3, 4));
        assert_eq!(located.node, Some(NodeId::new(7)));

        let fatal = Fatal::LoopLimit {
            node: NodeId::new(1),
            position: 0,
        };
        assert_eq!(fatal.to_string(), "Loop count exceeded limit.");
    }
}
