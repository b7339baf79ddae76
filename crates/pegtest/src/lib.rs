//! Parsing expression grammar toolkit: a parser for grammar source text and a packrat
//! interpreter which runs the resulting [`Grammar`] over input text.

pub mod ast;
pub mod display;
pub mod error;
pub mod grammar;
pub mod interpret;
pub mod memo;
pub mod node;
pub mod parser;
pub mod span;

pub use ast::{AstId, AstNode, SyntaxTree};
pub use error::{Fatal, LocatedError};
pub use grammar::Grammar;
pub use interpret::{InputResult, InterpretOptions, ParsedInput};
pub use memo::{MemoEntry, MemoId, MemoResult, MemoTable};
pub use node::{Builtin, NodeId, NodeKind};
pub use span::Span;

/// Compiles grammar source text. Either every rule is well formed and resolvable, or all the
/// collected errors are returned.
pub fn parse_grammar(src: &str) -> Result<Grammar, Vec<LocatedError>> {
    parser::GrammarParser::new(src).parse()
}

pub fn parse_input(grammar: &Grammar, src: &str) -> InputResult {
    parse_input_with(grammar, src, InterpretOptions::default())
}

pub fn parse_input_with(grammar: &Grammar, src: &str, options: InterpretOptions) -> InputResult {
    interpret::Interpreter::new(grammar, src, options).run()
}
