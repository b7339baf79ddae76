//! Recursive descent parser for the grammar notation.
//!
//! ```text
//! axiom         := rule*
//! rule          := modifierBlock | identifier ("=" | ":=") fullexpr ";"
//! modifierBlock := modifierName identifier "do" rule* "done"
//! fullexpr      := branch ("/" branch)*
//! branch        := element+
//! element       := extended ("%" extended)?
//! extended      := prefix (("^" prefix)* | ("." prefix)*)
//! prefix        := ("&" | "!") prefix | postfix
//! postfix       := primary ("*" | "+" | "?" | ",")*
//! primary       := string | range | "(" fullexpr ")" | "{" fullexpr "}"
//!                | "<" id ">" fullexpr "</" id ">" | identifier
//! ```

use crate::{
    error::{ErrorAccumulator, LocatedError},
    grammar::{Grammar, AXIOM_RULE_NAME},
    node::{Builtin, CharSet, NodeId, NodeKind, RcString},
    span::Span,
};

pub struct Scanner<'a> {
    src: &'a str,
    pos: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn span_since(&self, start: u32) -> Span {
        Span::new(start, self.pos)
    }

    pub fn restore_pos(&mut self, pos: u32) {
        debug_assert!(pos as usize <= self.src.len());
        self.pos = pos;
    }

    pub fn is_empty(&self) -> bool {
        self.pos as usize == self.src.len()
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos as usize..]
    }

    pub fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8() as u32;
        Some(c)
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn consume(&mut self, value: char) -> bool {
        if self.peek() == Some(value) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn consume_while(&mut self, predicate: impl Fn(char) -> bool) -> Span {
        let start = self.pos();
        while let Some(c) = self.peek() {
            if predicate(c) {
                self.next();
            } else {
                break;
            }
        }
        self.span_since(start)
    }

    pub fn sequence(&mut self, sequence: &str) -> bool {
        if self.rest().starts_with(sequence) {
            self.pos += sequence.len() as u32;
            true
        } else {
            false
        }
    }

    pub fn skip_to_end(&mut self) {
        self.pos = self.src.len() as u32;
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Which copies of the inserted rule a modifier block splices into each of its rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct RuleModifier {
    pre: bool,
    inf: bool,
    suf: bool,
}

impl RuleModifier {
    fn from_name(name: &str) -> Option<RuleModifier> {
        let (pre, inf, suf) = match name {
            "infixing" => (false, true, false),
            "allfixing" => (true, true, true),
            "prefixing" => (true, true, false),
            "suffixing" => (false, true, true),
            "appending" => (false, false, true),
            "prepending" => (true, false, false),
            "surrounding" => (true, false, true),
            _ => return None,
        };
        Some(RuleModifier { pre, inf, suf })
    }
}

/// The rule spliced by an enclosing modifier block. Every splice gets its own node.
struct Infix {
    name: RcString,
    span: Span,
}

pub struct GrammarParser<'a> {
    grammar: Grammar,
    s: Scanner<'a>,
    err: ErrorAccumulator,
}

impl<'a> GrammarParser<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            grammar: Grammar::new(),
            s: Scanner::new(src),
            err: ErrorAccumulator::new(),
        }
    }

    pub fn parse(mut self) -> Result<Grammar, Vec<LocatedError>> {
        self.skip_ws();
        while !self.s.is_empty() {
            self.parse_rule(None);
            self.skip_ws();
        }

        let GrammarParser { mut grammar, s, err } = self;
        if !grammar.initialize_axiom() {
            err.error(
                Span::at(s.pos()),
                format_args!("Rule '{AXIOM_RULE_NAME}' is not defined."),
            );
        }
        grammar.check_rules(&err);

        log::debug!(
            "Parsed {} rules into {} nodes with {} errors",
            grammar.rule_names().count(),
            grammar.node_count(),
            err.len()
        );

        if err.is_empty() {
            Ok(grammar)
        } else {
            Err(err.into_located())
        }
    }

    fn parse_rule(&mut self, modifier: Option<(RuleModifier, &Infix)>) {
        let Some(name_span) = self.read_identifier() else {
            self.error("Expecting rule name.");
            self.skip_after_semicolon();
            return;
        };
        let name = name_span.as_str(self.s.src);

        if matches!(Builtin::from_name(name), Some(Builtin::AnyChar | Builtin::Fail)) {
            self.err.error_static(name_span, "Rule name is reserved.");
            self.skip_after_semicolon();
            return;
        }
        if self.grammar.rule(name).is_some() {
            self.err.error_static(name_span, "Rule name already used.");
            self.skip_after_semicolon();
            return;
        }
        if let Some(new_modifier) = RuleModifier::from_name(name) {
            if modifier.is_some() {
                self.err.error_static(name_span, "Nesting a rule modifier.");
                self.skip_after_semicolon();
                return;
            }
            self.parse_modified_rules(new_modifier);
            return;
        }

        self.skip_ws();
        let wrap = if self.s.peek() == Some(':') {
            if !self.expect(":=", "Expecting := after rule name.") {
                self.skip_after_semicolon();
                return;
            }
            true
        } else {
            if !self.expect("=", "Expecting = after rule name.") {
                self.skip_after_semicolon();
                return;
            }
            false
        };

        let body_infix = modifier.filter(|(m, _)| m.inf).map(|(_, infix)| infix);
        let Some(mut body) = self.parse_full_expression(body_infix) else {
            self.skip_after_semicolon();
            return;
        };

        if let Some((modifier, infix)) = modifier {
            let span = self.node_span(body);
            let mut sequence = Vec::with_capacity(3);
            if modifier.pre {
                sequence.push(self.splice(infix));
            }
            sequence.push(body);
            if modifier.suf {
                sequence.push(self.splice(infix));
            }
            if sequence.len() > 1 {
                body = self.grammar.push_node(NodeKind::sequence(sequence), span);
            }
        }

        if !self.expect(";", "Expecting rule terminator ;") {
            self.skip_after_semicolon();
            return;
        }

        if Builtin::LATE_RESERVED.contains(&name) {
            self.err
                .error(name_span, format_args!("Name {name} is reserved."));
            return;
        }

        if wrap {
            let span = self.s.span_since(name_span.start());
            body = self.grammar.push_node(
                NodeKind::Tag {
                    child: body,
                    name: name.into(),
                },
                span,
            );
        }

        if self.grammar.define_rule(name.into(), body).is_err() {
            self.err.error_static(name_span, "Rule name already used.");
        }
    }

    fn parse_modified_rules(&mut self, modifier: RuleModifier) {
        let Some(name_span) = self.read_identifier() else {
            self.error("Expecting the inserted rule name.");
            self.skip_after_done();
            return;
        };
        let infix = Infix {
            name: name_span.as_str(self.s.src).into(),
            span: name_span,
        };

        if !self.keyword("do") {
            self.error("Expected 'do'");
            self.skip_after_done();
            return;
        }

        loop {
            self.skip_ws();
            if self.s.is_empty() {
                self.error("Expected 'done'");
                return;
            }
            if self.keyword("done") {
                return;
            }
            self.parse_rule(Some((modifier, &infix)));
        }
    }

    fn parse_full_expression(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        self.skip_ws();
        let begin = self.s.pos();
        let mut branches = Vec::new();
        loop {
            self.skip_ws();
            if !self.is_start_of_element() {
                self.error("Expecting a primary expression.");
                break;
            }
            match self.parse_branch(infix) {
                Some(branch) => branches.push(branch),
                None => self.skip_to_one_of(&['/', ';']),
            }
            if !self.matches("/") {
                break;
            }
        }

        match branches.len() {
            0 => None,
            1 => branches.pop(),
            _ => {
                let span = self.s.span_since(begin);
                Some(
                    self.grammar
                        .push_node(NodeKind::ordered_choice(branches), span),
                )
            }
        }
    }

    fn parse_branch(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let from = self.s.pos();
        let mut sequence = vec![self.parse_element(infix)?];
        self.skip_ws();
        while self.is_start_of_element() {
            if let Some(infix) = infix {
                sequence.push(self.splice(infix));
            }
            sequence.push(self.parse_element(infix)?);
            self.skip_ws();
        }

        if sequence.len() == 1 {
            return sequence.pop();
        }
        let span = self.s.span_since(from);
        Some(self.grammar.push_node(NodeKind::sequence(sequence), span))
    }

    fn is_start_of_element(&self) -> bool {
        match self.s.peek() {
            Some('<') => !self.s.rest().starts_with("</"),
            Some(c) => is_identifier_start(c) || "([{&!\"".contains(c),
            None => false,
        }
    }

    fn parse_element(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let result = self.parse_extended(infix)?;
        if !self.matches("%") {
            return Some(result);
        }

        self.skip_ws();
        let from = self.s.pos();
        let mut separator = self.parse_extended(infix)?;
        if let Some(infix) = infix {
            let before = self.splice(infix);
            let after = self.splice(infix);
            let span = self.s.span_since(from);
            separator = self
                .grammar
                .push_node(NodeKind::sequence(vec![before, separator, after]), span);
        }

        if !self
            .grammar
            .attach_separator(result, separator, self.s.pos())
        {
            self.error("Separator applied to invalid expression.");
            return None;
        }
        Some(result)
    }

    fn parse_extended(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let begin = self.s.pos();
        let first = self.parse_prefix(infix)?;
        self.skip_ws();

        let (op, other, exhaustive) = match self.s.peek() {
            Some('^') => ('^', '.', true),
            Some('.') => ('.', '^', false),
            _ => return Some(first),
        };

        let mut children = vec![first];
        while self.s.consume(op) {
            self.skip_ws();
            children.push(self.parse_prefix(infix)?);
            self.skip_ws();
        }
        if self.s.peek() == Some(other) {
            self.error("Cannot mix '^' and '.' in one chain");
            return None;
        }

        let separator = infix.map(|infix| self.splice(infix));
        let span = self.s.span_since(begin);
        Some(self.grammar.push_node(
            NodeKind::permutation(children, separator, exhaustive),
            span,
        ))
    }

    fn parse_prefix(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let from = self.s.pos();
        let assert = match self.s.peek() {
            Some('&') => true,
            Some('!') => false,
            _ => return self.parse_postfix(infix),
        };
        self.s.next();
        self.skip_ws();

        let child = self.parse_prefix(infix)?;
        let span = self.s.span_since(from);
        Some(
            self.grammar
                .push_node(NodeKind::Predicate { child, assert }, span),
        )
    }

    fn parse_postfix(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let from = self.s.pos();
        let mut result = self.parse_primary(infix)?;
        loop {
            let save = self.s.pos();
            self.skip_ws();
            let kind = match self.s.peek() {
                Some('*') => NodeKind::ZeroOrMore {
                    child: result,
                    separator: infix.map(|infix| self.splice(infix)),
                },
                Some('+') => NodeKind::OneOrMore {
                    child: result,
                    separator: infix.map(|infix| self.splice(infix)),
                },
                Some('?') => NodeKind::ZeroOrOne(result),
                Some(',') => NodeKind::Cut(result),
                _ => {
                    self.s.restore_pos(save);
                    return Some(result);
                }
            };
            self.s.next();
            let span = self.s.span_since(from);
            result = self.grammar.push_node(kind, span);
        }
    }

    fn parse_primary(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        match self.s.peek() {
            Some('"') => return self.parse_string(),
            Some('[') => return self.parse_range(),
            Some('(') => return self.parse_parentheses(infix),
            Some('{') => return self.parse_show_terminals(infix),
            Some('<') => return self.parse_tagged(infix),
            _ => {}
        }

        if let Some(span) = self.read_identifier() {
            let name = span.as_str(self.s.src).into();
            return Some(self.grammar.push_node(NodeKind::RuleReference(name), span));
        }

        self.error("Expecting a primary expression.");
        None
    }

    fn parse_string(&mut self) -> Option<NodeId> {
        let from = self.s.pos();
        self.s.next(); // "

        let mut text = String::new();
        loop {
            match self.s.next() {
                None => {
                    self.err
                        .error_static(Span::point(from), "String reaches end of file.");
                    return None;
                }
                Some('"') => break,
                Some('\\') => text.push(self.read_escaped(false)?),
                Some(c) => text.push(c),
            }
        }

        let span = self.s.span_since(from);
        Some(
            self.grammar
                .push_node(NodeKind::Literal(text.into()), span),
        )
    }

    /// Reads the character after a backslash, reporting errors itself.
    fn read_escaped(&mut self, in_set: bool) -> Option<char> {
        let backslash = self.s.pos() - 1;
        let Some(c) = self.s.next() else {
            self.error(match in_set {
                true => "Unexpected end of file in a range.",
                false => "String reaches end of file.",
            });
            return None;
        };

        match c {
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            '\\' | '^' | '[' | ']' | '-' => Some(c),
            '"' if !in_set => Some(c),
            _ => {
                self.err
                    .error_static(self.s.span_since(backslash), "Unknown escape sequence.");
                None
            }
        }
    }

    fn parse_range(&mut self) -> Option<NodeId> {
        let from = self.s.pos();
        self.s.next(); // [

        let mut set = CharSet::new(self.s.consume('^'));
        match self.parse_range_element(&mut set) {
            Ok(true) => {}
            Ok(false) if self.s.is_empty() => {
                self.error("End of file reached inside a range");
                return None;
            }
            Ok(false) => {
                self.error("Expecting a range element.");
                return None;
            }
            Err(()) => return None,
        }
        while self.parse_range_element(&mut set).ok()? {}

        if !self.s.consume(']') {
            self.error("End of file reached inside a range");
            return None;
        }

        let span = self.s.span_since(from);
        Some(self.grammar.push_node(NodeKind::CharSet(set), span))
    }

    /// Returns `Ok(false)` at the closing bracket or the end of the source.
    fn parse_range_element(&mut self, set: &mut CharSet) -> Result<bool, ()> {
        let from = self.s.pos();
        let first = match self.s.peek() {
            None | Some(']') => return Ok(false),
            Some(_) => self.range_char()?,
        };

        match self.s.peek() {
            None => {
                self.error("Unexpected end of file in a range.");
                return Err(());
            }
            Some('-') => {}
            Some(_) => {
                set.insert(first);
                return Ok(true);
            }
        }
        self.s.next(); // -

        let last = match self.s.peek() {
            None => {
                self.error("Unexpected end of file in a range.");
                return Err(());
            }
            // a trailing dash stands for itself
            Some(']') => {
                set.insert(first);
                set.insert('-');
                return Ok(true);
            }
            Some(_) => self.range_char()?,
        };

        if last < first {
            self.err
                .error_static(self.s.span_since(from), "Empty character interval.");
            return Err(());
        }
        set.insert_range(first, last);
        Ok(true)
    }

    fn range_char(&mut self) -> Result<char, ()> {
        match self.s.next() {
            Some('\\') => self.read_escaped(true).ok_or(()),
            Some(c) => Ok(c),
            None => Err(()),
        }
    }

    fn parse_parentheses(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        self.s.next(); // (
        let expr = self.parse_full_expression(infix)?;
        if !self.expect(")", "Expected ')'") {
            return None;
        }
        Some(expr)
    }

    fn parse_show_terminals(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let from = self.s.pos();
        self.s.next(); // {
        let child = self.parse_full_expression(infix)?;
        if !self.expect("}", "Expected '}'") {
            return None;
        }

        let span = self.s.span_since(from);
        Some(self.grammar.push_node(NodeKind::ShowTerminals(child), span))
    }

    fn parse_tagged(&mut self, infix: Option<&Infix>) -> Option<NodeId> {
        let from = self.s.pos();
        self.s.next(); // <
        let Some(open) = self.read_identifier() else {
            self.error("Expecting a tag name.");
            return None;
        };
        if !self.expect(">", "Expecting closing >") {
            return None;
        }

        let child = self.parse_full_expression(infix)?;
        if !self.expect("</", "Expecting </ after tagged expression") {
            return None;
        }

        let name = open.as_str(self.s.src);
        match self.read_identifier() {
            Some(close) if close.as_str(self.s.src) == name => {}
            Some(close) => {
                self.err.error_static(close, "Mismatched tag name");
                return None;
            }
            None => {
                self.error("Mismatched tag name");
                return None;
            }
        }
        if !self.expect(">", "Expecting closing >") {
            return None;
        }

        let span = self.s.span_since(from);
        Some(self.grammar.push_node(
            NodeKind::Tag {
                child,
                name: name.into(),
            },
            span,
        ))
    }

    fn splice(&mut self, infix: &Infix) -> NodeId {
        self.grammar
            .push_node(NodeKind::RuleReference(infix.name.clone()), infix.span)
    }

    fn node_span(&self, id: NodeId) -> Span {
        self.grammar[id].span().unwrap_or(Span::at(0))
    }

    fn read_identifier(&mut self) -> Option<Span> {
        self.skip_ws();
        if !self.s.peek().is_some_and(is_identifier_start) {
            return None;
        }
        Some(self.s.consume_while(is_identifier_continue))
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = self.s.rest();
        rest.starts_with(keyword)
            && !rest[keyword.len()..].starts_with(is_identifier_continue)
            && self.s.sequence(keyword)
    }

    fn matches(&mut self, terminals: &str) -> bool {
        self.skip_ws();
        self.s.sequence(terminals)
    }

    fn expect(&mut self, terminals: &str, message: &'static str) -> bool {
        if self.matches(terminals) {
            true
        } else {
            self.error(message);
            false
        }
    }

    fn skip_ws(&mut self) {
        loop {
            self.s.consume_while(char::is_whitespace);
            if self.s.sequence("//") {
                self.s.consume_while(|c| c != '\n');
            } else if self.s.sequence("/*") {
                match self.s.rest().find("*/") {
                    Some(offset) => self.s.restore_pos(self.s.pos() + offset as u32 + 2),
                    // an unterminated block comment swallows the rest of the source
                    None => {
                        self.s.skip_to_end();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn skip_after_semicolon(&mut self) {
        self.s.consume_while(|c| c != ';');
        self.s.consume(';');
    }

    fn skip_after_done(&mut self) {
        loop {
            self.s.consume_while(|c| c != 'd');
            if self.s.is_empty() || self.keyword("done") {
                return;
            }
            self.s.next();
        }
    }

    fn skip_to_one_of(&mut self, set: &[char]) {
        self.s.consume_while(|c| !set.contains(&c));
    }

    /// Errors without an explicit span point at the character under the cursor.
    fn error(&self, message: &'static str) {
        let pos = self.s.pos();
        let span = match self.s.peek() {
            Some(c) => Span::new(pos, pos + c.len_utf8() as u32),
            None => Span::at(pos),
        };
        self.err.error_static(span, message);
    }
}
