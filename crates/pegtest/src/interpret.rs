//! Packrat evaluation of a [`Grammar`] against an input string.

use cranelift_bitset::CompoundBitSet;

use crate::{
    ast::{AstId, AstNode, SyntaxTree, ROOT_NAME},
    error::{Fatal, LocatedError},
    grammar::{Grammar, AXIOM_RULE_NAME},
    memo::{MemoEntry, MemoId, MemoResult, MemoTable},
    node::{NodeId, NodeKind, RcString},
    span::Span,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InterpretOptions {
    /// Repetition steps and successful rule references allowed in one run.
    pub loop_limit: u32,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            loop_limit: 10_000_000,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParsedInput {
    pub root: AstId,
    /// How far into the input the axiom matched, may fall short of its end.
    pub parsed_to: u32,
}

#[derive(Clone, Debug)]
pub struct InputResult {
    pub tree: SyntaxTree,
    pub memo: MemoTable,
    pub outcome: Result<ParsedInput, LocatedError>,
}

struct Failure {
    message: String,
    position: u32,
}

type Outcome = Result<Vec<AstId>, Failure>;

/// Mutable state of a single interpretation run.
pub struct Interpreter<'a> {
    grammar: &'a Grammar,
    src: &'a str,
    cursor: u32,
    cutting: bool,
    show_terminals: u32,
    guard: Vec<RcString>,
    loop_budget: u32,
    memo: MemoTable,
    tree: SyntaxTree,
}

impl<'a> Interpreter<'a> {
    pub fn new(grammar: &'a Grammar, src: &'a str, options: InterpretOptions) -> Self {
        Self {
            grammar,
            src,
            cursor: 0,
            cutting: false,
            show_terminals: 0,
            guard: Vec::new(),
            loop_budget: options.loop_limit,
            memo: MemoTable::new(),
            tree: SyntaxTree::new(),
        }
    }

    pub fn run(mut self) -> InputResult {
        let outcome = self.interpret();
        match &outcome {
            Ok(parsed) => log::debug!(
                "Parsed input up to {} of {} with {} memo entries",
                parsed.parsed_to,
                self.src.len(),
                self.memo.len()
            ),
            Err(err) => log::debug!("Input rejected: {err}"),
        }

        InputResult {
            tree: self.tree,
            memo: self.memo,
            outcome,
        }
    }

    fn interpret(&mut self) -> Result<ParsedInput, LocatedError> {
        let Some(axiom) = self.grammar.axiom() else {
            return Err(LocatedError {
                message: "Invalid grammar".into(),
                span: Span::at(0),
                node: None,
            });
        };

        self.guard.push(AXIOM_RULE_NAME.into());
        let memo = match self.interpret_node(axiom) {
            Ok(memo) => memo,
            Err(fatal) => {
                let mut err = fatal.into_located();
                err.span = self.input_span(err.span.start());
                return Err(err);
            }
        };

        let entry = &self.memo[memo];
        match &entry.result {
            MemoResult::Ok { nodes, .. } => {
                let root = self.tree.push(AstNode {
                    span: Span::new(0, self.cursor),
                    name: Some(ROOT_NAME.into()),
                    children: Some(nodes.clone()),
                    node: axiom,
                    memo: Some(memo),
                });
                Ok(ParsedInput {
                    root,
                    parsed_to: self.cursor,
                })
            }
            MemoResult::Err { message, .. } => {
                let trail = self.memo.failure_trail(memo);
                let last = &self.memo[*trail.last().unwrap_or(&memo)];
                let position = last.failure().map_or(last.position, |(_, position)| position);
                Err(LocatedError::in_input(
                    message.clone(),
                    self.input_span(position),
                    last.node,
                ))
            }
        }
    }

    /// Evaluates `id` at the cursor, or replays its memoized result. On success the cursor is
    /// past the match, on failure it is where it was.
    pub fn interpret_node(&mut self, id: NodeId) -> Result<MemoId, Fatal> {
        let start = self.cursor;
        if let Some(memo) = self.memo.get(start, id) {
            if let MemoResult::Ok { length, .. } = self.memo[memo].result {
                self.cursor += length;
                if length > 0 {
                    self.guard.clear();
                }
            }
            return Ok(memo);
        }

        let mut children = Vec::new();
        let result = match self.evaluate(id, &mut children)? {
            Ok(nodes) => MemoResult::Ok {
                length: self.cursor - start,
                nodes,
            },
            Err(Failure { message, position }) => {
                self.cursor = start;
                MemoResult::Err { message, position }
            }
        };

        let memo = self.memo.insert(MemoEntry {
            node: id,
            position: start,
            children,
            result,
        });
        for &ast in self.memo[memo].nodes() {
            let node = &mut self.tree[ast];
            if node.memo.is_none() {
                node.memo = Some(memo);
            }
        }
        Ok(memo)
    }

    fn child(&mut self, id: NodeId, children: &mut Vec<MemoId>) -> Result<MemoId, Fatal> {
        let memo = self.interpret_node(id)?;
        children.push(memo);
        Ok(memo)
    }

    fn evaluate(&mut self, id: NodeId, children: &mut Vec<MemoId>) -> Result<Outcome, Fatal> {
        let grammar = self.grammar;
        let start = self.cursor;
        let outcome = match grammar[id].kind() {
            NodeKind::EndOfInput => match self.peek() {
                None => Ok(Vec::new()),
                Some(_) => self.fail("Not at EOF"),
            },
            NodeKind::Epsilon => Ok(Vec::new()),
            NodeKind::AnyChar => match self.peek() {
                Some(c) => Ok(self.consume_char(id, c)),
                None => self.fail("EOF reached"),
            },
            NodeKind::Whitespace => match self.peek() {
                Some(c) if c.is_whitespace() => Ok(self.consume_char(id, c)),
                _ => self.fail("No WS found."),
            },
            NodeKind::Fail => self.fail("Error grammar node"),
            NodeKind::CharSet(set) => match self.peek() {
                None => self.fail("EOF reached"),
                Some(c) if set.matches(c) => Ok(self.consume_char(id, c)),
                Some(_) => self.fail("Character not in set"),
            },
            NodeKind::Literal(text) => self.literal(id, text),
            NodeKind::RuleReference(name) => return self.rule_reference(id, name, children),
            NodeKind::Sequence(members) => {
                let mut nodes = Vec::new();
                for (count, &member) in members.iter().enumerate() {
                    let memo = self.child(member, children)?;
                    let entry = &self.memo[memo];
                    if let Some((message, position)) = entry.failure() {
                        return Ok(Err(Failure {
                            message: format!(
                                "Sequence failed after parsing {count} member(s). {message}"
                            ),
                            position,
                        }));
                    }
                    nodes.extend_from_slice(entry.nodes());
                }
                Ok(nodes)
            }
            NodeKind::OrderedChoice(branches) => {
                let outer = std::mem::replace(&mut self.cutting, false);
                let mut outcome = self.fail("All branches failed.");
                for &branch in branches {
                    let memo = self.child(branch, children)?;
                    if self.memo[memo].is_ok() {
                        outcome = Ok(self.memo[memo].nodes().to_vec());
                        break;
                    }
                    if self.cutting {
                        outcome = self.fail("All branches failed before cut.");
                        break;
                    }
                }
                self.cutting = outer;
                outcome
            }
            &NodeKind::ZeroOrMore { child, separator } => {
                self.repetition(id, child, separator, false, children)?
            }
            &NodeKind::OneOrMore { child, separator } => {
                self.repetition(id, child, separator, true, children)?
            }
            &NodeKind::ZeroOrOne(child) => {
                let memo = self.child(child, children)?;
                Ok(self.memo[memo].nodes().to_vec())
            }
            &NodeKind::Predicate { child, assert } => {
                let memo = self.child(child, children)?;
                self.cursor = start;
                if self.memo[memo].is_ok() == assert {
                    Ok(Vec::new())
                } else {
                    self.fail("Predicate failed")
                }
            }
            NodeKind::Tag { child, name } => {
                let memo = self.child(*child, children)?;
                match self.memo[memo].is_ok() {
                    true => {
                        let nodes = self.memo[memo].nodes().to_vec();
                        let ast = self.tree.push(AstNode {
                            span: Span::new(start, self.cursor),
                            name: Some(name.clone()),
                            children: Some(nodes),
                            node: id,
                            memo: None,
                        });
                        Ok(vec![ast])
                    }
                    false => self.fail("Tag expression failed"),
                }
            }
            &NodeKind::ShowTerminals(child) => {
                self.show_terminals += 1;
                let memo = self.child(child, children)?;
                self.show_terminals -= 1;
                match self.memo[memo].is_ok() {
                    true => Ok(self.memo[memo].nodes().to_vec()),
                    false => self.fail("Terminal expression failed"),
                }
            }
            &NodeKind::Cut(child) => {
                let memo = self.child(child, children)?;
                match self.memo[memo].is_ok() {
                    true => {
                        self.cutting = true;
                        Ok(self.memo[memo].nodes().to_vec())
                    }
                    false => self.fail("Cut inner expression failed"),
                }
            }
            NodeKind::Permutation {
                children: members,
                separator,
                exhaustive,
            } => self.permutation(members, *separator, *exhaustive, children)?,
        };
        Ok(outcome)
    }

    fn rule_reference(
        &mut self,
        id: NodeId,
        name: &RcString,
        children: &mut Vec<MemoId>,
    ) -> Result<Outcome, Fatal> {
        let Some(body) = self.grammar.resolve(name) else {
            return Ok(self.fail(format!("Rule '{name}' not found.")));
        };

        if self.guard.contains(name) {
            let rules: Vec<String> = self.guard.iter().map(|rule| rule.to_string()).collect();
            log::warn!("Left recursion through {rules:?} at {}", self.cursor);
            return Err(Fatal::LeftRecursion {
                rules,
                node: id,
                position: self.cursor,
            });
        }

        log::trace!("Entering rule '{name}' at {}", self.cursor);
        self.guard.push(name.clone());
        let memo = self.child(body, children)?;
        self.guard.retain(|rule| rule != name);

        let entry = &self.memo[memo];
        if let Some((message, position)) = entry.failure() {
            return Ok(Err(Failure {
                message: format!("Rule '{name}' failed. {message}"),
                position,
            }));
        }
        let nodes = entry.nodes().to_vec();
        self.tick(id)?;
        Ok(Ok(nodes))
    }

    fn literal(&mut self, id: NodeId, text: &str) -> Outcome {
        for expected in text.chars() {
            match self.peek() {
                Some(c) if c == expected => self.cursor += c.len_utf8() as u32,
                Some(_) => {
                    return Err(Failure {
                        message: format!("Mismatch of character {expected}"),
                        position: self.cursor,
                    })
                }
                None => {
                    return Err(Failure {
                        message: "EOF reached".into(),
                        position: self.cursor,
                    })
                }
            }
        }
        self.guard.clear();
        Ok(self.terminal(id, self.cursor - text.len() as u32))
    }

    fn repetition(
        &mut self,
        id: NodeId,
        child: NodeId,
        separator: Option<NodeId>,
        mandatory: bool,
        children: &mut Vec<MemoId>,
    ) -> Result<Outcome, Fatal> {
        let mut nodes = Vec::new();
        let mut count = 0;
        loop {
            let before = self.cursor;
            let mark = nodes.len();
            if let Some(separator) = separator.filter(|_| count > 0) {
                let memo = self.child(separator, children)?;
                if !self.memo[memo].is_ok() {
                    break;
                }
                nodes.extend_from_slice(self.memo[memo].nodes());
            }

            let memo = self.child(child, children)?;
            if !self.memo[memo].is_ok() {
                // `+` gives a trailing separator back, `*` keeps it
                if mandatory {
                    self.cursor = before;
                    nodes.truncate(mark);
                    if count == 0 {
                        return Ok(self.fail("Mandatory match failed"));
                    }
                }
                break;
            }
            nodes.extend_from_slice(self.memo[memo].nodes());
            count += 1;
            self.tick(id)?;
        }
        Ok(Ok(nodes))
    }

    fn permutation(
        &mut self,
        members: &[NodeId],
        separator: Option<NodeId>,
        exhaustive: bool,
        children: &mut Vec<MemoId>,
    ) -> Result<Outcome, Fatal> {
        let mut remaining = CompoundBitSet::new();
        for i in 0..members.len() {
            remaining.insert(i);
        }

        let mut nodes = Vec::new();
        while !remaining.is_empty() {
            if let Some(separator) = separator.filter(|_| remaining.len() < members.len()) {
                let memo = self.child(separator, children)?;
                if !self.memo[memo].is_ok() {
                    break;
                }
                nodes.extend_from_slice(self.memo[memo].nodes());
            }

            let mut productive = false;
            for (i, &member) in members.iter().enumerate() {
                if !remaining.contains(i) {
                    continue;
                }
                let memo = self.child(member, children)?;
                if self.memo[memo].is_ok() {
                    remaining.remove(i);
                    productive = true;
                    nodes.extend_from_slice(self.memo[memo].nodes());
                }
            }

            if !productive {
                break;
            }
        }

        let complete = match exhaustive {
            true => remaining.is_empty(),
            false => remaining.len() < members.len(),
        };
        Ok(match (complete, exhaustive) {
            (true, _) => Ok(nodes),
            (false, true) => self.fail("Missing permutation elements"),
            (false, false) => self.fail("Missing optional elements"),
        })
    }

    fn tick(&mut self, id: NodeId) -> Result<(), Fatal> {
        self.loop_budget = self.loop_budget.saturating_sub(1);
        if self.loop_budget == 0 {
            log::warn!("Loop limit exhausted at {}", self.cursor);
            return Err(Fatal::LoopLimit {
                node: id,
                position: self.cursor,
            });
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.src[self.cursor as usize..].chars().next()
    }

    fn consume_char(&mut self, id: NodeId, c: char) -> Vec<AstId> {
        let start = self.cursor;
        self.cursor += c.len_utf8() as u32;
        self.guard.clear();
        self.terminal(id, start)
    }

    fn terminal(&mut self, id: NodeId, start: u32) -> Vec<AstId> {
        if self.show_terminals == 0 {
            return Vec::new();
        }
        let ast = self.tree.push(AstNode {
            span: Span::new(start, self.cursor),
            name: None,
            children: None,
            node: id,
            memo: None,
        });
        vec![ast]
    }

    fn fail(&self, message: impl Into<String>) -> Outcome {
        Err(Failure {
            message: message.into(),
            position: self.cursor,
        })
    }

    /// One character wide, empty at the end of the input.
    fn input_span(&self, position: u32) -> Span {
        match self.src.get(position as usize..).and_then(|rest| rest.chars().next()) {
            Some(c) => Span::new(position, position + c.len_utf8() as u32),
            None => Span::at(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_grammar, parse_input, parse_input_with};

    fn run(grammar: &str, input: &str) -> (Grammar, InputResult) {
        let grammar = parse_grammar(grammar).unwrap();
        let result = parse_input(&grammar, input);
        (grammar, result)
    }

    fn parsed_to(grammar: &str, input: &str) -> Option<u32> {
        let (_, result) = run(grammar, input);
        result.outcome.ok().map(|parsed| parsed.parsed_to)
    }

    fn find(grammar: &Grammar, predicate: impl Fn(&NodeKind) -> bool) -> NodeId {
        grammar
            .nodes()
            .find(|(_, node)| predicate(node.kind()))
            .map(|(id, _)| id)
            .unwrap()
    }

    fn literal(text: &'static str) -> impl Fn(&NodeKind) -> bool {
        move |kind| matches!(kind, NodeKind::Literal(t) if &**t == text)
    }

    #[test]
    fn optional_is_greedy() {
        let (grammar, result) = run("start = [ab]? [bc] [cd];", "bc");
        let err = result.outcome.unwrap_err();
        assert_eq!(
            err.message,
            "Sequence failed after parsing 2 member(s). EOF reached"
        );
        assert_eq!(err.span, Span::at(2));
        assert!(matches!(grammar[err.node.unwrap()].kind(), NodeKind::CharSet(_)));
    }

    #[test]
    fn cut_commits_choice() {
        let src = r#"start := "[" , "a" / "(" "a" ")" / "z";"#;
        let (grammar, result) = run(src, "[b");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Tag expression failed");
        assert_eq!(err.span, Span::new(1, 2));
        assert_eq!(err.node, Some(find(&grammar, literal("a"))));

        let choice = result
            .memo
            .entries()
            .find(|(_, entry)| matches!(grammar[entry.node].kind(), NodeKind::OrderedChoice(_)))
            .map(|(_, entry)| entry)
            .unwrap();
        assert_eq!(
            choice.failure(),
            Some(("All branches failed before cut.", 0))
        );
        assert_eq!(choice.children.len(), 1);
        assert_eq!(result.memo.get(0, find(&grammar, literal("("))), None);
        assert_eq!(result.memo.get(0, find(&grammar, literal("z"))), None);

        assert_eq!(parsed_to(src, "z"), Some(1));
        assert_eq!(parsed_to(src, "(a)"), Some(3));
    }

    #[test]
    fn left_recursion_when_exercised() {
        let src = r#"start := start "," "a" / "a";"#;
        let (grammar, result) = run(src, "a,a");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Left recursion detected in rules: start");
        assert_eq!(err.span, Span::new(0, 1));
        assert!(matches!(
            grammar[err.node.unwrap()].kind(),
            NodeKind::RuleReference(name) if &**name == "start"
        ));

        let unused = r#"start := "a" ("," "a")*; list := list "," "a" / "a";"#;
        assert_eq!(parsed_to(unused, "a,a"), Some(3));
        assert_eq!(parsed_to(r#"start := "(" start ")" / "a";"#, "((a))"), Some(5));
        assert_eq!(parsed_to("start = a a b; a = EPSILON; b = \"x\";", "x"), Some(1));
    }

    #[test]
    fn left_recursion_names_every_guarded_rule() {
        let (_, result) = run("start = a; a = b \"x\"; b = a / \"y\";", "yx");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Left recursion detected in rules: start, a, b");
    }

    #[test]
    fn permutations() {
        let src = r#"start := "a" ^ "b" ^ "c";"#;
        for input in ["abc", "bca", "cab"] {
            assert_eq!(parsed_to(src, input), Some(3), "{input}");
        }
        assert_eq!(parsed_to(src, "ab"), None);

        let src = r#"start := "a" . "b" . "c";"#;
        assert_eq!(parsed_to(src, "a"), Some(1));
        assert_eq!(parsed_to(src, "cb"), Some(2));
        assert_eq!(parsed_to(src, ""), None);

        let (grammar, result) = run(src, "x");
        let permutation = find(&grammar, |kind| matches!(kind, NodeKind::Permutation { .. }));
        let entry = &result.memo[result.memo.get(0, permutation).unwrap()];
        assert_eq!(entry.failure(), Some(("Missing optional elements", 0)));
    }

    #[test]
    fn separated_options_keep_trailing_separator() {
        assert_eq!(parsed_to(r#"start = "a" ^ "b" % ",";"#, "b,a"), Some(3));
        assert_eq!(parsed_to(r#"start = "a" ^ "b" % ",";"#, "b,"), None);
        assert_eq!(parsed_to(r#"start = "a" . "b" % ",";"#, "b,"), Some(2));
        assert_eq!(parsed_to(r#"start = ("a" . "b" % ",") ";";"#, "b,;"), Some(3));
    }

    #[test]
    fn tags_wrap_their_match() {
        let (_, result) = run(r#"start = <x>"a"</x> "b";"#, "ab");
        let parsed = result.outcome.unwrap();
        let root = &result.tree[parsed.root];
        assert_eq!(root.name.as_deref(), Some("ROOT"));
        assert_eq!(root.span, Span::new(0, 2));
        assert_eq!(root.children().len(), 1);
        let x = &result.tree[root.children()[0]];
        assert_eq!(x.name.as_deref(), Some("x"));
        assert_eq!(x.span, Span::new(0, 1));

        let (grammar, result) = run(r#"start := <x>"a"</x> "b";"#, "ab");
        let parsed = result.outcome.unwrap();
        let shape = result.tree.shape(parsed.root);
        let start = &shape.children.unwrap()[0];
        assert_eq!(start.name.as_deref(), Some("start"));
        assert_eq!(start.span, Span::new(0, 2));
        let inner = start.children.as_ref().unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].name.as_deref(), Some("x"));
        assert_eq!(inner[0].span, Span::new(0, 1));

        let root = &result.tree[parsed.root];
        assert_eq!(root.memo, result.memo.get(0, grammar.axiom().unwrap()));
        let tag = &result.tree[root.children()[0]];
        assert_eq!(result.memo[tag.memo.unwrap()].node, tag.node);
    }

    #[test]
    fn separated_repetition() {
        let src = r#"start := "a"+ % ",";"#;
        assert_eq!(parsed_to(src, "a,a,a"), Some(5));
        assert_eq!(parsed_to(src, "a,a,a,"), Some(5));
        assert_eq!(parsed_to(r#"start = "a"+ % "," EOF;"#, "a,a,"), None);
        assert_eq!(parsed_to(r#"start = "a"* % ",";"#, ""), Some(0));
        assert_eq!(parsed_to(r#"start = "a"* % ",";"#, ",a"), Some(0));
    }

    #[test]
    fn zero_or_more_keeps_trailing_separator() {
        assert_eq!(parsed_to(r#"start = "a"* % ",";"#, "a,"), Some(2));
        assert_eq!(parsed_to(r#"start = "a"* % "," ";";"#, "a,;"), Some(3));
        assert_eq!(parsed_to(r#"start = "a"* % "," ";";"#, "a,a,;"), Some(5));
        assert_eq!(parsed_to(r#"start = "a"+ % "," ";";"#, "a,;"), None);
    }

    #[test]
    fn memo_hits_are_replayed_verbatim() {
        // the cut inside `c` fired while evaluating the predicate, the replay commits nothing
        let src = r#"start = &c (c "x" / "a" "y"); c = "a" ,;"#;
        assert_eq!(parsed_to(src, "ay"), Some(2));

        assert_eq!(parsed_to(r#"start = c "x" / "a" "y"; c = "a" ,;"#, "ay"), None);
    }

    #[test]
    fn mandatory_repetition() {
        let (_, result) = run(r#"start = "a"+;"#, "b");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Mandatory match failed");
        assert_eq!(err.span, Span::new(0, 1));
    }

    #[test]
    fn terminals_are_shown_on_request() {
        let (grammar, result) = run(r#"start = {"ab" [c-d] ANY} "e" ANY;"#, "abcdef");
        let parsed = result.outcome.unwrap();
        assert_eq!(parsed.parsed_to, 6);

        let root = &result.tree[parsed.root];
        let texts: Vec<&str> = root
            .children()
            .iter()
            .map(|&child| result.tree[child].text("abcdef"))
            .collect();
        assert_eq!(texts, ["ab", "c", "d"]);
        for &child in root.children() {
            let terminal = &result.tree[child];
            assert!(terminal.is_terminal());
            assert_eq!(result.memo[terminal.memo.unwrap()].node, terminal.node);
        }
        assert_eq!(result.tree[root.children()[0]].node, find(&grammar, literal("ab")));
    }

    #[test]
    fn predicates_do_not_consume() {
        let src = r#"start = &"a" "a" !"b" ANY;"#;
        assert_eq!(parsed_to(src, "ac"), Some(2));
        assert_eq!(parsed_to(src, "ab"), None);

        let (_, result) = run(r#"start = !"a";"#, "a");
        assert_eq!(result.outcome.unwrap_err().message, "Predicate failed");
    }

    #[test]
    fn loop_limit() {
        let grammar = parse_grammar("start = EPSILON*;").unwrap();
        let result = parse_input_with(&grammar, "", InterpretOptions { loop_limit: 100 });
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Loop count exceeded limit.");
        assert_eq!(err.span, Span::at(0));
        assert_eq!(err.node, grammar.axiom());

        let input = "a".repeat(1000);
        assert_eq!(parsed_to(r#"start = "a"*;"#, &input), Some(1000));
    }

    #[test]
    fn invalid_grammar() {
        let result = parse_input(&Grammar::default(), "x");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Invalid grammar");
        assert_eq!(err.node, None);
        assert!(err.is_grammar_error());
        assert_eq!(err.span, Span::at(0));
        assert!(result.memo.is_empty());
    }

    #[test]
    fn literal_mismatch_position() {
        let (grammar, result) = run(r#"start = "abc";"#, "abd");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "Mismatch of character c");
        assert_eq!(err.span, Span::new(2, 3));
        assert_eq!(err.node, grammar.axiom());

        let (_, result) = run("start = item EOF; item = \"x\";", "y");
        let err = result.outcome.unwrap_err();
        assert_eq!(
            err.message,
            "Sequence failed after parsing 0 member(s). Rule 'item' failed. Mismatch of character x"
        );
        assert_eq!(err.span, Span::new(0, 1));

        let (_, result) = run(r#"start = "a" EOF;"#, "ab");
        assert_eq!(
            result.outcome.unwrap_err().message,
            "Sequence failed after parsing 1 member(s). Not at EOF"
        );
    }

    #[test]
    fn builtins() {
        assert_eq!(parsed_to(r#"start = "a" WS+ "b" EOF;"#, "a \t\nb"), Some(5));
        assert_eq!(parsed_to("start = ANY ANY EOF;", "žx"), Some(3));
        assert_eq!(parsed_to("start = ERROR / EPSILON;", "x"), Some(0));
        assert_eq!(parsed_to("start = [α-ω]+ EOF;", "αβγ"), Some(6));
        assert_eq!(parsed_to("start = [^a]+;", "bca"), Some(2));
    }

    #[test]
    fn choice_keeps_every_attempt() {
        let (grammar, result) = run(r#"start = "a" / "b" / "c";"#, "c");
        let entry = &result.memo[result.memo.get(0, grammar.axiom().unwrap()).unwrap()];
        assert!(entry.is_ok());
        assert_eq!(entry.children.len(), 3);
    }

    #[test]
    fn memo_is_keyed_by_node_identity() {
        let (grammar, result) = run(r#"start = a "x" / a "y"; a = "q";"#, "qy");
        assert_eq!(result.outcome.unwrap().parsed_to, 2);

        let q = find(&grammar, literal("q"));
        let evaluations = result.memo.entries().filter(|(_, e)| e.node == q).count();
        assert_eq!(evaluations, 1);

        let references = result
            .memo
            .entries()
            .filter(|(_, e)| matches!(grammar[e.node].kind(), NodeKind::RuleReference(_)))
            .count();
        assert_eq!(references, 2);
    }

    #[test]
    fn failure_trail_reaches_the_farthest_failure() {
        let src = r#"start = pair / "z"; pair = "(" "a" ")";"#;
        let (grammar, result) = run(src, "(a]");
        let err = result.outcome.unwrap_err();
        assert_eq!(err.message, "All branches failed.");
        assert_eq!(err.span, Span::new(2, 3));
        assert_eq!(err.node, Some(find(&grammar, literal(")"))));

        let top = result.memo.get(0, grammar.axiom().unwrap()).unwrap();
        let trail = result.memo.failure_trail(top);
        let labels: Vec<&str> = trail
            .iter()
            .map(|&id| grammar[result.memo[id].node].debug_id())
            .collect();
        assert_eq!(labels.len(), 4);
        assert!(labels[0].starts_with("Branch"));
        assert!(labels[1].starts_with("RuleUse 'pair'"));
        assert!(labels[2].starts_with("Sequence"));
        assert!(labels[3].starts_with("String"));
    }
}
