use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write,
    ops::Index,
};

use cranelift_entity::{entity_impl, EntityRef, PrimaryMap};

use crate::{ast::AstId, grammar::Grammar, node::NodeId};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MemoId(u32);

entity_impl! { MemoId }

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MemoResult {
    Ok {
        /// Consumed bytes.
        length: u32,
        /// AST nodes produced, in input order.
        nodes: Vec<AstId>,
    },
    Err {
        message: String,
        /// Where the failure was detected, may lie past the start of the entry.
        position: u32,
    },
}

/// The outcome of evaluating one grammar node at one input position.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemoEntry {
    pub node: NodeId,
    pub position: u32,
    /// Entries of every child evaluation that was attempted, in evaluation order.
    pub children: Vec<MemoId>,
    pub result: MemoResult,
}

impl MemoEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self.result, MemoResult::Ok { .. })
    }
    pub fn nodes(&self) -> &[AstId] {
        match &self.result {
            MemoResult::Ok { nodes, .. } => nodes,
            MemoResult::Err { .. } => &[],
        }
    }
    pub fn failure(&self) -> Option<(&str, u32)> {
        match &self.result {
            MemoResult::Ok { .. } => None,
            MemoResult::Err { message, position } => Some((message.as_str(), *position)),
        }
    }
}

/// Every memo entry created during one interpretation run, keyed by `(position, node)`.
///
/// Entry ids are handed out in creation order, so a child always has a smaller id than its
/// parent.
#[derive(Clone, Default, Debug)]
pub struct MemoTable {
    entries: PrimaryMap<MemoId, MemoEntry>,
    positions: BTreeMap<u32, HashMap<NodeId, MemoId>>,
}

impl MemoTable {
    pub fn new() -> MemoTable {
        MemoTable::default()
    }

    pub fn get(&self, position: u32, node: NodeId) -> Option<MemoId> {
        self.positions.get(&position)?.get(&node).copied()
    }

    pub(crate) fn insert(&mut self, entry: MemoEntry) -> MemoId {
        let (position, node) = (entry.position, entry.node);
        let id = self.entries.push(entry);
        let previous = self.positions.entry(position).or_default().insert(node, id);
        debug_assert!(previous.is_none(), "Node evaluated twice at one position");
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (MemoId, &MemoEntry)> + '_ {
        self.entries.iter()
    }

    /// Entries grouped by input position, ascending, each group ordered by id.
    pub fn by_position(&self) -> impl Iterator<Item = (u32, Vec<MemoId>)> + '_ {
        self.positions.iter().map(|(&position, nodes)| {
            let mut ids: Vec<MemoId> = nodes.values().copied().collect();
            ids.sort();
            (position, ids)
        })
    }

    /// Follows failed children from `from` towards the most specific failure. At each step the
    /// failed child with the farthest position wins, ties go to the one tried last.
    pub fn failure_trail(&self, from: MemoId) -> Vec<MemoId> {
        let mut trail = vec![from];
        let mut current = from;
        loop {
            let next = self.entries[current]
                .children
                .iter()
                .copied()
                .filter_map(|child| Some((child, self.entries[child].failure()?.1)))
                .max_by_key(|&(_, position)| position);

            match next {
                Some((child, _)) => {
                    trail.push(child);
                    current = child;
                }
                None => return trail,
            }
        }
    }

    pub fn display_entry_into(
        &self,
        buf: &mut dyn Write,
        id: MemoId,
        grammar: &Grammar,
    ) -> std::fmt::Result {
        let entry = &self.entries[id];
        write!(buf, "#{} {} ", id.index(), grammar[entry.node].debug_id())?;
        match &entry.result {
            MemoResult::Ok { length, .. } => write!(buf, "ok length {length}")?,
            MemoResult::Err { message, position } => write!(buf, "error at {position}: {message}")?,
        }
        if !entry.children.is_empty() {
            buf.write_str(" [")?;
            for (i, child) in entry.children.iter().enumerate() {
                if i > 0 {
                    buf.write_char(' ')?;
                }
                write!(buf, "#{}", child.index())?;
            }
            buf.write_char(']')?;
        }
        Ok(())
    }

    pub fn display_into(&self, buf: &mut dyn Write, grammar: &Grammar) -> std::fmt::Result {
        for (position, ids) in self.by_position() {
            writeln!(buf, "@{position}")?;
            for id in ids {
                buf.write_str("  ")?;
                self.display_entry_into(buf, id, grammar)?;
                buf.write_char('\n')?;
            }
        }
        Ok(())
    }
}

impl Index<MemoId> for MemoTable {
    type Output = MemoEntry;
    fn index(&self, index: MemoId) -> &Self::Output {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Builtin;

    fn error(node: Builtin, position: u32, children: Vec<MemoId>, at: u32) -> MemoEntry {
        MemoEntry {
            node: node.node_id(),
            position,
            children,
            result: MemoResult::Err {
                message: format!("failed at {at}"),
                position: at,
            },
        }
    }

    #[test]
    fn lookup_by_position_and_node() {
        let mut memo = MemoTable::new();
        let ok = memo.insert(MemoEntry {
            node: Builtin::Epsilon.node_id(),
            position: 3,
            children: Vec::new(),
            result: MemoResult::Ok {
                length: 0,
                nodes: Vec::new(),
            },
        });
        let err = memo.insert(error(Builtin::Fail, 3, Vec::new(), 3));

        assert_eq!(memo.get(3, Builtin::Epsilon.node_id()), Some(ok));
        assert_eq!(memo.get(3, Builtin::Fail.node_id()), Some(err));
        assert_eq!(memo.get(0, Builtin::Fail.node_id()), None);
        assert!(memo[ok].is_ok());
        assert_eq!(memo[err].failure(), Some(("failed at 3", 3)));
        assert_eq!(memo.by_position().collect::<Vec<_>>(), [(3, vec![ok, err])]);
    }

    #[test]
    fn trail_prefers_farthest_then_last() {
        let mut memo = MemoTable::new();
        let near = memo.insert(error(Builtin::Fail, 0, Vec::new(), 1));
        let far = memo.insert(error(Builtin::AnyChar, 0, Vec::new(), 4));
        let far_later = memo.insert(error(Builtin::EndOfInput, 0, Vec::new(), 4));
        let top = memo.insert(error(Builtin::Whitespace, 0, vec![near, far, far_later], 0));

        assert_eq!(memo.failure_trail(top), [top, far_later]);
        assert_eq!(memo.failure_trail(near), [near]);
    }
}
