//! Deferred tree edits produced by compilation.
//!
//! The compiler never touches the host graph directly. It records what to
//! replace and what to detach; the host applies the set in order with
//! `OpGraph::apply_edits` once compilation of a code unit is complete.

use opjit_common_core::{OpId, OwnerId};

use crate::jit_api::NativeFn;

/// A finalized native function plus the host fragments it calls back into.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub name: String,
    pub entry: NativeFn,
    pub code_size: usize,
    /// Detached fragments run through `opjit_call_runloop`. They become
    /// kids of the native op when the unit is spliced in.
    pub subtrees: Vec<OpId>,
}

#[derive(Debug, Clone)]
pub enum Edit {
    /// Replace the execution range `first..=last` with one native op.
    /// `keep` retains the replaced ops instead of freeing them.
    Replace {
        owner: OwnerId,
        first: OpId,
        last: OpId,
        unit: CompiledUnit,
        keep: bool,
    },
    /// Unlink `root` from its parent and cut the successor links of its
    /// exit ops, so running it from its start stops at its end.
    Detach {
        owner: OwnerId,
        root: OpId,
        keep: bool,
        clear_next: Vec<OpId>,
    },
}

impl Edit {
    pub fn owner(&self) -> OwnerId {
        match self {
            Edit::Replace { owner, .. } | Edit::Detach { owner, .. } => *owner,
        }
    }
}

/// Ordered edits. Later edits may name ops replaced by earlier ones; the
/// graph resolves those through its forwarding table.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn append(&mut self, other: &mut EditSet) {
        self.edits.append(&mut other.edits);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    pub fn replacements(&self) -> impl Iterator<Item = &CompiledUnit> {
        self.edits.iter().filter_map(|e| match e {
            Edit::Replace { unit, .. } => Some(unit),
            Edit::Detach { .. } => None,
        })
    }

    pub fn detach_count(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::Detach { .. }))
            .count()
    }
}

impl IntoIterator for EditSet {
    type Item = Edit;
    type IntoIter = std::vec::IntoIter<Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.into_iter()
    }
}

impl<'a> IntoIterator for &'a EditSet {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}
