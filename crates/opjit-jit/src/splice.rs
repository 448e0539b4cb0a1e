//! Edit recording.
//!
//! A batch records its edits here while it is emitted. Nothing reaches the
//! caller unless the whole batch succeeds; a failed batch drops its
//! `Splicer` together with everything nested emission merged into it.

use opjit_ast::{OpCode, Term, TermKind};
use opjit_common_core::{OpId, OwnerId};
use opjit_runtime::{CompiledUnit, Edit, EditSet};

use crate::error::JitError;

pub(crate) struct Splicer {
    owner: OwnerId,
    edits: EditSet,
}

impl Splicer {
    pub(crate) fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            edits: EditSet::new(),
        }
    }

    /// Merge edits produced by a nested compile.
    pub(crate) fn absorb(&mut self, mut edits: EditSet) {
        self.edits.append(&mut edits);
    }

    /// Unlink `term`'s instructions so they can run as a call-back, and cut
    /// every exit so the fragment stops at its end. Returns the fragment
    /// root.
    pub(crate) fn detach_fragment(&mut self, term: &Term) -> Result<OpId, JitError> {
        let root = origin_root(term)?;
        let clear_next = exit_ops(term)?;
        self.edits.push(Edit::Detach {
            owner: self.owner,
            root,
            keep: true,
            clear_next,
        });
        Ok(root)
    }

    /// Close the batch: replace its span with `unit`.
    pub(crate) fn finish(mut self, span: (OpId, OpId), unit: CompiledUnit) -> EditSet {
        let (first, last) = span;
        self.edits.push(Edit::Replace {
            owner: self.owner,
            first,
            last,
            unit,
            keep: false,
        });
        self.edits
    }
}

fn origin_root(term: &Term) -> Result<OpId, JitError> {
    term.origin
        .map(|o| o.root)
        .ok_or_else(|| JitError::MissingOrigin(describe(term)))
}

fn describe(term: &Term) -> String {
    match &term.kind {
        TermKind::Op(op) => format!("{} op", op.code),
        TermKind::Statement(_) => "statement".into(),
        TermKind::StatementSequence(_) => "statement sequence".into(),
        TermKind::Constant(_) => "constant".into(),
        TermKind::Lexical(_) | TermKind::VariableDeclaration(_) => "variable".into(),
        TermKind::Global(name) => format!("global {name}"),
        _ => "control-flow node".into(),
    }
}

/// Instruction range a run of adjacent roots covers: from the first
/// root's start to the last root's root. Statement markers between the
/// roots fall inside the range.
pub(crate) fn run_span(run: &[&Term]) -> Result<(OpId, OpId), JitError> {
    let (Some(head), Some(tail)) = (run.first(), run.last()) else {
        return Err(JitError::Internal("empty batch".into()));
    };
    let first = head
        .span_first()
        .ok_or_else(|| JitError::MissingOrigin(describe(head)))?;
    let last = tail
        .span_last()
        .ok_or_else(|| JitError::MissingOrigin(describe(tail)))?;
    Ok((first, last))
}

/// Instructions whose successor leaves `term`'s fragment. Usually just
/// the root; conditionals exit from inside their branches.
pub(crate) fn exit_ops(term: &Term) -> Result<Vec<OpId>, JitError> {
    let root = origin_root(term)?;
    let Some(op) = term.as_op() else {
        return Ok(vec![root]);
    };
    match (op.code, &op.kids[..]) {
        (OpCode::Ternary, [_, yes, no]) => {
            let mut exits = exit_ops(yes)?;
            exits.extend(exit_ops(no)?);
            Ok(exits)
        }
        (OpCode::BoolAnd | OpCode::BoolOr, [_, right]) => {
            let mut exits = exit_ops(right)?;
            exits.push(root);
            Ok(exits)
        }
        _ => Ok(vec![root]),
    }
}
