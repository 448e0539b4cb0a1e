//! Reference host instruction graph.
//!
//! Ops live in one arena per code unit and are addressed by `OpId`. Each op
//! has structural links (parent/kids) and execution links (`next`, plus
//! `other` for the taken branch of conditionals). `link` derives the
//! execution links from structure; edits rewrite both.

use rustc_hash::FxHashMap;

use opjit_common_core::{OpId, OwnerId, PadIndex};

use crate::edit::{CompiledUnit, Edit, EditSet};
use crate::error::RuntimeError;
use crate::jit_api::NativeFn;
use crate::scalar::Scalar;

// =============================================================================
// HostOp
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Subtract => "subtract",
            ArithOp::Multiply => "multiply",
            ArithOp::Divide => "divide",
            ArithOp::Modulo => "modulo",
        }
    }

    /// Division follows IEEE semantics; only modulo rejects a zero divisor.
    pub fn apply(self, l: f64, r: f64) -> Result<f64, RuntimeError> {
        Ok(match self {
            ArithOp::Add => l + r,
            ArithOp::Subtract => l - r,
            ArithOp::Multiply => l * r,
            ArithOp::Divide => l / r,
            ArithOp::Modulo => {
                let (l, r) = (l as i64, r as i64);
                if r == 0 {
                    return Err(RuntimeError::IllegalModulus);
                }
                // Result takes the sign of the right operand.
                let m = l % r;
                if m != 0 && (m < 0) != (r < 0) {
                    (m + r) as f64
                } else {
                    m as f64
                }
            }
        })
    }
}

/// A spliced-in compiled unit.
#[derive(Debug, Clone)]
pub struct NativeOp {
    pub name: String,
    pub entry: NativeFn,
    pub code_size: usize,
}

#[derive(Debug, Clone)]
pub enum HostOpKind {
    Const(Scalar),
    /// Push a pad slot. `intro` (`my $x`) saves and clears it first.
    PadSv { slot: PadIndex, intro: bool },
    Arith(ArithOp),
    Negate,
    /// Pops the value, then the target box; copies and pushes the target.
    Sassign,
    And,
    Or,
    CondExpr,
    /// Statement boundary: resets the stack and frees temporaries.
    Nextstate,
    /// Statement list. Structural only, never executed when it has kids.
    LineSeq,
    Stub,
    Native(NativeOp),
}

impl HostOpKind {
    pub fn name(&self) -> &str {
        match self {
            HostOpKind::Const(_) => "const",
            HostOpKind::PadSv { .. } => "padsv",
            HostOpKind::Arith(a) => a.name(),
            HostOpKind::Negate => "negate",
            HostOpKind::Sassign => "sassign",
            HostOpKind::And => "and",
            HostOpKind::Or => "or",
            HostOpKind::CondExpr => "cond_expr",
            HostOpKind::Nextstate => "nextstate",
            HostOpKind::LineSeq => "lineseq",
            HostOpKind::Stub => "stub",
            HostOpKind::Native(n) => &n.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpState {
    #[default]
    Live,
    /// Unlinked from the tree but retained (call-back fragments).
    Detached,
    /// Replaced and unreachable.
    Dead,
}

#[derive(Debug, Clone)]
pub struct HostOp {
    pub kind: HostOpKind,
    pub next: Option<OpId>,
    pub other: Option<OpId>,
    /// Parent at the time the op was attached. Detaching a subtree keeps
    /// its root's parent so later edits can still locate its old position.
    pub parent: Option<OpId>,
    pub kids: Vec<OpId>,
    pub targ: Option<PadIndex>,
    /// Assignment form: the result is stored into the left operand.
    pub stacked: bool,
    pub state: OpState,
}

impl HostOp {
    pub fn new(kind: HostOpKind) -> Self {
        Self {
            kind,
            next: None,
            other: None,
            parent: None,
            kids: Vec::new(),
            targ: None,
            stacked: false,
            state: OpState::Live,
        }
    }

    pub fn with_kids(mut self, kids: Vec<OpId>) -> Self {
        self.kids = kids;
        self
    }

    pub fn with_targ(mut self, targ: PadIndex) -> Self {
        self.targ = Some(targ);
        self
    }

    pub fn stacked(mut self) -> Self {
        self.stacked = true;
        self
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, HostOpKind::Native(_))
    }
}

// =============================================================================
// OpGraph
// =============================================================================

#[derive(Debug)]
pub struct OpGraph {
    owner: OwnerId,
    ops: Vec<HostOp>,
    root: Option<OpId>,
    entry: Option<OpId>,
    /// Replaced boundary op -> the native op that took its place.
    forward: FxHashMap<OpId, OpId>,
}

impl OpGraph {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            ops: Vec::new(),
            root: None,
            entry: None,
            forward: FxHashMap::default(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn root(&self) -> Option<OpId> {
        self.root
    }

    pub fn entry(&self) -> Option<OpId> {
        self.entry
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Add an op, adopting its kids.
    pub fn add(&mut self, op: HostOp) -> OpId {
        let id = OpId(self.ops.len() as u32);
        for &kid in &op.kids {
            if let Some(k) = self.ops.get_mut(kid.index()) {
                k.parent = Some(id);
            }
        }
        self.ops.push(op);
        id
    }

    pub fn get(&self, id: OpId) -> Option<&HostOp> {
        self.ops.get(id.index())
    }

    pub fn op(&self, id: OpId) -> Result<&HostOp, RuntimeError> {
        self.ops.get(id.index()).ok_or(RuntimeError::UnknownOp(id))
    }

    fn op_mut(&mut self, id: OpId) -> Result<&mut HostOp, RuntimeError> {
        self.ops.get_mut(id.index()).ok_or(RuntimeError::UnknownOp(id))
    }

    pub fn is_dead(&self, id: OpId) -> bool {
        self.get(id).map_or(true, |op| op.state == OpState::Dead)
    }

    /// Follow replacement forwarding to the op currently standing for `id`.
    pub fn resolve(&self, mut id: OpId) -> OpId {
        while let Some(&to) = self.forward.get(&id) {
            if to == id {
                break;
            }
            id = to;
        }
        id
    }

    /// Make `root` the graph root and derive execution links for its
    /// subtree. Returns the entry op.
    pub fn link(&mut self, root: OpId) -> Result<OpId, RuntimeError> {
        self.op(root)?;
        let entry = self.link_op(root, None)?;
        self.root = Some(root);
        self.entry = Some(entry);
        Ok(entry)
    }

    /// Link `id` so that it continues at `cont`; returns its first op.
    fn link_op(&mut self, id: OpId, cont: Option<OpId>) -> Result<OpId, RuntimeError> {
        let op = self.op(id)?;
        let kids = op.kids.clone();
        match op.kind {
            HostOpKind::LineSeq => {
                self.op_mut(id)?.next = cont;
                let mut c = cont;
                for &kid in kids.iter().rev() {
                    c = Some(self.link_op(kid, c)?);
                }
                Ok(if kids.is_empty() { id } else { c.unwrap_or(id) })
            }
            HostOpKind::And | HostOpKind::Or => {
                let [left, right] = kids[..] else {
                    return Err(RuntimeError::NotExecutable(id));
                };
                let other = self.link_op(right, cont)?;
                let op = self.op_mut(id)?;
                op.next = cont;
                op.other = Some(other);
                self.link_op(left, Some(id))
            }
            HostOpKind::CondExpr => {
                let [cond, yes, no] = kids[..] else {
                    return Err(RuntimeError::NotExecutable(id));
                };
                let other = self.link_op(yes, cont)?;
                let next = self.link_op(no, cont)?;
                let op = self.op_mut(id)?;
                op.next = Some(next);
                op.other = Some(other);
                self.link_op(cond, Some(id))
            }
            HostOpKind::Native(_) => {
                self.op_mut(id)?.next = cont;
                Ok(id)
            }
            _ => {
                self.op_mut(id)?.next = cont;
                let mut c = id;
                for &kid in kids.iter().rev() {
                    c = self.link_op(kid, Some(c))?;
                }
                Ok(c)
            }
        }
    }

    /// First op executed when `id`'s subtree runs. Computed from the
    /// current structure, so it sees native ops spliced in after `link`.
    pub fn start_of(&self, id: OpId) -> OpId {
        match self.get(id) {
            Some(op) if !op.is_native() => match op.kids.first() {
                Some(&first) => self.start_of(first),
                None => id,
            },
            _ => id,
        }
    }

    /// Ops reachable from the entry by following `next` links.
    pub fn exec_order(&self) -> Vec<OpId> {
        let mut order = Vec::new();
        let mut cur = self.entry;
        while let Some(id) = cur {
            if order.len() > self.ops.len() {
                break;
            }
            order.push(id);
            cur = self.get(id).and_then(|op| op.next);
        }
        order
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Apply edits in order. Returns the ids of the native ops created.
    /// Edits before a failing one stay applied.
    pub fn apply_edits(&mut self, edits: EditSet) -> Result<Vec<OpId>, RuntimeError> {
        let mut created = Vec::new();
        for edit in edits {
            if edit.owner() != self.owner {
                return Err(RuntimeError::OwnerMismatch {
                    expected: self.owner,
                    found: edit.owner(),
                });
            }
            match edit {
                Edit::Replace {
                    first,
                    last,
                    unit,
                    keep,
                    ..
                } => created.push(self.replace(first, last, unit, keep)?),
                Edit::Detach {
                    root,
                    keep,
                    clear_next,
                    ..
                } => self.detach(root, keep, &clear_next)?,
            }
        }
        Ok(created)
    }

    fn replace(
        &mut self,
        first: OpId,
        last: OpId,
        unit: CompiledUnit,
        keep: bool,
    ) -> Result<OpId, RuntimeError> {
        let entry_first = self.resolve(first);
        let last = self.resolve(last);
        let last_op = self.op(last)?;
        let (cont, parent) = (last_op.next, last_op.parent);

        // Structural range starts at the sibling of `last` that contains
        // `first`. Walk the original op, whose parent links survive edits.
        let mut top = first;
        while self.op(top)?.parent != parent {
            top = self
                .op(top)?
                .parent
                .ok_or(RuntimeError::NotContiguous { first, last })?;
        }

        tracing::trace!(unit = %unit.name, %first, %last, "replace");
        let mut native = HostOp::new(HostOpKind::Native(NativeOp {
            name: unit.name,
            entry: unit.entry,
            code_size: unit.code_size,
        }));
        native.next = cont;
        native.parent = parent;
        let new = OpId(self.ops.len() as u32);
        self.ops.push(native);

        let removed: Vec<OpId> = match parent {
            Some(p) => {
                let kids = &mut self.op_mut(p)?.kids;
                let i = kids.iter().position(|&k| k == top);
                let j = kids.iter().position(|&k| k == last);
                match (i, j) {
                    (Some(i), Some(j)) if i <= j => kids.splice(i..=j, [new]).collect(),
                    _ => return Err(RuntimeError::NotContiguous { first, last }),
                }
            }
            None => {
                if top != last {
                    return Err(RuntimeError::NotContiguous { first, last });
                }
                if self.root == Some(last) {
                    self.root = Some(new);
                }
                vec![last]
            }
        };
        let state = if keep { OpState::Detached } else { OpState::Dead };
        for r in removed {
            self.mark(r, state);
        }

        for fragment in unit.subtrees {
            let fragment = self.resolve(fragment);
            self.op_mut(fragment)?.parent = Some(new);
            self.op_mut(new)?.kids.push(fragment);
        }

        for (i, op) in self.ops.iter_mut().enumerate() {
            if i == new.index() || op.state == OpState::Dead {
                continue;
            }
            if op.next == Some(entry_first) {
                op.next = Some(new);
            }
            if op.other == Some(entry_first) {
                op.other = Some(new);
            }
        }
        if self.entry == Some(entry_first) {
            self.entry = Some(new);
        }

        self.forward.insert(first, new);
        self.forward.insert(last, new);
        if entry_first != first {
            self.forward.insert(entry_first, new);
        }
        Ok(new)
    }

    fn detach(&mut self, root: OpId, keep: bool, clear_next: &[OpId]) -> Result<(), RuntimeError> {
        let root = self.resolve(root);
        if let Some(p) = self.op(root)?.parent {
            self.op_mut(p)?.kids.retain(|&k| k != root);
        }
        if self.root == Some(root) {
            self.root = None;
        }
        if keep {
            self.op_mut(root)?.state = OpState::Detached;
        } else {
            self.mark(root, OpState::Dead);
        }
        for &exit in clear_next {
            let exit = self.resolve(exit);
            self.op_mut(exit)?.next = None;
        }
        tracing::trace!(%root, exits = clear_next.len(), "detach");
        Ok(())
    }

    fn mark(&mut self, root: OpId, state: OpState) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(op) = self.ops.get_mut(id.index()) {
                op.state = state;
                stack.extend(op.kids.iter().copied());
            }
        }
    }
}
