//! Reference dispatch loop.
//!
//! The value stack holds raw pointers to boxes owned by the pad or the
//! mortal area. Boxes are heap-allocated and never moved, so a pointer stays
//! valid until its owner frees it: pad boxes live as long as the `Interp`,
//! mortals until the next statement boundary of the loop that created them.

use opjit_common_core::{OpId, PadIndex};

use crate::edit::EditSet;
use crate::error::RuntimeError;
use crate::graph::{HostOpKind, OpGraph};
use crate::scalar::Scalar;

/// Dynamic state of an enclosing dispatch loop, saved across a call-back.
pub(crate) struct Frame {
    current: Option<OpId>,
    stack_floor: usize,
    tmps_floor: usize,
}

pub struct Interp {
    graph: OpGraph,
    pad: Vec<Box<Scalar>>,
    stack: Vec<*mut Scalar>,
    mortals: Vec<Box<Scalar>>,
    /// Slot values saved by `my` declarations; restored on unwind.
    savestack: Vec<(PadIndex, Scalar)>,
    stack_floor: usize,
    tmps_floor: usize,
    /// Native op currently executing.
    current: Option<OpId>,
    fault: Option<RuntimeError>,
}

impl Interp {
    pub fn new(graph: OpGraph, pad_size: usize) -> Self {
        Self {
            graph,
            pad: (0..pad_size).map(|_| Box::default()).collect(),
            stack: Vec::new(),
            mortals: Vec::new(),
            savestack: Vec::new(),
            stack_floor: 0,
            tmps_floor: 0,
            current: None,
            fault: None,
        }
    }

    pub fn graph(&self) -> &OpGraph {
        &self.graph
    }

    pub fn apply_edits(&mut self, edits: EditSet) -> Result<Vec<OpId>, RuntimeError> {
        self.graph.apply_edits(edits)
    }

    pub fn pad(&self, slot: PadIndex) -> Option<&Scalar> {
        self.pad.get(slot.index()).map(|b| &**b)
    }

    pub fn set_pad(&mut self, slot: PadIndex, value: Scalar) -> Result<(), RuntimeError> {
        let sv = self
            .pad
            .get_mut(slot.index())
            .ok_or(RuntimeError::BadPadSlot(slot))?;
        **sv = value;
        Ok(())
    }

    /// Copies of the values left on the stack, bottom first.
    pub fn stack_values(&self) -> Vec<Scalar> {
        // SAFETY: every stack entry points at a live pad box or mortal.
        self.stack.iter().map(|&sv| unsafe { (*sv).clone() }).collect()
    }

    /// Run the graph from its entry to completion.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let entry = self.graph.entry().ok_or(RuntimeError::NotLinked)?;
        self.stack.clear();
        self.mortals.clear();
        self.stack_floor = 0;
        self.tmps_floor = 0;
        self.fault = None;
        let saves = self.savestack.len();

        // SAFETY: `self` outlives the loop and nothing else aliases it.
        unsafe { runloop(self, entry) };
        self.current = None;

        match self.fault.take() {
            Some(err) => {
                self.unwind(saves);
                Err(err)
            }
            None => {
                self.savestack.truncate(saves);
                Ok(())
            }
        }
    }

    fn unwind(&mut self, floor: usize) {
        while self.savestack.len() > floor {
            let Some((slot, value)) = self.savestack.pop() else {
                break;
            };
            if let Some(sv) = self.pad.get_mut(slot.index()) {
                **sv = value;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Primitives shared with the runtime ABI
    // -------------------------------------------------------------------------

    /// Record a fault. The first one wins; the dispatch loop stops at the
    /// next op boundary.
    pub(crate) fn fail(&mut self, err: RuntimeError) {
        if self.fault.is_none() {
            tracing::warn!(%err, op = ?self.current, "runtime fault");
            self.fault = Some(err);
        }
    }

    pub(crate) fn pad_slot(&mut self, slot: PadIndex) -> Result<*mut Scalar, RuntimeError> {
        self.pad
            .get_mut(slot.index())
            .map(|b| &mut **b as *mut Scalar)
            .ok_or(RuntimeError::BadPadSlot(slot))
    }

    pub(crate) fn save_clearsv(&mut self, slot: PadIndex) -> Result<(), RuntimeError> {
        let sv = self
            .pad
            .get_mut(slot.index())
            .ok_or(RuntimeError::BadPadSlot(slot))?;
        let previous = std::mem::take(&mut **sv);
        self.savestack.push((slot, previous));
        Ok(())
    }

    pub(crate) fn new_mortal(&mut self, value: Scalar) -> *mut Scalar {
        let mut sv = Box::new(value);
        let ptr = &mut *sv as *mut Scalar;
        self.mortals.push(sv);
        ptr
    }

    pub(crate) fn push(&mut self, sv: *mut Scalar) {
        self.stack.push(sv);
    }

    pub(crate) fn pop(&mut self, at: OpId) -> Result<*mut Scalar, RuntimeError> {
        if self.stack.len() <= self.stack_floor {
            return Err(RuntimeError::StackUnderflow(at));
        }
        self.stack.pop().ok_or(RuntimeError::StackUnderflow(at))
    }

    fn peek(&self, at: OpId) -> Result<*mut Scalar, RuntimeError> {
        if self.stack.len() <= self.stack_floor {
            return Err(RuntimeError::StackUnderflow(at));
        }
        self.stack.last().copied().ok_or(RuntimeError::StackUnderflow(at))
    }

    pub(crate) fn current(&self) -> Option<OpId> {
        self.current
    }

    pub(crate) fn current_next(&self) -> Option<OpId> {
        self.current
            .and_then(|id| self.graph.get(id))
            .and_then(|op| op.next)
    }

    /// Start a nested loop: its statement boundaries must not free the
    /// caller's stack entries or temporaries.
    pub(crate) fn enter_callback(&mut self) -> Frame {
        let frame = Frame {
            current: self.current,
            stack_floor: self.stack_floor,
            tmps_floor: self.tmps_floor,
        };
        self.stack_floor = self.stack.len();
        self.tmps_floor = self.mortals.len();
        frame
    }

    pub(crate) fn leave_callback(&mut self, frame: Frame) {
        self.current = frame.current;
        self.stack_floor = frame.stack_floor;
        self.tmps_floor = frame.tmps_floor;
    }

    fn target(&mut self, targ: Option<PadIndex>) -> Result<*mut Scalar, RuntimeError> {
        match targ {
            Some(slot) => self.pad_slot(slot),
            None => Ok(self.new_mortal(Scalar::Undef)),
        }
    }

    /// The deciding value stays as the result; otherwise the right operand
    /// is evaluated in its place.
    fn short_circuit(
        &mut self,
        id: OpId,
        is_and: bool,
        next: Option<OpId>,
        other: Option<OpId>,
    ) -> Result<Option<OpId>, RuntimeError> {
        let truth = unsafe { (*self.peek(id)?).is_true() };
        if truth != is_and {
            return Ok(next);
        }
        self.pop(id)?;
        Ok(other)
    }

    /// Execute one interpreted op and return its successor.
    fn exec(&mut self, id: OpId) -> Result<Option<OpId>, RuntimeError> {
        let op = self.graph.op(id)?;
        let (next, other, targ, stacked) = (op.next, op.other, op.targ, op.stacked);
        let kind = op.kind.clone();

        // SAFETY (all derefs below): stack entries point at live boxes.
        match kind {
            HostOpKind::Const(value) => {
                let sv = self.new_mortal(value);
                self.push(sv);
            }
            HostOpKind::PadSv { slot, intro } => {
                if intro {
                    self.save_clearsv(slot)?;
                }
                let sv = self.pad_slot(slot)?;
                self.push(sv);
            }
            HostOpKind::Arith(arith) => {
                let right = self.pop(id)?;
                let left = self.pop(id)?;
                let value = unsafe { arith.apply((*left).num(), (*right).num())? };
                let dst = if stacked { left } else { self.target(targ)? };
                unsafe { *dst = Scalar::Num(value) };
                self.push(dst);
            }
            HostOpKind::Negate => {
                let sv = self.pop(id)?;
                let value = unsafe { -(*sv).num() };
                let dst = self.target(targ)?;
                unsafe { *dst = Scalar::Num(value) };
                self.push(dst);
            }
            HostOpKind::Sassign => {
                let value = self.pop(id)?;
                let dst = self.pop(id)?;
                if dst != value {
                    unsafe { *dst = (*value).clone() };
                }
                self.push(dst);
            }
            HostOpKind::And => return self.short_circuit(id, true, next, other),
            HostOpKind::Or => return self.short_circuit(id, false, next, other),
            HostOpKind::CondExpr => {
                let cond = self.pop(id)?;
                let truth = unsafe { (*cond).is_true() };
                return Ok(if truth { other } else { next });
            }
            HostOpKind::Nextstate => {
                self.stack.truncate(self.stack_floor);
                self.mortals.truncate(self.tmps_floor);
            }
            HostOpKind::LineSeq | HostOpKind::Stub => {}
            HostOpKind::Native(_) => return Err(RuntimeError::NotExecutable(id)),
        }
        Ok(next)
    }
}

/// Dispatch from `start` until an op has no successor or a fault is
/// recorded. Native ops receive the interpreter pointer and return their
/// successor.
///
/// # Safety
/// `interp` must be valid for the whole call and not otherwise borrowed.
/// Re-entrant: compiled code may call back into this through
/// `opjit_call_runloop`, so no borrow of `*interp` is held across a native
/// call.
pub(crate) unsafe fn runloop(interp: *mut Interp, start: OpId) {
    let mut cur = Some(start);
    while let Some(id) = cur {
        let entry = {
            let it = &mut *interp;
            if it.fault.is_some() {
                return;
            }
            let native = match it.graph.get(id) {
                Some(op) => match &op.kind {
                    HostOpKind::Native(n) => Some(n.entry),
                    _ => None,
                },
                None => {
                    it.fail(RuntimeError::UnknownOp(id));
                    return;
                }
            };
            match native {
                Some(entry) => {
                    it.current = Some(id);
                    entry
                }
                None => {
                    match it.exec(id) {
                        Ok(next) => cur = next,
                        Err(err) => {
                            it.fail(err);
                            return;
                        }
                    }
                    continue;
                }
            }
        };
        tracing::trace!(op = %id, "enter native");
        cur = OpId::from_raw(entry(interp));
    }
}
