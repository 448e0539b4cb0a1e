//! Code generation: semantic tree -> Cranelift IR.
//!
//! One `Emitter` builds one unit. Values flow as `EmitValue`s that pair an
//! IR value with its representation: an unboxed `f64`/`i64`, or a pointer
//! to a boxed `Scalar`. Anything the emitter has no direct lowering for is
//! evaluated by the interpreter through a call-back into the dispatch loop.

use cranelift_codegen::ir::{types, Block, InstBuilder, Value};
use cranelift_frontend::FunctionBuilder;

use opjit_ast::{Constant, DeclId, Op, OpClass, OpCode, PadIndex, Term, TermKind, Type};
use opjit_common_core::{Context, OpId};

use crate::analyze::Analyzer;
use crate::engine::{Helper, Helpers};
use crate::error::JitError;
use crate::splice::Splicer;
use crate::Session;

/// Result of emitting one term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EmitValue {
    Value(Value, Type),
    /// The term produced nothing (void or list context call-back).
    Void,
}

impl EmitValue {
    fn type_name(&self) -> String {
        match self {
            EmitValue::Value(_, ty) => ty.to_string(),
            EmitValue::Void => "void".into(),
        }
    }
}

pub(crate) struct Emitter<'f, 's, 'a> {
    builder: FunctionBuilder<'f>,
    helpers: Helpers,
    session: &'s mut Session<'a>,
    splicer: Splicer,
    /// Detached fragments this unit calls back into.
    subtrees: Vec<OpId>,
    ctx: Value,
}

impl<'f, 's, 'a> Emitter<'f, 's, 'a> {
    pub(crate) fn new(
        mut builder: FunctionBuilder<'f>,
        helpers: Helpers,
        session: &'s mut Session<'a>,
    ) -> Self {
        let entry: Block = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let ctx = builder.block_params(entry)[0];
        let splicer = Splicer::new(session.owner);

        Self {
            builder,
            helpers,
            session,
            splicer,
            subtrees: Vec::new(),
            ctx,
        }
    }

    /// Return the successor of the native op and seal the function.
    pub(crate) fn finish(mut self) -> Result<(Splicer, Vec<OpId>), JitError> {
        let ctx = self.ctx;
        let next = self.call_value(Helper::OpNext, &[ctx])?;
        self.builder.ins().return_(&[next]);
        self.builder.finalize();
        Ok((self.splicer, self.subtrees))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn call(&mut self, helper: Helper, args: &[Value]) -> Option<Value> {
        let func = self.helpers.get(helper);
        let inst = self.builder.ins().call(func, args);
        self.builder.inst_results(inst).first().copied()
    }

    fn call_value(&mut self, helper: Helper, args: &[Value]) -> Result<Value, JitError> {
        self.call(helper, args)
            .ok_or_else(|| JitError::Internal(format!("{} returns nothing", helper.symbol())))
    }

    fn u32_const(&mut self, v: u32) -> Value {
        self.builder.ins().iconst(types::I32, i64::from(v))
    }

    fn pad_sv(&mut self, slot: PadIndex) -> Result<Value, JitError> {
        let ctx = self.ctx;
        let slot = self.u32_const(slot.0);
        self.call_value(Helper::PadSv, &[ctx, slot])
    }

    fn new_mortal_sv(&mut self) -> Result<Value, JitError> {
        let ctx = self.ctx;
        self.call_value(Helper::NewMortalSv, &[ctx])
    }

    fn slot_of(&self, decl: DeclId) -> Result<PadIndex, JitError> {
        self.session
            .scope
            .get(decl)
            .map(|d| d.slot)
            .ok_or_else(|| JitError::Internal(format!("unknown declaration {}", decl.0)))
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Emit a batch root and produce what its context requires.
    pub(crate) fn emit_root(&mut self, term: &Term) -> Result<(), JitError> {
        match &term.kind {
            TermKind::Statement(kid) => self.emit_root(kid),
            TermKind::StatementSequence(stmts) => {
                stmts.iter().try_for_each(|stmt| self.emit_root(stmt))
            }
            _ => {
                let value = self.emit(term)?;
                self.emit_return(term, value)
            }
        }
    }

    fn emit_return(&mut self, term: &Term, value: EmitValue) -> Result<(), JitError> {
        match term.context {
            Context::Caller => return Err(JitError::UnimplementedContext(Context::Caller)),
            Context::Unresolved => {
                return Err(JitError::Internal("context not resolved before emission".into()))
            }
            Context::Void | Context::List => return Ok(()),
            Context::Scalar => {}
        }
        let EmitValue::Value(value, ty) = value else {
            return Err(JitError::Internal("scalar context produced no value".into()));
        };
        let targ = term.origin.and_then(|o| o.targ);
        let boxed = ty == Type::Scalar;

        let result = match term.as_op() {
            Some(op) if op.is_synthesized_assignment() => {
                if boxed {
                    value
                } else {
                    self.new_mortal_sv()?
                }
            }
            Some(op) if op.class() == OpClass::Binop => match targ {
                Some(targ) => self.pad_sv(targ)?,
                None if boxed => value,
                None => return Err(JitError::MissingTarget("Binary OP without target")),
            },
            Some(op) if op.class() == OpClass::Unop => match targ {
                Some(targ) => self.pad_sv(targ)?,
                None => return Err(JitError::MissingTarget("Unary OP without target")),
            },
            _ if boxed => value,
            _ => self.new_mortal_sv()?,
        };

        if result != value {
            self.assign_sv(result, value, ty)?;
        }
        let ctx = self.ctx;
        self.call(Helper::PushSv, &[ctx, result]);
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn emit(&mut self, term: &Term) -> Result<EmitValue, JitError> {
        tracing::trace!(context = term.context.name(), leaf = term.is_leaf(), "emit");
        match &term.kind {
            TermKind::Constant(c) => self.emit_const(c),
            TermKind::Lexical(decl) => {
                let slot = self.slot_of(*decl)?;
                Ok(EmitValue::Value(self.pad_sv(slot)?, Type::Scalar))
            }
            TermKind::VariableDeclaration(decl) => {
                let slot = self.slot_of(*decl)?;
                let ctx = self.ctx;
                let raw = self.u32_const(slot.0);
                self.call(Helper::SaveClearSv, &[ctx, raw]);
                Ok(EmitValue::Value(self.pad_sv(slot)?, Type::Scalar))
            }
            TermKind::Op(op) if Analyzer::new(self.session.scope).is_jittable(term) => {
                self.emit_op(term, op)
            }
            _ => self.emit_boxed(term),
        }
    }

    fn emit_const(&mut self, c: &Constant) -> Result<EmitValue, JitError> {
        let ins = self.builder.ins();
        Ok(match c {
            Constant::Double(v) => EmitValue::Value(ins.f64const(*v), Type::Double),
            Constant::Int(v) => EmitValue::Value(ins.iconst(types::I64, *v), Type::Int),
            Constant::UnsignedInt(v) => {
                EmitValue::Value(ins.iconst(types::I64, *v as i64), Type::UnsignedInt)
            }
            Constant::Str(s) => return Err(JitError::UnsupportedConstant(format!("string {s:?}"))),
            Constant::Undef => return Err(JitError::UnsupportedConstant("undef".into())),
        })
    }

    fn emit_op(&mut self, term: &Term, op: &Op) -> Result<EmitValue, JitError> {
        match (op.code, &op.kids[..]) {
            (
                OpCode::Add | OpCode::Subtract | OpCode::Multiply | OpCode::Divide,
                [left, right],
            ) => self.emit_binop(op, left, right),
            (OpCode::Negate, [kid]) => {
                let value = self.emit(kid)?;
                let nv = self.to_nv(value)?;
                Ok(EmitValue::Value(self.builder.ins().fneg(nv), Type::Double))
            }
            (OpCode::Sassign, [target, value]) => self.emit_sassign(target, value),
            _ => self.emit_boxed(term),
        }
    }

    fn emit_binop(&mut self, op: &Op, left: &Term, right: &Term) -> Result<EmitValue, JitError> {
        let lv = self.emit(left)?;
        let rv = self.emit(right)?;
        let l = self.to_nv(lv)?;
        let r = self.to_nv(rv)?;

        let ins = self.builder.ins();
        let res = match op.code {
            OpCode::Add => ins.fadd(l, r),
            OpCode::Subtract => ins.fsub(l, r),
            OpCode::Multiply => ins.fmul(l, r),
            OpCode::Divide => ins.fdiv(l, r),
            code => return Err(JitError::Internal(format!("{code} is not an arithmetic binop"))),
        };

        if op.is_assignment_form() {
            let EmitValue::Value(target, Type::Scalar) = lv else {
                return Err(JitError::RepresentationMismatch(format!(
                    "Can only assign to scalars, got a {}",
                    lv.type_name()
                )));
            };
            self.assign_sv(target, res, Type::Double)?;
            return Ok(EmitValue::Value(target, Type::Scalar));
        }
        Ok(EmitValue::Value(res, Type::Double))
    }

    fn emit_sassign(&mut self, target: &Term, value: &Term) -> Result<EmitValue, JitError> {
        let lv = self.emit(target)?;
        let EmitValue::Value(dst, Type::Scalar) = lv else {
            return Err(JitError::RepresentationMismatch(format!(
                "Can only assign to scalars, got a {}",
                lv.type_name()
            )));
        };
        let EmitValue::Value(src, ty) = self.emit(value)? else {
            return Err(JitError::RepresentationMismatch("Cannot assign a void value".into()));
        };
        self.assign_sv(dst, src, ty)?;
        Ok(EmitValue::Value(dst, Type::Scalar))
    }

    /// Coerce to an unboxed double.
    fn to_nv(&mut self, value: EmitValue) -> Result<Value, JitError> {
        let EmitValue::Value(v, ty) = value else {
            return Err(JitError::RepresentationMismatch(
                "Cannot use a void value as a number".into(),
            ));
        };
        if !ty.can_coerce_to(Type::Double) {
            return Err(JitError::RepresentationMismatch(format!(
                "Cannot coerce {ty} to {}",
                Type::Double
            )));
        }
        match ty {
            Type::Int => Ok(self.builder.ins().fcvt_from_sint(types::F64, v)),
            Type::UnsignedInt => Ok(self.builder.ins().fcvt_from_uint(types::F64, v)),
            Type::Scalar | Type::Unspecified => {
                let ctx = self.ctx;
                self.call_value(Helper::SvNv, &[ctx, v])
            }
            _ => Ok(v),
        }
    }

    /// Store `value` of representation `ty` into the box `sv`.
    fn assign_sv(&mut self, sv: Value, value: Value, ty: Type) -> Result<(), JitError> {
        if !ty.can_coerce_to(Type::Scalar) {
            return Err(JitError::RepresentationMismatch(format!(
                "Unable to assign {ty} to a scalar"
            )));
        }
        let helper = match ty {
            Type::Double => Helper::SvSetNv,
            Type::Int => Helper::SvSetIv,
            Type::UnsignedInt => Helper::SvSetUv,
            _ => Helper::SvSetSv,
        };
        let ctx = self.ctx;
        self.call(helper, &[ctx, sv, value]);
        Ok(())
    }

    // =========================================================================
    // Call-backs
    // =========================================================================

    /// Hand `term` to the interpreter: compile what can be compiled below
    /// it, detach it, and call back into the dispatch loop to run it.
    fn emit_boxed(&mut self, term: &Term) -> Result<EmitValue, JitError> {
        if term.context == Context::Caller {
            return Err(JitError::UnimplementedContext(Context::Caller));
        }

        let kids = term.kids();
        let nested = self.session.compile_roots(&kids)?;
        self.splicer.absorb(nested);

        let root = self.splicer.detach_fragment(term)?;
        self.subtrees.push(root);
        tracing::trace!(%root, "call-back fragment");

        let ctx = self.ctx;
        let raw = self.u32_const(root.0);
        self.call(Helper::CallRunloop, &[ctx, raw]);

        if term.context != Context::Scalar {
            return Ok(EmitValue::Void);
        }
        let sv = self.call_value(Helper::PopSv, &[ctx])?;
        Ok(EmitValue::Value(sv, Type::Scalar))
    }
}
