//! Builds a host instruction graph and the semantic tree describing it in
//! one pass, so every term's origin points at a real instruction.

#![allow(dead_code)]

use opjit_ast::{Constant, Context, DeclId, OpCode, Origin, Scope, Term, Type};
use opjit_common_core::{OpId, OwnerId, PadIndex};
use opjit_runtime::{ArithOp, HostOp, HostOpKind, Interp, OpGraph, Scalar};

pub const OWNER: OwnerId = OwnerId(7);

pub struct Fixture {
    pub graph: OpGraph,
    pub scope: Scope,
    next_slot: u32,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            graph: OpGraph::new(OWNER),
            scope: Scope::new(),
            next_slot: 1,
        }
    }

    fn slot(&mut self) -> PadIndex {
        let slot = PadIndex(self.next_slot);
        self.next_slot += 1;
        slot
    }

    pub fn declare(&mut self, name: &str, ty: Type) -> (DeclId, PadIndex) {
        let slot = self.slot();
        (self.scope.declare(name, slot, ty), slot)
    }

    fn pad_op(&mut self, decl: DeclId, intro: bool) -> OpId {
        let slot = self.scope.get(decl).expect("declared").slot;
        self.graph.add(HostOp::new(HostOpKind::PadSv { slot, intro }))
    }

    pub fn var(&mut self, decl: DeclId) -> Term {
        let id = self.pad_op(decl, false);
        Term::lexical(decl)
            .with_origin(Origin::new(id, id))
            .with_context(Context::Scalar)
    }

    /// `my $v`
    pub fn my(&mut self, decl: DeclId) -> Term {
        let id = self.pad_op(decl, true);
        Term::declaration(decl)
            .with_origin(Origin::new(id, id))
            .with_context(Context::Scalar)
    }

    fn constant(&mut self, c: Constant, value: Scalar) -> Term {
        let id = self.graph.add(HostOp::new(HostOpKind::Const(value)));
        Term::constant(c)
            .with_origin(Origin::new(id, id))
            .with_context(Context::Scalar)
    }

    pub fn num(&mut self, v: f64) -> Term {
        self.constant(Constant::Double(v), Scalar::Num(v))
    }

    pub fn int(&mut self, v: i64) -> Term {
        self.constant(Constant::Int(v), Scalar::Int(v))
    }

    pub fn uint(&mut self, v: u64) -> Term {
        self.constant(Constant::UnsignedInt(v), Scalar::UInt(v))
    }

    pub fn string(&mut self, s: &str) -> Term {
        self.constant(Constant::Str(s.into()), Scalar::Str(s.into()))
    }

    /// `left op right`, writing to its own pad target.
    pub fn arith(&mut self, code: OpCode, left: Term, right: Term) -> Term {
        let targ = self.slot();
        let id = self.graph.add(
            HostOp::new(HostOpKind::Arith(arith_op(code)))
                .with_kids(vec![root(&left), root(&right)])
                .with_targ(targ),
        );
        let origin = Origin::new(id, start(&left)).with_targ(targ);
        Term::binop(code, left, right)
            .with_origin(origin)
            .with_context(Context::Scalar)
    }

    /// `left op= right`
    pub fn arith_assign(&mut self, code: OpCode, left: Term, right: Term) -> Term {
        let id = self.graph.add(
            HostOp::new(HostOpKind::Arith(arith_op(code)))
                .with_kids(vec![root(&left), root(&right)])
                .stacked(),
        );
        let origin = Origin::new(id, start(&left));
        Term::assign_op(code, left, right)
            .with_origin(origin)
            .with_context(Context::Scalar)
    }

    pub fn negate(&mut self, kid: Term) -> Term {
        let targ = self.slot();
        let id = self.graph.add(
            HostOp::new(HostOpKind::Negate)
                .with_kids(vec![root(&kid)])
                .with_targ(targ),
        );
        let origin = Origin::new(id, start(&kid)).with_targ(targ);
        Term::unop(OpCode::Negate, kid)
            .with_origin(origin)
            .with_context(Context::Scalar)
    }

    /// `target = value`
    pub fn assign(&mut self, target: Term, value: Term) -> Term {
        let id = self
            .graph
            .add(HostOp::new(HostOpKind::Sassign).with_kids(vec![root(&target), root(&value)]));
        let origin = Origin::new(id, start(&target));
        Term::binop(OpCode::Sassign, target, value)
            .with_origin(origin)
            .with_context(Context::Scalar)
    }

    /// `cond ? yes : no`
    pub fn ternary(&mut self, cond: Term, yes: Term, no: Term) -> Term {
        let id = self.graph.add(
            HostOp::new(HostOpKind::CondExpr).with_kids(vec![root(&cond), root(&yes), root(&no)]),
        );
        let origin = Origin::new(id, start(&cond));
        Term::op(OpCode::Ternary, vec![cond, yes, no])
            .with_origin(origin)
            .with_context(Context::Scalar)
    }

    /// One statement per expression under a statement list, linked as the
    /// whole program.
    pub fn program(&mut self, exprs: Vec<Term>) -> Term {
        let mut kids = Vec::new();
        let mut stmts = Vec::new();
        for expr in exprs {
            let ns = self.graph.add(HostOp::new(HostOpKind::Nextstate));
            kids.push(ns);
            kids.push(root(&expr));
            stmts.push(
                Term::statement(expr.with_context(Context::Void))
                    .with_origin(Origin::new(ns, ns)),
            );
        }
        let first = kids.first().copied().expect("at least one statement");
        let seq = self.graph.add(HostOp::new(HostOpKind::LineSeq).with_kids(kids));
        self.graph.link(seq).expect("link");
        Term::sequence(stmts).with_origin(Origin::new(seq, first))
    }

    /// Link a single expression as the whole program.
    pub fn expression(&mut self, expr: Term) -> Term {
        self.graph.link(root(&expr)).expect("link");
        expr
    }

    pub fn into_interp(self) -> Interp {
        Interp::new(self.graph, self.next_slot as usize)
    }
}

pub fn root(term: &Term) -> OpId {
    term.origin.expect("origin").root
}

pub fn start(term: &Term) -> OpId {
    term.origin.expect("origin").start
}

/// Statement markers of a program, in order.
pub fn markers(program: &Term) -> Vec<OpId> {
    program.kids().into_iter().map(root).collect()
}

fn arith_op(code: OpCode) -> ArithOp {
    match code {
        OpCode::Add => ArithOp::Add,
        OpCode::Subtract => ArithOp::Subtract,
        OpCode::Multiply => ArithOp::Multiply,
        OpCode::Divide => ArithOp::Divide,
        OpCode::Modulo => ArithOp::Modulo,
        other => panic!("{other} has no host arithmetic op"),
    }
}
