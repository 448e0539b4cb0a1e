//! Semantic tree nodes.

use opjit_common_core::{Context, OpId, PadIndex};

use crate::ops::{OpClass, OpCode};
use crate::scope::{DeclId, Scope};
use crate::types::Type;

/// Back-reference from a term to the host instructions it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    /// The instruction at the root of the term's subtree; it executes last.
    pub root: OpId,
    /// The first instruction of the subtree in execution order.
    pub start: OpId,
    /// Pad slot the root instruction writes its result to, if any.
    pub targ: Option<PadIndex>,
}

impl Origin {
    pub fn new(root: OpId, start: OpId) -> Self {
        Self {
            root,
            start,
            targ: None,
        }
    }

    pub fn with_targ(mut self, targ: PadIndex) -> Self {
        self.targ = Some(targ);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Double(f64),
    Int(i64),
    UnsignedInt(u64),
    Str(String),
    Undef,
}

impl Constant {
    pub fn value_type(&self) -> Type {
        match self {
            Constant::Double(_) => Type::Double,
            Constant::Int(_) => Type::Int,
            Constant::UnsignedInt(_) => Type::UnsignedInt,
            Constant::Str(_) | Constant::Undef => Type::Scalar,
        }
    }
}

/// An operator application.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub code: OpCode,
    pub kids: Vec<Term>,
    /// `x op= y`: the result is stored back into the first kid.
    assign: bool,
}

impl Op {
    pub fn new(code: OpCode, kids: Vec<Term>) -> Self {
        Self {
            code,
            kids,
            assign: false,
        }
    }

    pub fn class(&self) -> OpClass {
        self.code.class()
    }

    /// `x op= y`. Only meaningful for codes with an assignment form.
    pub fn is_assignment_form(&self) -> bool {
        self.assign && self.code.has_assignment_form()
    }

    /// Plain assignment whose target is folded into the operation.
    pub fn is_synthesized_assignment(&self) -> bool {
        self.code == OpCode::Sassign
    }

    pub fn may_have_explicit_overload(&self) -> bool {
        self.code.may_be_overloaded()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub condition: Box<Term>,
    pub body: Box<Term>,
    /// Body runs before the first test (`do {} while`).
    pub post_condition: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub init: Option<Box<Term>>,
    pub condition: Option<Box<Term>>,
    pub step: Option<Box<Term>>,
    pub body: Box<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    pub variable: Box<Term>,
    pub list: Box<Term>,
    pub body: Box<Term>,
}

/// `map`/`grep` body applied over a list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListTransform {
    pub body: Box<Term>,
    pub list: Box<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Constant(Constant),
    VariableDeclaration(DeclId),
    Lexical(DeclId),
    Global(String),
    Op(Op),
    While(While),
    For(For),
    Foreach(Foreach),
    BareBlock(Box<Term>),
    Map(ListTransform),
    Grep(ListTransform),
    /// One statement; the term's origin is the statement marker.
    Statement(Box<Term>),
    /// Ordered statements of one scope.
    StatementSequence(Vec<Term>),
    /// Host fragment with no semantic representation.
    Optree,
}

/// Visitor control for `Term::walk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend into this term's kids.
    Skip,
    /// Stop the whole walk.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub kind: TermKind,
    pub origin: Option<Origin>,
    pub context: Context,
    value_type: Option<Type>,
}

impl Term {
    pub fn new(kind: TermKind) -> Self {
        Self {
            kind,
            origin: None,
            context: Context::Unresolved,
            value_type: None,
        }
    }

    pub fn constant(c: Constant) -> Self {
        Self::new(TermKind::Constant(c))
    }

    pub fn lexical(decl: DeclId) -> Self {
        Self::new(TermKind::Lexical(decl))
    }

    pub fn declaration(decl: DeclId) -> Self {
        Self::new(TermKind::VariableDeclaration(decl))
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(TermKind::Global(name.into()))
    }

    pub fn op(code: OpCode, kids: Vec<Term>) -> Self {
        Self::new(TermKind::Op(Op::new(code, kids)))
    }

    pub fn unop(code: OpCode, kid: Term) -> Self {
        Self::op(code, vec![kid])
    }

    pub fn binop(code: OpCode, left: Term, right: Term) -> Self {
        Self::op(code, vec![left, right])
    }

    /// `left op= right`.
    pub fn assign_op(code: OpCode, left: Term, right: Term) -> Self {
        let mut op = Op::new(code, vec![left, right]);
        op.assign = true;
        Self::new(TermKind::Op(op))
    }

    pub fn statement(kid: Term) -> Self {
        Self::new(TermKind::Statement(Box::new(kid))).with_context(Context::Void)
    }

    pub fn sequence(statements: Vec<Term>) -> Self {
        Self::new(TermKind::StatementSequence(statements)).with_context(Context::Void)
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Type of the value this term produces. Variables report their
    /// declared type, constants their literal type.
    pub fn value_type(&self, scope: &Scope) -> Type {
        match &self.kind {
            TermKind::Constant(c) => c.value_type(),
            TermKind::Lexical(d) | TermKind::VariableDeclaration(d) => scope.declared_type(*d),
            _ => self.value_type.unwrap_or(Type::Unspecified),
        }
    }

    /// Record a resolved type. Variable terms forward to their declaration.
    pub fn set_value_type(&mut self, scope: &mut Scope, ty: Type) {
        match &self.kind {
            TermKind::Lexical(d) | TermKind::VariableDeclaration(d) => {
                scope.set_declared_type(*d, ty)
            }
            _ => self.value_type = Some(ty),
        }
    }

    pub fn as_op(&self) -> Option<&Op> {
        match &self.kind {
            TermKind::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self.kind,
            TermKind::Constant(_)
                | TermKind::VariableDeclaration(_)
                | TermKind::Lexical(_)
                | TermKind::Global(_)
                | TermKind::Optree
        )
    }

    /// Direct kids in evaluation order.
    pub fn kids(&self) -> Vec<&Term> {
        match &self.kind {
            TermKind::Constant(_)
            | TermKind::VariableDeclaration(_)
            | TermKind::Lexical(_)
            | TermKind::Global(_)
            | TermKind::Optree => Vec::new(),
            TermKind::Op(op) => op.kids.iter().collect(),
            TermKind::While(w) => {
                if w.post_condition {
                    vec![&*w.body, &*w.condition]
                } else {
                    vec![&*w.condition, &*w.body]
                }
            }
            TermKind::For(f) => {
                let mut kids = Vec::with_capacity(4);
                kids.extend(f.init.as_deref());
                kids.extend(f.condition.as_deref());
                kids.push(&*f.body);
                kids.extend(f.step.as_deref());
                kids
            }
            TermKind::Foreach(f) => vec![&*f.variable, &*f.list, &*f.body],
            TermKind::BareBlock(body) => vec![&**body],
            TermKind::Map(t) | TermKind::Grep(t) => vec![&*t.list, &*t.body],
            TermKind::Statement(kid) => vec![&**kid],
            TermKind::StatementSequence(stmts) => stmts.iter().collect(),
        }
    }

    /// Pre-order walk. Returns `false` if the visitor aborted.
    pub fn walk<F>(&self, visit: &mut F) -> bool
    where
        F: FnMut(&Term) -> Walk,
    {
        match visit(self) {
            Walk::Abort => false,
            Walk::Skip => true,
            Walk::Continue => self.kids().into_iter().all(|kid| kid.walk(visit)),
        }
    }

    /// Number of terms in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| {
            n += 1;
            Walk::Continue
        });
        n
    }

    /// First host instruction of the region this term spans. Statement
    /// markers are not part of the span; sequences span their statements.
    pub fn span_first(&self) -> Option<OpId> {
        match &self.kind {
            TermKind::Statement(kid) => kid.span_first(),
            TermKind::StatementSequence(stmts) => stmts.first()?.span_first(),
            _ => self.origin.map(|o| o.start),
        }
    }

    /// Last host instruction (in execution order) of the region this term
    /// spans.
    pub fn span_last(&self) -> Option<OpId> {
        match &self.kind {
            TermKind::Statement(kid) => kid.span_last(),
            TermKind::StatementSequence(stmts) => stmts.last()?.span_last(),
            _ => self.origin.map(|o| o.root),
        }
    }
}
