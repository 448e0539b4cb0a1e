//! Indented text rendering of a tree, for logs and tests.

use std::fmt::{self, Write};

use opjit_common_core::Context;

use crate::ops::OpClass;
use crate::scope::{DeclId, Scope};
use crate::term::{Constant, Term, TermKind};

/// `Display` adapter: `format!("{}", TermDump::new(&term, &scope))`.
pub struct TermDump<'a> {
    term: &'a Term,
    scope: &'a Scope,
}

impl<'a> TermDump<'a> {
    pub fn new(term: &'a Term, scope: &'a Scope) -> Self {
        Self { term, scope }
    }
}

impl fmt::Display for TermDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dump_term(f, self.term, self.scope, 0)
    }
}

fn dump_term(f: &mut fmt::Formatter<'_>, term: &Term, scope: &Scope, level: usize) -> fmt::Result {
    for _ in 0..level {
        f.write_str("  ")?;
    }
    match &term.kind {
        TermKind::Constant(c) => match c {
            Constant::Double(v) => write!(f, "constant double {v}")?,
            Constant::Int(v) => write!(f, "constant int {v}")?,
            Constant::UnsignedInt(v) => write!(f, "constant uint {v}")?,
            Constant::Str(s) => write!(f, "constant string {s:?}")?,
            Constant::Undef => f.write_str("constant undef")?,
        },
        TermKind::VariableDeclaration(d) => {
            f.write_str("my ")?;
            write_decl(f, scope, *d)?;
        }
        TermKind::Lexical(d) => {
            f.write_str("lexical ")?;
            write_decl(f, scope, *d)?;
        }
        TermKind::Global(name) => write!(f, "global {name}")?,
        TermKind::Op(op) => {
            let class = match op.class() {
                OpClass::Baseop => "baseop",
                OpClass::Unop => "unop",
                OpClass::Binop => "binop",
                OpClass::Listop => "listop",
                OpClass::Block => "block",
            };
            write!(f, "{class} {}", op.code)?;
            if op.is_assignment_form() {
                f.write_char('=')?;
            }
        }
        TermKind::While(w) if w.post_condition => f.write_str("do-while")?,
        TermKind::While(_) => f.write_str("while")?,
        TermKind::For(_) => f.write_str("for")?,
        TermKind::Foreach(_) => f.write_str("foreach")?,
        TermKind::BareBlock(_) => f.write_str("block")?,
        TermKind::Map(_) => f.write_str("map")?,
        TermKind::Grep(_) => f.write_str("grep")?,
        TermKind::Statement(_) => f.write_str("statement")?,
        TermKind::StatementSequence(_) => f.write_str("sequence")?,
        TermKind::Optree => f.write_str("optree")?,
    }
    if !matches!(term.context, Context::Unresolved | Context::Void) {
        write!(f, " <{}>", term.context.name())?;
    }
    f.write_char('\n')?;

    for kid in term.kids() {
        dump_term(f, kid, scope, level + 1)?;
    }
    Ok(())
}

fn write_decl(f: &mut fmt::Formatter<'_>, scope: &Scope, id: DeclId) -> fmt::Result {
    match scope.get(id) {
        Some(decl) => write!(f, "{} : {} @ {}", decl.name, decl.declared, decl.slot),
        None => write!(f, "<unknown declaration {}>", id.0),
    }
}
