//! Jittability analysis.
//!
//! Decides which subtrees can be compiled and partitions a list of roots
//! into compilable runs and interpreted nodes. Nodes that are not
//! compilable have their kids examined in turn, so a compilable expression
//! buried under a loop or a `grep` is still found.

use std::collections::VecDeque;

use opjit_ast::{OpCode, Scope, Term, TermKind};

/// Operators the code generator implements directly.
pub const JITTABLE_OPS: &[OpCode] = &[
    OpCode::Add,
    OpCode::Subtract,
    OpCode::Multiply,
    OpCode::Divide,
    OpCode::Negate,
    OpCode::Sassign,
];

pub fn is_known_jittable(code: OpCode) -> bool {
    JITTABLE_OPS.contains(&code)
}

/// One piece of the partition, in tree order.
#[derive(Debug, Clone, PartialEq)]
pub enum Region<'t> {
    /// Adjacent terms compiled together into one unit. Covers each term's
    /// whole subtree.
    Jittable(Vec<&'t Term>),
    /// A single node left to the interpreter. Its kids appear in later
    /// regions.
    Interpreted(&'t Term),
}

enum Work<'t> {
    Term(&'t Term),
    Run(Vec<&'t Term>),
}

pub struct Analyzer<'a> {
    scope: &'a Scope,
}

impl<'a> Analyzer<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    pub fn is_jittable(&self, term: &Term) -> bool {
        match &term.kind {
            TermKind::Constant(_) | TermKind::Lexical(_) | TermKind::VariableDeclaration(_) => {
                true
            }
            TermKind::Statement(kid) => self.is_jittable(kid),
            TermKind::StatementSequence(stmts) => {
                let jittable = stmts.iter().filter(|s| self.is_jittable(s)).count();
                jittable * 2 >= stmts.len()
            }
            TermKind::Op(op) => {
                if !is_known_jittable(op.code) || self.needs_excessive_magic(term) {
                    return false;
                }
                if op.may_have_explicit_overload() {
                    // Overloading is resolved by the boxed-value helpers at
                    // run time.
                    true
                } else if op.is_synthesized_assignment() {
                    op.kids.get(1).is_some_and(|value| self.is_jittable(value))
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// True if a variable with opaque (trap-carrying) type is reachable
    /// from `term` through compilable operators. Such variables must only
    /// be touched by the interpreter.
    pub fn needs_excessive_magic(&self, term: &Term) -> bool {
        let mut nodes = VecDeque::from([term]);
        while let Some(node) = nodes.pop_front() {
            match &node.kind {
                TermKind::Lexical(d) | TermKind::VariableDeclaration(d)
                    if self.scope.declared_type(*d).is_opaque() =>
                {
                    return true;
                }
                TermKind::Op(op) if is_known_jittable(op.code) => nodes.extend(op.kids.iter()),
                _ => {}
            }
        }
        false
    }

    /// Split `roots` into regions. Statement sequences are cut into runs of
    /// compilable statements; everything else is compiled whole or
    /// descended into.
    pub fn partition<'t>(&self, roots: &[&'t Term]) -> Vec<Region<'t>> {
        let mut queue: VecDeque<Work<'t>> = roots.iter().map(|&t| Work::Term(t)).collect();
        let mut regions = Vec::new();

        while let Some(work) = queue.pop_front() {
            let term = match work {
                Work::Run(run) => {
                    regions.push(Region::Jittable(run));
                    continue;
                }
                Work::Term(term) => term,
            };

            match &term.kind {
                // Compiling a lone leaf saves nothing.
                _ if term.is_leaf() => regions.push(Region::Interpreted(term)),
                TermKind::StatementSequence(stmts) => {
                    regions.push(Region::Interpreted(term));
                    let mut front = Vec::new();
                    let mut run = Vec::new();
                    for stmt in stmts {
                        if self.is_jittable(stmt) {
                            run.push(stmt);
                        } else {
                            if !run.is_empty() {
                                front.push(Work::Run(std::mem::take(&mut run)));
                            }
                            front.push(Work::Term(stmt));
                        }
                    }
                    if !run.is_empty() {
                        front.push(Work::Run(run));
                    }
                    for work in front.into_iter().rev() {
                        queue.push_front(work);
                    }
                }
                _ if self.is_jittable(term) => regions.push(Region::Jittable(vec![term])),
                _ => {
                    regions.push(Region::Interpreted(term));
                    for kid in term.kids().into_iter().rev() {
                        queue.push_front(Work::Term(kid));
                    }
                }
            }
        }

        tracing::debug!(
            roots = roots.len(),
            jittable = regions.iter().filter(|r| matches!(r, Region::Jittable(_))).count(),
            "partitioned"
        );
        regions
    }
}
