//! Selective JIT for semantic trees using Cranelift.
//!
//! # Architecture
//!
//! - `Analyzer`: decides which terms compile and partitions roots into batches
//! - `JitEngine`: owns the Cranelift `JITModule` and the runtime helper imports
//! - `JitCompiler`: entry point, compiles a fragment into an `EditSet`
//! - `Emitter` (internal): lowers one batch to IR, calling back into the
//!   interpreter for everything it cannot lower
//!
//! # Unit Signature
//!
//! Every compiled unit uses the same C ABI signature:
//! ```ignore
//! extern "C" fn(ctx: *mut Interp) -> u32
//! ```
//!
//! - `ctx`: the interpreter running the unit
//! - return: raw id of the instruction to continue with
//!
//! Compilation never touches the host graph. The returned `EditSet` is
//! applied by the host with `OpGraph::apply_edits` once compilation is done.

pub mod analyze;
mod emit;
mod engine;
mod error;
mod options;
mod splice;

pub use analyze::{Analyzer, Region};
pub use engine::JitEngine;
pub use error::JitError;
pub use options::{JitOptions, OptLevel};
pub use opjit_runtime::EditSet;

use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

use opjit_ast::{Scope, Term, TermDump};
use opjit_common_core::OwnerId;

use crate::emit::Emitter;

// =============================================================================
// Session
// =============================================================================

/// State shared by one `compile` call and every nested batch it starts.
pub(crate) struct Session<'a> {
    engine: &'a mut JitEngine,
    scope: &'a Scope,
    owner: OwnerId,
}

impl<'a> Session<'a> {
    /// Partition `roots` and compile each jittable run.
    pub(crate) fn compile_roots(&mut self, roots: &[&Term]) -> Result<EditSet, JitError> {
        let regions = Analyzer::new(self.scope).partition(roots);
        let mut edits = EditSet::new();
        for region in regions {
            let Region::Jittable(run) = region else {
                continue;
            };
            match self.compile_batch(&run) {
                Ok(mut batch) => edits.append(&mut batch),
                Err(err)
                    if err.is_batch_failure() && !self.engine.options().abort_on_batch_error =>
                {
                    tracing::warn!(%err, roots = run.len(), "batch left to the interpreter");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(edits)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(roots = run.len()))]
    fn compile_batch(&mut self, run: &[&Term]) -> Result<EditSet, JitError> {
        let span = splice::run_span(run)?;
        let (name, mut func, helpers) = self.engine.new_function();

        let scope = self.scope;
        let mut fb_ctx = FunctionBuilderContext::new();
        let (splicer, subtrees) = {
            let builder = FunctionBuilder::new(&mut func, &mut fb_ctx);
            let mut emitter = Emitter::new(builder, helpers, self);
            for term in run {
                tracing::trace!(root = %TermDump::new(term, scope), "batch root");
                emitter.emit_root(term)?;
            }
            emitter.finish()?
        };

        let unit = self.engine.define(name, func, subtrees)?;
        Ok(splicer.finish(span, unit))
    }
}

// =============================================================================
// JitCompiler
// =============================================================================

pub struct JitCompiler<'e> {
    engine: &'e mut JitEngine,
}

impl<'e> JitCompiler<'e> {
    pub fn new(engine: &'e mut JitEngine) -> Self {
        Self { engine }
    }

    /// Compile what can be compiled of `roots`, the top-level terms of one
    /// fragment owned by `owner`.
    ///
    /// On error nothing needs undoing: the host graph is untouched and the
    /// partial edits are dropped. Units already defined stay in the engine.
    #[tracing::instrument(skip(self, roots, scope), fields(owner = %owner))]
    pub fn compile(
        &mut self,
        owner: OwnerId,
        roots: &[Term],
        scope: &Scope,
    ) -> Result<EditSet, JitError> {
        let roots: Vec<&Term> = roots.iter().collect();
        let mut session = Session {
            engine: &mut *self.engine,
            scope,
            owner,
        };
        let edits = session.compile_roots(&roots)?;
        tracing::debug!(
            units = edits.replacements().count(),
            detached = edits.detach_count(),
            "compiled fragment"
        );
        Ok(edits)
    }
}
