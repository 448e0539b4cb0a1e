//! Compilation errors.
//!
//! Everything except `EngineInit` is a batch failure: the batch's function
//! and edits are discarded and the compile either stops or leaves the
//! region interpreted, per `JitOptions::abort_on_batch_error`.

use thiserror::Error;

use opjit_common_core::Context;

#[derive(Debug, Error)]
pub enum JitError {
    /// Host ISA or settings could not be set up. Terminal for the host.
    #[error("failed to initialize code engine: {0}")]
    EngineInit(String),

    #[error("Cranelift module error: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("Unable to emit this type of constant: {0}")]
    UnsupportedConstant(String),

    /// Value representation cannot be coerced as required.
    #[error("{0}")]
    RepresentationMismatch(String),

    #[error("{0}")]
    MissingTarget(&'static str),

    #[error("{} context not implemented", context_name(.0))]
    UnimplementedContext(Context),

    #[error("term has no originating instruction: {0}")]
    MissingOrigin(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn context_name(context: &Context) -> &'static str {
    match context {
        Context::Caller => "Caller-determined",
        Context::Void => "Void",
        Context::Scalar => "Scalar",
        Context::List => "List",
        Context::Unresolved => "Unresolved",
    }
}

impl JitError {
    /// True for failures that only invalidate the current batch.
    pub fn is_batch_failure(&self) -> bool {
        !matches!(self, JitError::EngineInit(_))
    }
}
