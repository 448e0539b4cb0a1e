//! Compiler configuration.

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitOptions {
    pub opt_level: OptLevel,
    /// Run the IR verifier on every unit.
    pub verify: bool,
    /// Log the machine code of every unit at debug level.
    pub disasm: bool,
    /// Fail the whole compile on the first failing batch. When false the
    /// failing region is logged and left interpreted.
    pub abort_on_batch_error: bool,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self::release()
    }
}

impl JitOptions {
    pub fn release() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            verify: false,
            disasm: false,
            abort_on_batch_error: true,
        }
    }

    pub fn debug() -> Self {
        Self {
            opt_level: OptLevel::None,
            verify: true,
            disasm: true,
            abort_on_batch_error: true,
        }
    }

    pub fn lenient(mut self) -> Self {
        self.abort_on_batch_error = false;
        self
    }
}
