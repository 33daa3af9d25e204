//! Failure kinds of the slang compile path.

use thiserror::Error;

/// Everything that can abort building a pass.
///
/// The variants carry the diagnostic text that was already logged when the
/// failure happened; callers only need to propagate them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("preprocess failed: {0}")]
    Preprocess(String),
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("link failed: {0}")]
    Link(String),
    #[error(
        "too many UBOs or push constant buffers: {uniform_buffers} uniform buffers, \
         {push_constants} push constant buffers (at most one of each)"
    )]
    ResourceLimit {
        uniform_buffers: usize,
        push_constants: usize,
    },
    #[error("SPIR-V lowering failed: {0}")]
    Lower(String),
    #[error("GLSL {version} emission failed: {message}")]
    Emit { version: u16, message: String },
    #[error("driver rejected {stage} shader: {log}")]
    Driver { stage: &'static str, log: String },
    #[error("program link failed: {0}")]
    ProgramLink(String),
    #[error("GL object allocation failed: {0}")]
    Gl(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
