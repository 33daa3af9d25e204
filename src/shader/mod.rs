//! Slang shader chain: compile every pass of a preset for the active GL
//! context and bind its uniforms every frame.
//!
//! This module is organized into several submodules:
//! - `stage`: splitting combined sources by `#pragma stage`, pragma metadata
//! - `toolchain`: process-wide naga toolchain state
//! - `cross`: GLSL -> naga IR -> SPIR-V / context GLSL cross-compilation
//! - `gl`: the rendering-context trait and its `glow` implementation
//! - `program`: driver compile and link
//! - `semantics`: uniform roles and the name classifier
//! - `binder`: per-frame uniform, texture and geometry upload
//! - `chain`: `ShaderChain`, which owns the passes and ties it all together
//!
//! The main entry points are:
//! - `ShaderChain::build`: compile and introspect a whole preset
//! - `ShaderChain::set_shader_vars`: bind one pass for the current frame
//! - `compile_slang`: cross-compile a single stage without a GPU

pub mod binder;
pub mod chain;
pub mod cross;
pub mod error;
pub mod gl;
pub mod program;
pub mod semantics;
pub mod stage;
pub mod toolchain;

pub use chain::{
    FeedbackTextures, FrameTexture, LookupTexture, Parameter, Pass, PassSource, ShaderChain, collect_parameters,
};
pub use cross::{CompileOptions, ContextVersion, CrossCompiled, compile_slang, target_glsl_version};
pub use error::{CompileError, CompileResult};
pub use gl::{ActiveUniform, GlContext, UniformValue};
pub use semantics::{BoundUniform, ClassifyContext, Semantic, UniformRole, UniformStorage, classify};
pub use stage::{SlangStage, extract_stage, parse_pragmas};
pub use toolchain::ShaderToolchain;
