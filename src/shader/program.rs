//! Handing cross-compiled GLSL to the driver.

use crate::shader::{
    cross::CrossCompiled,
    error::{CompileError, CompileResult},
    gl::GlContext,
    stage::SlangStage,
};

/// Compile one stage with the driver.
///
/// The info log is logged whenever the driver produced one, success or not.
pub fn compile_shader<C: GlContext>(ctx: &C, compiled: &CrossCompiled) -> CompileResult<C::Shader> {
    let shader = ctx
        .create_shader(compiled.stage)
        .map_err(CompileError::Gl)?;
    let ok = ctx.compile_shader(shader, &compiled.source);

    let info_log = ctx.shader_info_log(shader);
    let info_log = info_log.trim();
    if !info_log.is_empty() {
        log::warn!("{} shader compile log:\n{info_log}", compiled.stage.pragma_name());
    }

    if !ok {
        ctx.delete_shader(shader);
        return Err(CompileError::Driver {
            stage: compiled.stage.pragma_name(),
            log: info_log.to_string(),
        });
    }
    Ok(shader)
}

/// Link a vertex and fragment shader into a program.
///
/// The shader objects are deleted whether or not linking succeeds.
pub fn link_program<C: GlContext>(
    ctx: &C,
    vertex: C::Shader,
    fragment: C::Shader,
) -> CompileResult<C::Program> {
    let program = match ctx.create_program() {
        Ok(program) => program,
        Err(e) => {
            ctx.delete_shader(vertex);
            ctx.delete_shader(fragment);
            return Err(CompileError::Gl(e));
        }
    };

    let ok = ctx.link_program(program, &[vertex, fragment]);
    ctx.delete_shader(vertex);
    ctx.delete_shader(fragment);

    let info_log = ctx.program_info_log(program);
    let info_log = info_log.trim();
    if !info_log.is_empty() {
        log::warn!("program link log:\n{info_log}");
    }

    if !ok {
        ctx.delete_program(program);
        return Err(CompileError::ProgramLink(info_log.to_string()));
    }
    Ok(program)
}

/// Build a program from both cross-compiled stages.
pub fn build_program<C: GlContext>(
    ctx: &C,
    vertex: &CrossCompiled,
    fragment: &CrossCompiled,
) -> CompileResult<C::Program> {
    debug_assert_eq!(vertex.stage, SlangStage::Vertex);
    debug_assert_eq!(fragment.stage, SlangStage::Fragment);

    let vs = compile_shader(ctx, vertex)?;
    let fs = match compile_shader(ctx, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            ctx.delete_shader(vs);
            return Err(e);
        }
    };
    link_program(ctx, vs, fs)
}
