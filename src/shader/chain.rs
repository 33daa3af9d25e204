//! The multi-pass shader chain: building programs for every pass,
//! classifying their uniforms once, and binding them every frame.

use crate::shader::{
    binder::{self, BindResources, UniformBlock},
    cross::{CompileOptions, CrossCompiled, compile_slang},
    error::{CompileError, CompileResult},
    gl::GlContext,
    program::build_program,
    semantics::{BoundUniform, ClassifyContext, UniformRole, UniformStorage, classify},
    stage::{SlangStage, parse_pragmas},
    toolchain::ShaderToolchain,
};

/// A texture with the dimensions it was rendered or loaded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTexture<T> {
    pub texture: Option<T>,
    pub width: u32,
    pub height: u32,
}

impl<T> FrameTexture<T> {
    pub fn new(texture: T, width: u32, height: u32) -> Self {
        Self {
            texture: Some(texture),
            width,
            height,
        }
    }

    pub fn empty() -> Self {
        Self {
            texture: None,
            width: 0,
            height: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A named static texture supplied with the preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTexture<T> {
    pub id: String,
    pub texture: T,
    pub width: u32,
    pub height: u32,
}

impl<T> LookupTexture<T> {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A tunable float shared by all passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub value: f32,
}

/// Combined slang source of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSource {
    pub lines: Vec<String>,
    /// Explicit alias; falls back to `#pragma name` when `None`.
    pub alias: Option<String>,
}

impl PassSource {
    pub fn new(source: &str, alias: Option<String>) -> Self {
        Self {
            lines: source.lines().map(str::to_owned).collect(),
            alias,
        }
    }
}

/// Collect the parameters declared by every pass, first declaration wins.
pub fn collect_parameters(sources: &[PassSource]) -> Vec<Parameter> {
    let mut parameters: Vec<Parameter> = Vec::new();
    for source in sources {
        for declared in parse_pragmas(&source.lines).parameters {
            if parameters.iter().all(|p| p.id != declared.id) {
                parameters.push(Parameter {
                    id: declared.id,
                    value: declared.initial,
                });
            }
        }
    }
    parameters
}

/// Vertex attribute names the quad is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttributes {
    pub position: String,
    pub tex_coord: String,
}

impl VertexAttributes {
    const POSITION: &'static str = "Position";
    const TEX_COORD: &'static str = "TexCoord";

    fn from_vertex_stage(vertex: &CrossCompiled) -> Self {
        Self {
            position: vertex
                .attribute_name(Self::POSITION)
                .unwrap_or_else(|| Self::POSITION.to_string()),
            tex_coord: vertex
                .attribute_name(Self::TEX_COORD)
                .unwrap_or_else(|| Self::TEX_COORD.to_string()),
        }
    }
}

impl Default for VertexAttributes {
    fn default() -> Self {
        Self {
            position: Self::POSITION.to_string(),
            tex_coord: Self::TEX_COORD.to_string(),
        }
    }
}

/// The two textures a feedback pass alternates between.
///
/// The pass renders into `current` while `previous` still holds last
/// frame's output; [`ShaderChain::swap_feedback`] exchanges them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackTextures<T> {
    pub current: T,
    pub previous: T,
}

pub struct Pass<C: GlContext> {
    /// `None` for pass 0, the original frame.
    pub program: Option<C::Program>,
    pub output: FrameTexture<C::Texture>,
    pub alias: Option<String>,
    pub attributes: VertexAttributes,
    pub uniforms: Vec<BoundUniform<C::UniformLocation>>,
    pub uniform_block: Option<UniformBlock<C::Buffer>>,
    /// Chain-owned render target pair; present when a later pass samples
    /// this pass's previous output.
    pub feedback: Option<FeedbackTextures<C::Texture>>,
    pub uses_feedback: bool,
}

impl<C: GlContext> Pass<C> {
    fn original() -> Self {
        Self {
            program: None,
            output: FrameTexture::empty(),
            alias: None,
            attributes: VertexAttributes::default(),
            uniforms: Vec::new(),
            uniform_block: None,
            feedback: None,
            uses_feedback: false,
        }
    }

    fn release(&mut self, ctx: &C) {
        if let Some(program) = self.program.take() {
            ctx.delete_program(program);
        }
        if let Some(block) = self.uniform_block.take() {
            ctx.delete_buffer(block.buffer);
        }
        if let Some(feedback) = self.feedback.take() {
            ctx.delete_texture(feedback.current);
            ctx.delete_texture(feedback.previous);
        }
        self.uniforms.clear();
    }
}

/// A compiled preset. Pass 0 is the original frame; passes `1..` run the
/// preset's shaders in order.
pub struct ShaderChain<C: GlContext> {
    passes: Vec<Pass<C>>,
    luts: Vec<LookupTexture<C::Texture>>,
    parameters: Vec<Parameter>,
    prev_frames: Vec<FrameTexture<C::Texture>>,
    vbo: C::Buffer,
    frame_count: u32,
    max_prev_frame: usize,
    using_feedback: bool,
}

impl<C: GlContext> ShaderChain<C> {
    /// Compile, link and introspect every pass.
    ///
    /// On failure every GPU object created so far is deleted.
    pub fn build(
        ctx: &C,
        sources: &[PassSource],
        luts: Vec<LookupTexture<C::Texture>>,
        parameters: Vec<Parameter>,
    ) -> CompileResult<Self> {
        ShaderToolchain::ensure_initialized();
        let options = CompileOptions {
            context: ctx.context_version(),
        };

        let mut passes = vec![Pass::original()];
        for (i, source) in sources.iter().enumerate() {
            match build_pass(ctx, source, &options) {
                Ok(pass) => passes.push(pass),
                Err(e) => {
                    log::error!("pass {} failed to build: {e}", i + 1);
                    release_all(ctx, &mut passes);
                    return Err(e);
                }
            }
        }

        let vbo = match ctx.create_buffer() {
            Ok(vbo) => vbo,
            Err(e) => {
                release_all(ctx, &mut passes);
                return Err(CompileError::Gl(e));
            }
        };

        let mut chain = Self {
            passes,
            luts,
            parameters,
            prev_frames: Vec::new(),
            vbo,
            frame_count: 0,
            max_prev_frame: 0,
            using_feedback: false,
        };
        if let Err(e) = chain.introspect(ctx) {
            chain.destroy(ctx);
            return Err(e);
        }
        log::info!(
            "built shader chain: {} passes, history depth {}, feedback {}",
            chain.passes.len() - 1,
            chain.max_prev_frame,
            chain.using_feedback
        );
        Ok(chain)
    }

    /// Classify the active uniforms of every compiled pass and allocate
    /// packed blocks and feedback textures.
    fn introspect(&mut self, ctx: &C) -> CompileResult<()> {
        self.max_prev_frame = 0;
        self.using_feedback = false;

        let lut_names: Vec<&str> = self.luts.iter().map(|l| l.id.as_str()).collect();
        let parameter_names: Vec<&str> = self.parameters.iter().map(|p| p.id.as_str()).collect();
        let aliases: Vec<Option<&str>> = self.passes.iter().map(|p| p.alias.as_deref()).collect();

        let mut classified = Vec::with_capacity(self.passes.len());
        let mut feedback_refs = Vec::new();
        for (i, pass) in self.passes.iter().enumerate().skip(1) {
            let Some(program) = pass.program else {
                continue;
            };
            let cctx = ClassifyContext {
                pass_index: i,
                lut_names: &lut_names,
                pass_aliases: &aliases,
                parameter_names: &parameter_names,
            };

            let mut uniforms = Vec::new();
            let mut block_indices = Vec::new();
            for active in ctx.active_uniforms(program) {
                let Some(semantic) = classify(&active.name, &cctx) else {
                    log::debug!("pass {i}: uniform {} left unbound", active.name);
                    continue;
                };
                let storage = match active.location {
                    Some(location) => UniformStorage::Direct { location },
                    None => {
                        let index = active.block_index.unwrap_or(0);
                        if !block_indices.contains(&index) {
                            block_indices.push(index);
                        }
                        UniformStorage::Packed {
                            offset: active.offset,
                        }
                    }
                };
                match semantic.role {
                    UniformRole::PreviousFrameTexture | UniformRole::PreviousFrameSize => {
                        self.max_prev_frame = self.max_prev_frame.max(semantic.index);
                    }
                    UniformRole::Feedback => feedback_refs.push(semantic.index),
                    _ => {}
                }
                uniforms.push(BoundUniform { semantic, storage });
            }
            classified.push((i, program, uniforms, block_indices));
        }

        for (i, program, uniforms, block_indices) in classified {
            let block = if block_indices.is_empty() {
                None
            } else {
                let size = block_indices
                    .iter()
                    .map(|&b| ctx.uniform_block_size(program, b))
                    .max()
                    .unwrap_or(0);
                let buffer = ctx.create_buffer().map_err(CompileError::Gl)?;
                Some(UniformBlock {
                    buffer,
                    data: vec![0; size],
                    block_indices,
                })
            };
            let pass = &mut self.passes[i];
            pass.uniforms = uniforms;
            pass.uniform_block = block;
        }

        for index in feedback_refs {
            match self.passes.get_mut(index) {
                Some(pass) => {
                    pass.uses_feedback = true;
                    self.using_feedback = true;
                }
                None => log::warn!("feedback requested from missing pass {index}"),
            }
        }
        if self.using_feedback {
            for pass in self.passes.iter_mut().skip(1).filter(|p| p.uses_feedback) {
                let current = ctx.create_texture().map_err(CompileError::Gl)?;
                let previous = match ctx.create_texture() {
                    Ok(previous) => previous,
                    Err(e) => {
                        ctx.delete_texture(current);
                        return Err(CompileError::Gl(e));
                    }
                };
                pass.feedback = Some(FeedbackTextures { current, previous });
            }
        }
        Ok(())
    }

    /// Bind geometry, textures and uniform values for pass `index`.
    ///
    /// The pass's program must already be in use.
    pub fn set_shader_vars(&mut self, ctx: &C, index: usize, inverted: bool) {
        let Some(program) = self.passes.get(index).and_then(|p| p.program) else {
            return;
        };
        binder::bind_quad(ctx, self.vbo, program, &self.passes[index].attributes, inverted);

        let mut block = self.passes[index].uniform_block.take();
        let resources = BindResources {
            passes: &self.passes,
            luts: &self.luts,
            prev_frames: &self.prev_frames,
            parameters: &self.parameters,
            frame_count: self.frame_count,
        };
        binder::write_uniforms(
            ctx,
            &self.passes[index].uniforms,
            block.as_mut().map(|b| b.data.as_mut_slice()),
            &resources,
        );
        if let Some(block) = &block {
            binder::upload_block(ctx, program, block);
        }
        self.passes[index].uniform_block = block;
    }

    pub fn clear_shader_vars(&self, ctx: &C) {
        binder::clear(ctx);
    }

    /// Advance the frame counter; wraps on overflow.
    pub fn end_frame(&mut self) {
        self.frame_count = self.frame_count.wrapping_add(1);
    }

    /// Texture pass `index` must render into this frame, for passes whose
    /// output is sampled as feedback. The host sizes it and records it with
    /// [`set_pass_output`](Self::set_pass_output) like any other target.
    pub fn feedback_target(&self, index: usize) -> Option<C::Texture> {
        self.passes.get(index)?.feedback.map(|f| f.current)
    }

    /// Call after a frame: this frame's feedback targets become the textures
    /// sampled as feedback next frame.
    pub fn swap_feedback(&mut self) {
        for feedback in self.passes.iter_mut().filter_map(|p| p.feedback.as_mut()) {
            std::mem::swap(&mut feedback.current, &mut feedback.previous);
        }
    }

    pub fn set_original(&mut self, texture: C::Texture, width: u32, height: u32) {
        self.passes[0].output = FrameTexture::new(texture, width, height);
    }

    /// Record the render target of pass `index`. Returns false if there is
    /// no such pass.
    pub fn set_pass_output(&mut self, index: usize, texture: C::Texture, width: u32, height: u32) -> bool {
        match self.passes.get_mut(index) {
            Some(pass) => {
                pass.output = FrameTexture::new(texture, width, height);
                true
            }
            None => false,
        }
    }

    /// Previous final frames, most recent first.
    pub fn set_previous_frames(&mut self, frames: Vec<FrameTexture<C::Texture>>) {
        self.prev_frames = frames;
    }

    pub fn set_parameter(&mut self, id: &str, value: f32) -> bool {
        match self.parameters.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.value = value;
                true
            }
            None => false,
        }
    }

    pub fn passes(&self) -> &[Pass<C>] {
        &self.passes
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Deepest `OriginalHistoryN` any pass samples.
    pub fn max_prev_frame(&self) -> usize {
        self.max_prev_frame
    }

    pub fn using_feedback(&self) -> bool {
        self.using_feedback
    }

    /// Delete every program, buffer and texture the chain created.
    pub fn destroy(mut self, ctx: &C) {
        release_all(ctx, &mut self.passes);
        ctx.delete_buffer(self.vbo);
    }
}

fn build_pass<C: GlContext>(
    ctx: &C,
    source: &PassSource,
    options: &CompileOptions,
) -> CompileResult<Pass<C>> {
    let vertex = compile_slang(&source.lines, SlangStage::Vertex, options)?;
    let fragment = compile_slang(&source.lines, SlangStage::Fragment, options)?;
    let program = build_program(ctx, &vertex, &fragment)?;

    let alias = source
        .alias
        .clone()
        .or_else(|| parse_pragmas(&source.lines).alias);
    Ok(Pass {
        program: Some(program),
        alias,
        attributes: VertexAttributes::from_vertex_stage(&vertex),
        ..Pass::original()
    })
}

fn release_all<C: GlContext>(ctx: &C, passes: &mut [Pass<C>]) {
    for pass in passes {
        pass.release(ctx);
    }
}
