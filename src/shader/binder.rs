//! Per-frame state upload for one pass: quad geometry, textures, sizes,
//! matrices and scalar parameters.

use crate::shader::{
    chain::{FrameTexture, LookupTexture, Parameter, Pass, VertexAttributes},
    gl::{GlContext, UniformValue},
    semantics::{BoundUniform, Semantic, UniformRole, UniformStorage},
};

/// Quad positions (xyzw), then regular and vertically inverted texcoords.
#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; 32] = [
    0.0, 0.0, 0.0, 1.0,
    1.0, 0.0, 0.0, 1.0,
    0.0, 1.0, 0.0, 1.0,
    1.0, 1.0, 0.0, 1.0,
    // regular
    0.0, 0.0,
    1.0, 0.0,
    0.0, 1.0,
    1.0, 1.0,
    // inverted
    0.0, 1.0,
    1.0, 1.0,
    0.0, 0.0,
    1.0, 0.0,
];

/// Column-major orthographic projection mapping the unit quad to clip space.
#[rustfmt::skip]
pub const MVP_ORTHO: [f32; 16] = [
     2.0,  0.0,  0.0, 0.0,
     0.0,  2.0,  0.0, 0.0,
     0.0,  0.0, -1.0, 0.0,
    -1.0, -1.0,  0.0, 1.0,
];

/// Uniform buffer binding point every packed block is attached to.
pub const UNIFORM_BLOCK_BINDING: u32 = 0;

pub const POSITION_ATTRIB_INDEX: u32 = 0;
pub const TEX_COORD_ATTRIB_INDEX: u32 = 1;

const FLOAT_BYTES: i32 = std::mem::size_of::<f32>() as i32;
const TEX_COORD_OFFSET: i32 = 16 * FLOAT_BYTES;
const INVERTED_TEX_COORD_OFFSET: i32 = 24 * FLOAT_BYTES;

/// CPU copy of a pass's packed uniform block and the buffer it uploads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock<B> {
    pub buffer: B,
    pub data: Vec<u8>,
    /// Program block indices attached to [`UNIFORM_BLOCK_BINDING`].
    pub block_indices: Vec<u32>,
}

/// Everything a pass's uniforms may refer to while binding.
pub struct BindResources<'a, C: GlContext> {
    pub passes: &'a [Pass<C>],
    pub luts: &'a [LookupTexture<C::Texture>],
    pub prev_frames: &'a [FrameTexture<C::Texture>],
    pub parameters: &'a [Parameter],
    pub frame_count: u32,
}

impl<C: GlContext> BindResources<'_, C> {
    fn texture(&self, semantic: Semantic) -> Option<C::Texture> {
        match semantic.role {
            UniformRole::PassTexture => self.passes.get(semantic.index)?.output.texture,
            UniformRole::PreviousFrameTexture => {
                self.prev_frames.get(semantic.index.checked_sub(1)?)?.texture
            }
            UniformRole::LutTexture => Some(self.luts.get(semantic.index)?.texture),
            UniformRole::Feedback => self.passes.get(semantic.index)?.feedback.map(|f| f.previous),
            _ => None,
        }
    }

    fn size(&self, semantic: Semantic) -> [f32; 4] {
        let frame = match semantic.role {
            UniformRole::PassSize => self.passes.get(semantic.index).map(|p| p.output.size()),
            UniformRole::PreviousFrameSize => {
                let depth = semantic.index.max(1);
                self.prev_frames.get(depth - 1).map(FrameTexture::size)
            }
            UniformRole::LutSize => self.luts.get(semantic.index).map(LookupTexture::size),
            _ => None,
        };
        frame.map_or([0.0; 4], size_vec4)
    }

    fn parameter(&self, index: usize) -> f32 {
        self.parameters.get(index).map_or(0.0, |p| p.value)
    }
}

/// `{width, height, 1/width, 1/height}`.
pub fn size_vec4((width, height): (u32, u32)) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    [w, h, 1.0 / w, 1.0 / h]
}

/// Upload the quad and point the pass's vertex attributes at it.
pub fn bind_quad<C: GlContext>(
    ctx: &C,
    vbo: C::Buffer,
    program: C::Program,
    attributes: &VertexAttributes,
    inverted: bool,
) {
    ctx.bind_vertex_buffer(Some(vbo));
    ctx.vertex_buffer_data(bytemuck::cast_slice(&QUAD_VERTICES));

    if let Some(attr) = ctx.attrib_location(program, &attributes.position) {
        ctx.enable_vertex_attrib(attr, 4, 0);
    }
    if let Some(attr) = ctx.attrib_location(program, &attributes.tex_coord) {
        let offset = if inverted {
            INVERTED_TEX_COORD_OFFSET
        } else {
            TEX_COORD_OFFSET
        };
        ctx.enable_vertex_attrib(attr, 2, offset);
    }

    ctx.bind_vertex_buffer(None);
}

/// Write every classified uniform of a pass, in list order.
///
/// Texture uniforms take consecutive texture units starting at 0. Packed
/// uniforms land in `block`; standalone ones are written through `ctx`.
pub fn write_uniforms<C: GlContext>(
    ctx: &C,
    uniforms: &[BoundUniform<C::UniformLocation>],
    mut block: Option<&mut [u8]>,
    resources: &BindResources<'_, C>,
) {
    let mut unit: u32 = 0;
    for uniform in uniforms {
        let semantic = uniform.semantic;
        let mut write = |value: UniformValue<'_>| match &uniform.storage {
            UniformStorage::Direct { location } => ctx.set_uniform(location, value),
            UniformStorage::Packed { offset } => {
                if let Some(block) = block.as_deref_mut() {
                    write_packed(block, *offset, value);
                }
            }
        };

        match semantic.role {
            UniformRole::PassTexture
            | UniformRole::PreviousFrameTexture
            | UniformRole::LutTexture
            | UniformRole::Feedback => {
                ctx.bind_texture(unit, resources.texture(semantic));
                write(UniformValue::Int(unit as i32));
                unit += 1;
            }
            UniformRole::PassSize | UniformRole::PreviousFrameSize | UniformRole::LutSize => {
                write(UniformValue::Vec4(resources.size(semantic)));
            }
            UniformRole::Mvp => write(UniformValue::Mat4(&MVP_ORTHO)),
            UniformRole::FrameCount => write(UniformValue::UInt(resources.frame_count)),
            UniformRole::Parameter => {
                write(UniformValue::Float(resources.parameter(semantic.index)));
            }
        }
    }
}

fn write_packed(block: &mut [u8], offset: usize, value: UniformValue<'_>) {
    let bytes: &[u8] = match &value {
        UniformValue::Int(v) => bytemuck::bytes_of(v),
        UniformValue::UInt(v) => bytemuck::bytes_of(v),
        UniformValue::Float(v) => bytemuck::bytes_of(v),
        UniformValue::Vec4(v) => bytemuck::cast_slice(v),
        UniformValue::Mat4(m) => bytemuck::cast_slice(&m[..]),
    };
    let dst = offset
        .checked_add(bytes.len())
        .and_then(|end| block.get_mut(offset..end));
    match dst {
        Some(dst) => dst.copy_from_slice(bytes),
        None => log::debug!(
            "packed uniform at offset {offset} overruns {} byte block",
            block.len()
        ),
    }
}

/// Upload the whole block and attach it to [`UNIFORM_BLOCK_BINDING`].
pub fn upload_block<C: GlContext>(ctx: &C, program: C::Program, block: &UniformBlock<C::Buffer>) {
    if block.data.is_empty() {
        return;
    }
    ctx.upload_uniform_buffer(block.buffer, &block.data, UNIFORM_BLOCK_BINDING);
    for &index in &block.block_indices {
        ctx.uniform_block_binding(program, index, UNIFORM_BLOCK_BINDING);
    }
}

/// Leave no vertex attribute or uniform buffer state behind.
pub fn clear<C: GlContext>(ctx: &C) {
    ctx.disable_vertex_attrib(POSITION_ATTRIB_INDEX);
    ctx.disable_vertex_attrib(TEX_COORD_ATTRIB_INDEX);
    ctx.unbind_uniform_buffer(UNIFORM_BLOCK_BINDING);
}
