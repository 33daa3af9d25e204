//! The slice of the rendering context the shader chain talks to.
//!
//! Everything GPU-facing goes through [`GlContext`] so the compile and bind
//! paths can run against `glow` in production and a recorder in tests.

use std::fmt::Debug;

use glow::HasContext;

use crate::shader::{cross::ContextVersion, stage::SlangStage};

/// An active uniform as reported by the driver after linking.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform<L> {
    pub name: String,
    /// Index of the containing uniform block, `None` for default-block uniforms.
    pub block_index: Option<u32>,
    /// Byte offset inside the containing block.
    pub offset: usize,
    /// Standalone location; `None` when the uniform only lives in a block.
    pub location: Option<L>,
}

/// A value written to a standalone uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec4([f32; 4]),
    Mat4(&'a [f32; 16]),
}

pub trait GlContext {
    type Shader: Copy + Debug;
    type Program: Copy + Debug;
    type Buffer: Copy + Debug;
    type Texture: Copy + Debug + PartialEq;
    type UniformLocation: Clone + Debug;

    fn context_version(&self) -> ContextVersion;

    fn create_shader(&self, stage: SlangStage) -> Result<Self::Shader, String>;
    /// Upload `source` and compile it; returns the compile status.
    fn compile_shader(&self, shader: Self::Shader, source: &str) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    /// Attach `shaders`, link, detach them again; returns the link status.
    fn link_program(&self, program: Self::Program, shaders: &[Self::Shader]) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform<Self::UniformLocation>>;
    fn uniform_block_size(&self, program: Self::Program, block_index: u32) -> usize;
    fn uniform_block_binding(&self, program: Self::Program, block_index: u32, binding: u32);

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);

    fn bind_vertex_buffer(&self, buffer: Option<Self::Buffer>);
    /// Replace the contents of the bound vertex buffer.
    fn vertex_buffer_data(&self, data: &[u8]);
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    /// Enable `index` and point it at float data in the bound vertex buffer.
    fn enable_vertex_attrib(&self, index: u32, components: i32, byte_offset: i32);
    fn disable_vertex_attrib(&self, index: u32);

    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>);
    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue<'_>);

    /// Upload `data` into `buffer` and bind it to uniform buffer `binding`.
    fn upload_uniform_buffer(&self, buffer: Self::Buffer, data: &[u8], binding: u32);
    fn unbind_uniform_buffer(&self, binding: u32);
}

impl GlContext for glow::Context {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type UniformLocation = glow::UniformLocation;

    fn context_version(&self) -> ContextVersion {
        let version = self.version();
        ContextVersion {
            factor: version.major * 10 + version.minor,
            embedded: version.is_embedded,
        }
    }

    fn create_shader(&self, stage: SlangStage) -> Result<Self::Shader, String> {
        let kind = match stage {
            SlangStage::Vertex => glow::VERTEX_SHADER,
            SlangStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { HasContext::create_shader(self, kind) }
    }

    fn compile_shader(&self, shader: Self::Shader, source: &str) -> bool {
        unsafe {
            self.shader_source(shader, source);
            HasContext::compile_shader(self, shader);
            self.get_shader_compile_status(shader)
        }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::delete_shader(self, shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { HasContext::create_program(self) }
    }

    fn link_program(&self, program: Self::Program, shaders: &[Self::Shader]) -> bool {
        unsafe {
            for &shader in shaders {
                self.attach_shader(program, shader);
            }
            HasContext::link_program(self, program);
            for &shader in shaders {
                self.detach_shader(program, shader);
            }
            self.get_program_link_status(program)
        }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.get_program_info_log(program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { HasContext::delete_program(self, program) }
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform<Self::UniformLocation>> {
        unsafe {
            let count = self.get_active_uniforms(program);
            let indices: Vec<u32> = (0..count).collect();
            let block_indices =
                self.get_active_uniforms_parameter(program, &indices, glow::UNIFORM_BLOCK_INDEX);
            let offsets =
                self.get_active_uniforms_parameter(program, &indices, glow::UNIFORM_OFFSET);

            indices
                .iter()
                .filter_map(|&i| {
                    let active = self.get_active_uniform(program, i)?;
                    let location = self.get_uniform_location(program, &active.name);
                    let idx = i as usize;
                    Some(ActiveUniform {
                        block_index: block_indices
                            .get(idx)
                            .and_then(|&b| u32::try_from(b).ok()),
                        offset: offsets
                            .get(idx)
                            .and_then(|&o| usize::try_from(o).ok())
                            .unwrap_or(0),
                        location,
                        name: active.name,
                    })
                })
                .collect()
        }
    }

    fn uniform_block_size(&self, program: Self::Program, block_index: u32) -> usize {
        let size = unsafe {
            self.get_active_uniform_block_parameter_i32(
                program,
                block_index,
                glow::UNIFORM_BLOCK_DATA_SIZE,
            )
        };
        usize::try_from(size).unwrap_or(0)
    }

    fn uniform_block_binding(&self, program: Self::Program, block_index: u32, binding: u32) {
        unsafe { HasContext::uniform_block_binding(self, program, block_index, binding) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { HasContext::create_buffer(self) }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { HasContext::delete_buffer(self, buffer) }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { HasContext::create_texture(self) }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { HasContext::delete_texture(self, texture) }
    }

    fn bind_vertex_buffer(&self, buffer: Option<Self::Buffer>) {
        unsafe { self.bind_buffer(glow::ARRAY_BUFFER, buffer) }
    }

    fn vertex_buffer_data(&self, data: &[u8]) {
        unsafe { self.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.get_attrib_location(program, name) }
    }

    fn enable_vertex_attrib(&self, index: u32, components: i32, byte_offset: i32) {
        unsafe {
            self.enable_vertex_attrib_array(index);
            self.vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, 0, byte_offset);
        }
    }

    fn disable_vertex_attrib(&self, index: u32) {
        unsafe { self.disable_vertex_attrib_array(index) }
    }

    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.active_texture(glow::TEXTURE0 + unit);
            HasContext::bind_texture(self, glow::TEXTURE_2D, texture);
        }
    }

    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue<'_>) {
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.uniform_1_i32(location, v),
                UniformValue::UInt(v) => self.uniform_1_u32(location, v),
                UniformValue::Float(v) => self.uniform_1_f32(location, v),
                UniformValue::Vec4(v) => self.uniform_4_f32_slice(location, &v),
                UniformValue::Mat4(m) => self.uniform_matrix_4_f32_slice(location, false, m),
            }
        }
    }

    fn upload_uniform_buffer(&self, buffer: Self::Buffer, data: &[u8], binding: u32) {
        unsafe {
            self.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            self.buffer_data_u8_slice(glow::UNIFORM_BUFFER, data, glow::DYNAMIC_DRAW);
            self.bind_buffer_base(glow::UNIFORM_BUFFER, binding, Some(buffer));
        }
    }

    fn unbind_uniform_buffer(&self, binding: u32) {
        unsafe {
            self.bind_buffer_base(glow::UNIFORM_BUFFER, binding, None);
            self.bind_buffer(glow::UNIFORM_BUFFER, None);
        }
    }
}
