#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
};

use slang_shader_chain::shader::{ActiveUniform, ContextVersion, GlContext, SlangStage, UniformValue};

/// Combined slang source for one pass: a push constant block with the
/// per-pass sizes and a uniform block with the projection.
pub const BLIT_PASS: &str = r#"#version 450
#pragma name Blit
#pragma parameter STRENGTH "Blend strength" 0.5 0.0 1.0 0.05

layout(push_constant) uniform Push {
    vec4 SourceSize;
    vec4 OutputSize;
    float STRENGTH;
} params;

layout(std140, set = 0, binding = 0) uniform UBO {
    mat4 MVP;
} global;

#pragma stage vertex
layout(location = 0) in vec4 Position;
layout(location = 1) in vec2 TexCoord;
layout(location = 0) out vec2 vTexCoord;

void main() {
    gl_Position = global.MVP * Position;
    vTexCoord = TexCoord;
}

#pragma stage fragment
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 FragColor;
layout(set = 0, binding = 2) uniform texture2D Source;
layout(set = 0, binding = 3) uniform sampler SourceSampler;

void main() {
    vec4 color = texture(sampler2D(Source, SourceSampler), vTexCoord);
    FragColor = color * params.STRENGTH + params.SourceSize * 0.0;
}
"#;

pub fn pass_source(alias: Option<&str>) -> slang_shader_chain::shader::PassSource {
    slang_shader_chain::shader::PassSource::new(BLIT_PASS, alias.map(str::to_string))
}

/// Owned copy of a [`UniformValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
}

impl From<UniformValue<'_>> for Recorded {
    fn from(value: UniformValue<'_>) -> Self {
        match value {
            UniformValue::Int(v) => Recorded::Int(v),
            UniformValue::UInt(v) => Recorded::UInt(v),
            UniformValue::Float(v) => Recorded::Float(v),
            UniformValue::Vec4(v) => Recorded::Vec4(v),
            UniformValue::Mat4(m) => Recorded::Mat4(*m),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    VertexData(usize),
    EnableAttrib { index: u32, components: i32, offset: i32 },
    DisableAttrib(u32),
    BindTexture { unit: u32, texture: Option<u32> },
    SetUniform { location: u32, value: Recorded },
    Upload { buffer: u32, data: Vec<u8>, binding: u32 },
    BlockBinding { program: u32, block: u32, binding: u32 },
    UnbindUniformBuffer(u32),
}

/// Active uniforms and block size reported for one linked program.
#[derive(Debug, Clone, Default)]
pub struct LinkedProgram {
    pub uniforms: Vec<ActiveUniform<u32>>,
    pub block_size: usize,
}

pub fn direct(name: &str, location: u32) -> ActiveUniform<u32> {
    ActiveUniform {
        name: name.to_string(),
        block_index: None,
        offset: 0,
        location: Some(location),
    }
}

pub fn packed(name: &str, block: u32, offset: usize) -> ActiveUniform<u32> {
    ActiveUniform {
        name: name.to_string(),
        block_index: Some(block),
        offset,
        location: None,
    }
}

#[derive(Default)]
struct State {
    next_handle: u32,
    calls: Vec<Call>,
    shaders: HashSet<u32>,
    programs: HashSet<u32>,
    buffers: HashSet<u32>,
    textures: HashSet<u32>,
    deleted_textures: Vec<u32>,
    pending_programs: VecDeque<LinkedProgram>,
    linked: HashMap<u32, LinkedProgram>,
    shader_sources: Vec<String>,
}

/// A recording [`GlContext`] with `u32` handles.
pub struct MockGl {
    pub version: ContextVersion,
    pub fail_compile: Option<SlangStage>,
    pub fail_link: bool,
    state: RefCell<State>,
    shader_stages: RefCell<HashMap<u32, SlangStage>>,
}

impl MockGl {
    pub fn new(linked: Vec<LinkedProgram>) -> Self {
        Self {
            version: ContextVersion::desktop(33),
            fail_compile: None,
            fail_link: false,
            state: RefCell::new(State {
                next_handle: 1,
                pending_programs: linked.into(),
                ..State::default()
            }),
            shader_stages: RefCell::new(HashMap::new()),
        }
    }

    fn alloc(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn shader_sources(&self) -> Vec<String> {
        self.state.borrow().shader_sources.clone()
    }

    /// Number of shaders, programs, buffers and textures still alive.
    pub fn live_objects(&self) -> usize {
        let s = self.state.borrow();
        s.shaders.len() + s.programs.len() + s.buffers.len() + s.textures.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Every handle passed to `delete_texture`, in call order.
    pub fn deleted_textures(&self) -> Vec<u32> {
        self.state.borrow().deleted_textures.clone()
    }

    /// Hand out a texture handle the way a host would for render targets.
    pub fn host_texture(&self) -> u32 {
        self.alloc() + 10_000
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl GlContext for MockGl {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type Texture = u32;
    type UniformLocation = u32;

    fn context_version(&self) -> ContextVersion {
        self.version
    }

    fn create_shader(&self, stage: SlangStage) -> Result<u32, String> {
        let shader = self.alloc();
        self.state.borrow_mut().shaders.insert(shader);
        self.shader_stages.borrow_mut().insert(shader, stage);
        Ok(shader)
    }

    fn compile_shader(&self, shader: u32, source: &str) -> bool {
        self.state.borrow_mut().shader_sources.push(source.to_string());
        let stage = self.shader_stages.borrow().get(&shader).copied();
        stage != self.fail_compile
    }

    fn shader_info_log(&self, shader: u32) -> String {
        let stage = self.shader_stages.borrow().get(&shader).copied();
        if stage.is_some() && stage == self.fail_compile {
            "0:1: error: mock compile failure".to_string()
        } else {
            String::new()
        }
    }

    fn delete_shader(&self, shader: u32) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    fn create_program(&self) -> Result<u32, String> {
        let program = self.alloc();
        let mut state = self.state.borrow_mut();
        state.programs.insert(program);
        let linked_program = state.pending_programs.pop_front().unwrap_or_default();
        state.linked.insert(program, linked_program);
        Ok(program)
    }

    fn link_program(&self, _program: u32, shaders: &[u32]) -> bool {
        assert_eq!(shaders.len(), 2);
        !self.fail_link
    }

    fn program_info_log(&self, _program: u32) -> String {
        if self.fail_link {
            "mock link failure".to_string()
        } else {
            String::new()
        }
    }

    fn delete_program(&self, program: u32) {
        self.state.borrow_mut().programs.remove(&program);
    }

    fn active_uniforms(&self, program: u32) -> Vec<ActiveUniform<u32>> {
        self.state
            .borrow()
            .linked
            .get(&program)
            .map(|s| s.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_block_size(&self, program: u32, _block_index: u32) -> usize {
        self.state
            .borrow()
            .linked
            .get(&program)
            .map_or(0, |s| s.block_size)
    }

    fn uniform_block_binding(&self, program: u32, block_index: u32, binding: u32) {
        self.record(Call::BlockBinding {
            program,
            block: block_index,
            binding,
        });
    }

    fn create_buffer(&self) -> Result<u32, String> {
        let buffer = self.alloc();
        self.state.borrow_mut().buffers.insert(buffer);
        Ok(buffer)
    }

    fn delete_buffer(&self, buffer: u32) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn create_texture(&self) -> Result<u32, String> {
        let texture = self.alloc();
        self.state.borrow_mut().textures.insert(texture);
        Ok(texture)
    }

    fn delete_texture(&self, texture: u32) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.deleted_textures.push(texture);
    }

    fn bind_vertex_buffer(&self, _buffer: Option<u32>) {}

    fn vertex_buffer_data(&self, data: &[u8]) {
        self.record(Call::VertexData(data.len()));
    }

    fn attrib_location(&self, _program: u32, name: &str) -> Option<u32> {
        name.strip_prefix("_p2vs_location")?.parse().ok()
    }

    fn enable_vertex_attrib(&self, index: u32, components: i32, byte_offset: i32) {
        self.record(Call::EnableAttrib {
            index,
            components,
            offset: byte_offset,
        });
    }

    fn disable_vertex_attrib(&self, index: u32) {
        self.record(Call::DisableAttrib(index));
    }

    fn bind_texture(&self, unit: u32, texture: Option<u32>) {
        self.record(Call::BindTexture { unit, texture });
    }

    fn set_uniform(&self, location: &u32, value: UniformValue<'_>) {
        self.record(Call::SetUniform {
            location: *location,
            value: value.into(),
        });
    }

    fn upload_uniform_buffer(&self, buffer: u32, data: &[u8], binding: u32) {
        self.record(Call::Upload {
            buffer,
            data: data.to_vec(),
            binding,
        });
    }

    fn unbind_uniform_buffer(&self, binding: u32) {
        self.record(Call::UnbindUniformBuffer(binding));
    }
}

pub fn read_f32(data: &[u8], offset: usize) -> f32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    f32::from_ne_bytes(bytes)
}
