//! Cross-compiling slang stages to the GLSL dialect of the active context.
//!
//! The pipeline per stage is: include check, combined-sampler split, naga
//! GLSL front-end, fragment coordinate remap, validation, resource-limit
//! check, SPIR-V lowering and finally GLSL emission at the context's version.

use naga::back::glsl;

use crate::shader::{
    error::{CompileError, CompileResult},
    stage::{SlangStage, extract_stage},
    toolchain::ShaderToolchain,
};

const ENTRY_POINT: &str = "main";
const FRAG_COORD_INPUT: &str = "FragCoord";
const METADATA_PRAGMAS: [&str; 3] = ["#pragma name", "#pragma parameter", "#pragma format"];
const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];
/// Combined sampler types and the texture type each one splits into.
const COMBINED_SAMPLERS: [(&str, &str); 4] = [
    ("sampler2D", "texture2D"),
    ("sampler2DArray", "texture2DArray"),
    ("sampler3D", "texture3D"),
    ("samplerCube", "textureCube"),
];

/// Shading language capability of the rendering context.
///
/// `factor` is the context version with the dot removed (GL 3.3 -> 33).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextVersion {
    pub factor: u32,
    pub embedded: bool,
}

impl ContextVersion {
    pub fn desktop(factor: u32) -> Self {
        Self {
            factor,
            embedded: false,
        }
    }

    pub fn glsl_version(self) -> CompileResult<glsl::Version> {
        let raw = if self.embedded {
            self.factor * 10
        } else {
            target_glsl_version(self.factor)
        };
        let version = u16::try_from(raw).map_err(|_| CompileError::Emit {
            version: u16::MAX,
            message: format!("GLSL version {raw} out of range"),
        })?;
        Ok(if self.embedded {
            glsl::Version::Embedded {
                version,
                is_webgl: false,
            }
        } else {
            glsl::Version::Desktop(version)
        })
    }
}

/// Desktop GLSL version emitted for a context version factor.
///
/// Versions strictly between 150 and 330 only partially support the features
/// the emitted code relies on, so they drop to 150.
pub fn target_glsl_version(factor: u32) -> u32 {
    let version = factor * 10;
    if version > 150 && version < 330 {
        150
    } else {
        version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub context: ContextVersion,
}

/// Counts of block resources a stage declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub uniform_buffers: usize,
    pub push_constants: usize,
}

impl ResourceCounts {
    pub fn from_module(module: &naga::Module) -> Self {
        let mut counts = Self::default();
        for (_, global) in module.global_variables.iter() {
            match global.space {
                naga::AddressSpace::Uniform => counts.uniform_buffers += 1,
                naga::AddressSpace::PushConstant => counts.push_constants += 1,
                _ => {}
            }
        }
        counts
    }

    /// At most one uniform block and one push constant block per stage.
    pub fn check(self) -> CompileResult<()> {
        if self.uniform_buffers > 1 || self.push_constants > 1 {
            return Err(CompileError::ResourceLimit {
                uniform_buffers: self.uniform_buffers,
                push_constants: self.push_constants,
            });
        }
        Ok(())
    }
}

/// A named vertex stage input and the attribute name it is emitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
}

impl VertexInput {
    /// Attribute name the GLSL back-end gives a pipeline-to-vertex input.
    pub fn emitted_name(&self) -> String {
        format!("_p2vs_location{}", self.location)
    }
}

/// Output of a successful cross-compile.
#[derive(Debug, Clone)]
pub struct CrossCompiled {
    pub stage: SlangStage,
    pub version: glsl::Version,
    /// SPIR-V lowering of the validated stage.
    pub spirv: Vec<u32>,
    /// GLSL for the active context.
    pub source: String,
    /// Texture names and uniform/push block member names, in declaration order.
    pub resource_names: Vec<String>,
    /// Declared vertex inputs; empty for fragment stages.
    pub vertex_inputs: Vec<VertexInput>,
}

impl CrossCompiled {
    /// Emitted attribute name for the vertex input declared as `name`.
    pub fn attribute_name(&self, name: &str) -> Option<String> {
        self.vertex_inputs
            .iter()
            .find(|input| input.name == name)
            .map(VertexInput::emitted_name)
    }
}

/// Extract `stage` from a combined slang source and cross-compile it.
///
/// Failures are logged before being returned.
pub fn compile_slang<S: AsRef<str>>(
    lines: &[S],
    stage: SlangStage,
    options: &CompileOptions,
) -> CompileResult<CrossCompiled> {
    let source = extract_stage(lines, stage.pragma_name());
    compile_stage(&source, stage, options).inspect_err(|e| {
        log::error!("slang {} stage failed to compile: {e}", stage.pragma_name());
    })
}

pub fn compile_stage(
    source: &str,
    stage: SlangStage,
    options: &CompileOptions,
) -> CompileResult<CrossCompiled> {
    let toolchain = ShaderToolchain::ensure_initialized();

    reject_includes(source)?;
    let (source, combined) = split_combined_samplers(&strip_metadata_pragmas(source));

    let mut frontend = naga::front::glsl::Frontend::default();
    let mut module = frontend
        .parse(&naga::front::glsl::Options::from(stage.naga()), &source)
        .map_err(|errors| {
            let messages: Vec<String> = errors
                .errors
                .iter()
                .map(|e| format!("  {:?}", e.kind))
                .collect();
            CompileError::Parse(messages.join("\n"))
        })?;

    if stage == SlangStage::Fragment {
        let remapped = remap_frag_coord(&mut module);
        if remapped > 0 {
            log::debug!("remapped {remapped} FragCoord input(s) to gl_FragCoord");
        }
    }

    let info = toolchain
        .validator()
        .validate(&module)
        .map_err(|e| CompileError::Link(format!("{e:?}")))?;

    ResourceCounts::from_module(&module).check()?;

    let spirv = naga::back::spv::write_vec(
        &module,
        &info,
        &naga::back::spv::Options::default(),
        Some(&naga::back::spv::PipelineOptions {
            shader_stage: stage.naga(),
            entry_point: ENTRY_POINT.to_string(),
        }),
    )
    .map_err(|e| CompileError::Lower(format!("{e:?}")))?;

    let version = options.context.glsl_version()?;
    let emit_err = |message: String| CompileError::Emit {
        version: match version {
            glsl::Version::Desktop(v) => v,
            glsl::Version::Embedded { version, .. } => version,
        },
        message,
    };

    let glsl_options = glsl::Options {
        version,
        writer_flags: glsl::WriterFlags::empty(),
        ..glsl::Options::default()
    };
    let pipeline_options = glsl::PipelineOptions {
        shader_stage: stage.naga(),
        entry_point: ENTRY_POINT.to_string(),
        multiview: None,
    };

    let mut emitted = String::new();
    let reflection = {
        let mut writer = glsl::Writer::new(
            &mut emitted,
            &module,
            &info,
            &glsl_options,
            &pipeline_options,
            naga::proc::BoundsCheckPolicies::default(),
        )
        .map_err(|e| emit_err(format!("{e:?}")))?;
        writer.write().map_err(|e| emit_err(format!("{e:?}")))?
    };

    let source = restore_texture_names(emitted, &module, &reflection, &combined);
    Ok(CrossCompiled {
        stage,
        version,
        spirv,
        source,
        resource_names: declared_resource_names(&module, &combined),
        vertex_inputs: vertex_inputs(&module),
    })
}

fn reject_includes(source: &str) -> CompileResult<()> {
    for (n, line) in source.lines().enumerate() {
        let directive = line
            .trim_start()
            .strip_prefix('#')
            .map(str::trim_start);
        if directive.is_some_and(|d| d.starts_with("include")) {
            return Err(CompileError::Preprocess(format!(
                "line {}: #include is not allowed in slang stages",
                n + 1
            )));
        }
    }
    Ok(())
}

/// Blank out `#pragma name` and `#pragma parameter` lines, keeping line
/// numbers stable for front-end diagnostics.
fn strip_metadata_pragmas(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !METADATA_PRAGMAS.iter().any(|p| trimmed.starts_with(p)) {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Rebind fragment inputs called `FragCoord` to the fragment position builtin.
///
/// Some converted shaders declare it as a plain input that the vertex stage
/// never writes.
fn remap_frag_coord(module: &mut naga::Module) -> usize {
    let mut remapped = 0;
    for entry in module
        .entry_points
        .iter_mut()
        .filter(|ep| ep.stage == naga::ShaderStage::Fragment)
    {
        for arg in &mut entry.function.arguments {
            let is_location = matches!(arg.binding, Some(naga::Binding::Location { .. }));
            if is_location && arg.name.as_deref() == Some(FRAG_COORD_INPUT) {
                arg.binding = Some(naga::Binding::BuiltIn(naga::BuiltIn::Position {
                    invariant: false,
                }));
                remapped += 1;
            }
        }
    }
    remapped
}

/// A `uniform sampler2D NAME;` declaration split into a texture and a
/// sampler the front-end accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CombinedSampler {
    name: String,
    texture: String,
}

impl CombinedSampler {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            texture: format!("{name}_texture"),
        }
    }

    fn sampler(&self) -> String {
        format!("{}_sampler", self.name)
    }
}

/// Declared name of a texture global, undoing the combined-sampler split.
fn texture_name<'a>(declared: &'a str, combined: &'a [CombinedSampler]) -> &'a str {
    combined
        .iter()
        .find(|c| c.texture == declared)
        .map_or(declared, |c| c.name.as_str())
}

/// A parsed `[layout(...)] uniform [precision] samplerXX NAME;` line.
#[derive(Debug, PartialEq, Eq)]
struct SamplerDecl<'a> {
    layout: &'a str,
    precision: Option<&'a str>,
    sampler_ty: &'a str,
    texture_ty: &'a str,
    name: &'a str,
}

fn parse_combined_sampler(line: &str) -> Option<SamplerDecl<'_>> {
    let line = line.trim();
    let (layout, rest) = if line.starts_with("layout") {
        let end = line.find(')')? + 1;
        (&line[..end], &line[end..])
    } else {
        ("", line)
    };
    let rest = rest.trim_start().strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut tokens = rest.trim().strip_suffix(';')?.split_whitespace();
    let mut ty = tokens.next()?;
    let mut precision = None;
    if PRECISIONS.contains(&ty) {
        precision = Some(ty);
        ty = tokens.next()?;
    }
    let name = tokens.next()?;
    let is_ident = name.bytes().all(is_ident_byte) && !name.starts_with(|c: char| c.is_ascii_digit());
    if tokens.next().is_some() || !is_ident {
        return None;
    }
    let &(sampler_ty, texture_ty) = COMBINED_SAMPLERS.iter().find(|(s, _)| *s == ty)?;
    Some(SamplerDecl {
        layout,
        precision,
        sampler_ty,
        texture_ty,
        name,
    })
}

/// Rewrite combined sampler declarations into a texture, a sampler and a
/// `#define` that rebuilds the combined sampler wherever the name is used.
///
/// Each rewritten declaration adds one line.
fn split_combined_samplers(source: &str) -> (String, Vec<CombinedSampler>) {
    let mut out = String::with_capacity(source.len());
    let mut combined = Vec::new();
    for line in source.lines() {
        let Some(decl) = parse_combined_sampler(line) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let layout = if decl.layout.is_empty() {
            String::new()
        } else {
            format!("{} ", decl.layout)
        };
        let precision = decl.precision.map(|p| format!("{p} ")).unwrap_or_default();
        let split = CombinedSampler::new(decl.name);
        let (texture, sampler) = (&split.texture, split.sampler());
        out.push_str(&format!(
            "{layout}uniform {precision}{} {texture}; {layout}uniform sampler {sampler};\n",
            decl.texture_ty
        ));
        out.push_str(&format!(
            "#define {} {}({texture}, {sampler})\n",
            decl.name, decl.sampler_ty
        ));
        combined.push(split);
    }
    (out, combined)
}

fn restore_texture_names(
    mut source: String,
    module: &naga::Module,
    reflection: &glsl::ReflectionInfo,
    combined: &[CombinedSampler],
) -> String {
    let mut renames: Vec<(&str, &str)> = reflection
        .texture_mapping
        .iter()
        .filter_map(|(generated, mapping)| {
            let declared = module.global_variables[mapping.texture].name.as_deref()?;
            Some((generated.as_str(), texture_name(declared, combined)))
        })
        .collect();
    renames.sort_unstable();
    for (generated, declared) in renames {
        source = replace_identifier(&source, generated, declared);
    }
    source
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Replace whole-identifier occurrences of `from` with `to`.
pub(crate) fn replace_identifier(source: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return source.to_string();
    }
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (start, _) in source.match_indices(from) {
        if start < last {
            continue;
        }
        let end = start + from.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            out.push_str(&source[last..start]);
            out.push_str(to);
            last = end;
        }
    }
    out.push_str(&source[last..]);
    out
}

fn vertex_inputs(module: &naga::Module) -> Vec<VertexInput> {
    module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Vertex)
        .flat_map(|ep| &ep.function.arguments)
        .filter_map(|arg| match (&arg.name, &arg.binding) {
            (Some(name), Some(naga::Binding::Location { location, .. })) => Some(VertexInput {
                name: name.clone(),
                location: *location,
            }),
            _ => None,
        })
        .collect()
}

fn declared_resource_names(module: &naga::Module, combined: &[CombinedSampler]) -> Vec<String> {
    let mut names = Vec::new();
    for (_, global) in module.global_variables.iter() {
        let inner = &module.types[global.ty].inner;
        match global.space {
            naga::AddressSpace::Uniform | naga::AddressSpace::PushConstant => match inner {
                naga::TypeInner::Struct { members, .. } => {
                    names.extend(members.iter().filter_map(|m| m.name.clone()));
                }
                _ => names.extend(global.name.clone()),
            },
            naga::AddressSpace::Handle => {
                if let (naga::TypeInner::Image { .. }, Some(name)) = (inner, &global.name) {
                    names.push(texture_name(name, combined).to_string());
                }
            }
            _ => {}
        }
    }
    names
}
