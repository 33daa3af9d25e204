use std::path::PathBuf;

use anyhow::{Result, anyhow};
use slang_shader_chain::{
    preset::{self, LoadedPreset, PresetDesc},
    shader::{
        ClassifyContext, CompileOptions, ContextVersion, CrossCompiled, PassSource, SlangStage,
        classify, collect_parameters, compile_slang, parse_pragmas,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Emit {
    Vertex,
    Fragment,
    #[default]
    Both,
}

impl Emit {
    fn includes(self, stage: SlangStage) -> bool {
        matches!(
            (self, stage),
            (Emit::Both, _) | (Emit::Vertex, SlangStage::Vertex) | (Emit::Fragment, SlangStage::Fragment)
        )
    }
}

#[derive(Debug, Clone)]
struct Cli {
    preset: Option<PathBuf>,
    shaders: Vec<PathBuf>,
    /// GLSL version the context reports, e.g. 330.
    glsl_version: u32,
    es: bool,
    emit: Emit,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            preset: None,
            shaders: Vec::new(),
            glsl_version: 330,
            es: false,
            emit: Emit::Both,
        }
    }
}

impl Cli {
    fn context(&self) -> ContextVersion {
        ContextVersion {
            factor: self.glsl_version / 10,
            embedded: self.es,
        }
    }
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --preset"));
                };
                cli.preset = Some(PathBuf::from(v));
                i += 2;
            }
            "--shader" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --shader"));
                };
                cli.shaders.push(PathBuf::from(v));
                i += 2;
            }
            "--glsl-version" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --glsl-version"));
                };
                cli.glsl_version = v
                    .parse()
                    .map_err(|e| anyhow!("invalid --glsl-version {v}: {e}"))?;
                i += 2;
            }
            "--es" => {
                cli.es = true;
                i += 1;
            }
            "--emit" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --emit"));
                };
                cli.emit = match v.as_str() {
                    "vertex" => Emit::Vertex,
                    "fragment" => Emit::Fragment,
                    "both" => Emit::Both,
                    other => return Err(anyhow!("invalid --emit {other} (vertex|fragment|both)")),
                };
                i += 2;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --preset <preset.json>, --shader <file.slang>, --glsl-version <n>, --es, --emit <vertex|fragment|both>)"
                ));
            }
        }
    }
    if cli.preset.is_none() && cli.shaders.is_empty() {
        return Err(anyhow!("nothing to compile: pass --preset or --shader"));
    }
    Ok(cli)
}

fn load_sources(cli: &Cli) -> Result<LoadedPreset> {
    let mut loaded = match &cli.preset {
        Some(path) => preset::load_preset_from_path(path)?,
        None => LoadedPreset {
            desc: PresetDesc {
                passes: Vec::new(),
                textures: Vec::new(),
                parameters: Default::default(),
            },
            sources: Vec::new(),
            parameters: Vec::new(),
        },
    };
    for path in &cli.shaders {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read --shader file {}: {e}", path.display()))?;
        loaded.sources.push(PassSource::new(&text, None));
    }
    if !cli.shaders.is_empty() {
        let declared = collect_parameters(&loaded.sources);
        for p in declared {
            if loaded.parameters.iter().all(|known| known.id != p.id) {
                loaded.parameters.push(p);
            }
        }
    }
    Ok(loaded)
}

fn print_plan(pass_index: usize, stages: &[&CrossCompiled], ctx: &ClassifyContext<'_>) {
    let mut seen: Vec<&str> = Vec::new();
    for name in stages.iter().flat_map(|s| &s.resource_names) {
        if seen.contains(&name.as_str()) {
            continue;
        }
        seen.push(name);
        match classify(name, ctx) {
            Some(semantic) => {
                let kind = if semantic.role.is_texture() { "texture" } else { "value" };
                println!(
                    "// pass {pass_index}: {name} -> {:?}[{}] ({kind})",
                    semantic.role, semantic.index
                );
            }
            None => println!("// pass {pass_index}: {name} -> unbound"),
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let loaded = load_sources(cli)?;
    let options = CompileOptions {
        context: cli.context(),
    };

    let lut_names = loaded.texture_ids();
    let parameter_names: Vec<&str> = loaded.parameters.iter().map(|p| p.id.as_str()).collect();
    let aliases: Vec<Option<String>> = std::iter::once(None)
        .chain(
            loaded
                .sources
                .iter()
                .map(|s| s.alias.clone().or_else(|| parse_pragmas(&s.lines).alias)),
        )
        .collect();
    let aliases: Vec<Option<&str>> = aliases.iter().map(Option::as_deref).collect();

    for (i, source) in loaded.sources.iter().enumerate() {
        let pass_index = i + 1;
        let vertex = compile_slang(&source.lines, SlangStage::Vertex, &options)
            .map_err(|e| anyhow!("pass {pass_index}: {e}"))?;
        let fragment = compile_slang(&source.lines, SlangStage::Fragment, &options)
            .map_err(|e| anyhow!("pass {pass_index}: {e}"))?;

        for compiled in [&vertex, &fragment] {
            if cli.emit.includes(compiled.stage) {
                println!("// pass {pass_index} {} stage", compiled.stage.pragma_name());
                println!("{}", compiled.source);
            }
        }

        let ctx = ClassifyContext {
            pass_index,
            lut_names: &lut_names,
            pass_aliases: &aliases,
            parameter_names: &parameter_names,
        };
        print_plan(pass_index, &[&vertex, &fragment], &ctx);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;
    run(&cli)
}
