//! JSON preset descriptions: which slang files run in which order, the lookup
//! textures they can sample, and parameter overrides.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::shader::{Parameter, PassSource, collect_parameters};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PresetDesc {
    pub passes: Vec<PassDesc>,
    #[serde(default)]
    pub textures: Vec<TextureDesc>,
    /// Overrides for `#pragma parameter` initial values, by identifier.
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PassDesc {
    /// Slang source path, relative to the preset file.
    pub shader: PathBuf,
    #[serde(default)]
    pub alias: Option<String>,
}

/// A lookup texture; decoding and upload are up to the host.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TextureDesc {
    pub id: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

/// A preset with every pass source read into memory.
#[derive(Debug, Clone)]
pub struct LoadedPreset {
    pub desc: PresetDesc,
    pub sources: Vec<PassSource>,
    /// Declared parameters with overrides applied, in declaration order.
    pub parameters: Vec<Parameter>,
}

impl LoadedPreset {
    pub fn texture_ids(&self) -> Vec<&str> {
        self.desc.textures.iter().map(|t| t.id.as_str()).collect()
    }
}

pub fn parse_preset(text: &str) -> Result<PresetDesc> {
    let desc: PresetDesc = serde_json::from_str(text).context("failed to parse preset json")?;
    if desc.passes.is_empty() {
        bail!("preset declares no passes");
    }
    Ok(desc)
}

pub fn load_preset_from_path(path: impl AsRef<Path>) -> Result<LoadedPreset> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preset json at {}", path.display()))?;
    let desc = parse_preset(&text).with_context(|| format!("invalid preset {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let sources = desc
        .passes
        .iter()
        .map(|pass| {
            let shader = base.join(&pass.shader);
            let text = std::fs::read_to_string(&shader)
                .with_context(|| format!("failed to read slang shader {}", shader.display()))?;
            Ok(PassSource::new(&text, pass.alias.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let parameters = apply_overrides(collect_parameters(&sources), &desc.parameters);
    Ok(LoadedPreset {
        desc,
        sources,
        parameters,
    })
}

fn apply_overrides(mut parameters: Vec<Parameter>, overrides: &BTreeMap<String, f32>) -> Vec<Parameter> {
    for (id, &value) in overrides {
        match parameters.iter_mut().find(|p| &p.id == id) {
            Some(p) => p.value = value,
            None => log::warn!("preset overrides undeclared parameter {id}"),
        }
    }
    parameters
}
