//! Splitting combined slang sources into stages, and reading the pragma
//! metadata that rides along with them.

const STAGE_MARKER: &str = "#pragma stage";
const STAGE_PREFIX: &str = "#pragma stage ";
const NAME_PRAGMA: &str = "#pragma name ";
const PARAMETER_PRAGMA: &str = "#pragma parameter ";

/// Shader stage selected out of a combined slang source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlangStage {
    Vertex,
    Fragment,
}

impl SlangStage {
    /// Name used after `#pragma stage`.
    pub fn pragma_name(self) -> &'static str {
        match self {
            SlangStage::Vertex => "vertex",
            SlangStage::Fragment => "fragment",
        }
    }

    pub fn naga(self) -> naga::ShaderStage {
        match self {
            SlangStage::Vertex => naga::ShaderStage::Vertex,
            SlangStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// Extract the lines that belong to the stage called `name`.
///
/// Lines before the first marker are shared by every stage. A marker line
/// switches the active stage and is never emitted itself; the stage is active
/// when `name` directly follows `#pragma stage `. Each emitted line
/// is terminated with `\n`.
pub fn extract_stage<S: AsRef<str>>(lines: &[S], name: &str) -> String {
    let mut output = String::new();
    if name.is_empty() {
        return output;
    }

    let mut in_stage = true;
    for line in lines {
        let line = line.as_ref();
        if line.starts_with(STAGE_MARKER) {
            in_stage = line
                .strip_prefix(STAGE_PREFIX)
                .is_some_and(|rest| rest.starts_with(name));
        } else if in_stage {
            output.push_str(line);
            output.push('\n');
        }
    }
    output
}

/// A tunable declared with `#pragma parameter`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPragma {
    pub id: String,
    pub description: String,
    pub initial: f32,
    pub minimum: f32,
    pub maximum: f32,
    pub step: f32,
}

/// Metadata pragmas found in a combined slang source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlangPragmas {
    /// Alias from `#pragma name`; the last one wins.
    pub alias: Option<String>,
    pub parameters: Vec<ParameterPragma>,
}

pub fn parse_pragmas<S: AsRef<str>>(lines: &[S]) -> SlangPragmas {
    let mut pragmas = SlangPragmas::default();
    for line in lines {
        let line = line.as_ref().trim_start();
        if let Some(rest) = line.strip_prefix(NAME_PRAGMA) {
            let alias = rest.trim();
            if !alias.is_empty() {
                pragmas.alias = Some(alias.to_string());
            }
        } else if let Some(rest) = line.strip_prefix(PARAMETER_PRAGMA) {
            match parse_parameter(rest) {
                Some(p) => pragmas.parameters.push(p),
                None => log::warn!("ignoring malformed parameter pragma: {line}"),
            }
        }
    }
    pragmas
}

fn parse_parameter(rest: &str) -> Option<ParameterPragma> {
    let rest = rest.trim();
    let (id, rest) = rest.split_once(char::is_whitespace)?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let (description, rest) = rest.split_once('"')?;

    let values = rest
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let (initial, minimum, maximum, step) = match values.as_slice() {
        [i, lo, hi] => (*i, *lo, *hi, 0.0),
        [i, lo, hi, step] => (*i, *lo, *hi, *step),
        _ => return None,
    };

    Some(ParameterPragma {
        id: id.to_string(),
        description: description.to_string(),
        initial,
        minimum,
        maximum,
        step,
    })
}
