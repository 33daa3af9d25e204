//! Uniform semantics and the name-based classifier.
//!
//! Every active uniform of a pass program is matched against an ordered list
//! of matchers; the first one that recognises the name decides its role.
//! Names no matcher recognises are dropped and never bound.

/// What a uniform carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformRole {
    /// Output texture of a pass; pass 0 is the original frame.
    PassTexture,
    PassSize,
    /// A previous final frame, `index` frames back.
    PreviousFrameTexture,
    PreviousFrameSize,
    LutTexture,
    LutSize,
    /// Previous-frame output of a pass.
    Feedback,
    Parameter,
    Mvp,
    FrameCount,
}

impl UniformRole {
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            UniformRole::PassTexture
                | UniformRole::PreviousFrameTexture
                | UniformRole::LutTexture
                | UniformRole::Feedback
        )
    }
}

/// A classified uniform: role plus the instance it refers to.
///
/// `index` is a pass index for pass roles, a list position for LUTs and
/// parameters, and a "frames back" depth for previous frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semantic {
    pub role: UniformRole,
    pub index: usize,
}

impl Semantic {
    pub const fn new(role: UniformRole, index: usize) -> Self {
        Self { role, index }
    }
}

/// Where a uniform's value goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniformStorage<L> {
    /// Standalone uniform written through its program location.
    Direct { location: L },
    /// Member of the pass's packed uniform block.
    Packed { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundUniform<L> {
    pub semantic: Semantic,
    pub storage: UniformStorage<L>,
}

/// Names a classifier resolves against, as seen from one pass.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    /// Position of the pass being introspected (1-based; 0 is the original).
    pub pass_index: usize,
    pub lut_names: &'a [&'a str],
    /// Alias of every pass, indexed by pass position.
    pub pass_aliases: &'a [Option<&'a str>],
    pub parameter_names: &'a [&'a str],
}

enum Resolution {
    Bound(Semantic),
    /// Recognised prefix that only resolves through a lookup texture name.
    LutOnly,
}

type Matcher = fn(&str, &ClassifyContext<'_>) -> Option<Resolution>;

/// Matchers in precedence order; the first `Some` wins.
const MATCHERS: &[Matcher] = &[
    match_fixed,
    match_original_history,
    match_pass_output,
    match_pass_feedback,
    match_user,
    match_lut,
    match_alias,
    match_parameter,
];

/// Strip a leading `container.` qualifier.
pub fn base_name(name: &str) -> &str {
    name.split_once('.').map_or(name, |(_, field)| field)
}

/// Classify a uniform name for the pass described by `ctx`.
pub fn classify(name: &str, ctx: &ClassifyContext<'_>) -> Option<Semantic> {
    let name = base_name(name);
    for matcher in MATCHERS {
        match matcher(name, ctx) {
            Some(Resolution::Bound(semantic)) => return Some(semantic),
            Some(Resolution::LutOnly) => return lut_semantic(name, ctx),
            None => {}
        }
    }
    None
}

fn match_fixed(name: &str, ctx: &ClassifyContext<'_>) -> Option<Resolution> {
    use UniformRole::*;
    let source = ctx.pass_index.saturating_sub(1);
    let semantic = match name {
        "MVP" => Semantic::new(Mvp, 0),
        "Original" => Semantic::new(PassTexture, 0),
        "OriginalSize" => Semantic::new(PassSize, 0),
        "Source" => Semantic::new(PassTexture, source),
        "SourceSize" => Semantic::new(PassSize, source),
        "OutputSize" => Semantic::new(PassSize, ctx.pass_index),
        "FrameCount" => Semantic::new(FrameCount, 0),
        _ => return None,
    };
    Some(Resolution::Bound(semantic))
}

/// Split `<prefix>[Size]<digits>` into (is_size, digits).
fn indexed(name: &str, prefix: &str) -> Option<(bool, usize)> {
    let rest = name.strip_prefix(prefix)?;
    let (is_size, digits) = match rest.strip_prefix("Size") {
        Some(digits) => (true, digits),
        None => (false, rest),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((is_size, digits.parse().ok()?))
}

fn match_original_history(name: &str, _: &ClassifyContext<'_>) -> Option<Resolution> {
    use UniformRole::*;
    let (is_size, depth) = indexed(name, "OriginalHistory")?;
    // History zero is this frame's original, not a previous frame.
    let role = match (depth, is_size) {
        (0, false) => PassTexture,
        (0, true) => PassSize,
        (_, false) => PreviousFrameTexture,
        (_, true) => PreviousFrameSize,
    };
    Some(Resolution::Bound(Semantic::new(role, depth)))
}

fn match_pass_output(name: &str, _: &ClassifyContext<'_>) -> Option<Resolution> {
    let (is_size, n) = indexed(name, "PassOutput")?;
    let role = if is_size {
        UniformRole::PassSize
    } else {
        UniformRole::PassTexture
    };
    Some(Resolution::Bound(Semantic::new(role, n.checked_add(1)?)))
}

fn match_pass_feedback(name: &str, _: &ClassifyContext<'_>) -> Option<Resolution> {
    let (is_size, n) = indexed(name, "PassFeedback")?;
    let role = if is_size {
        UniformRole::PassSize
    } else {
        UniformRole::Feedback
    };
    Some(Resolution::Bound(Semantic::new(role, n.checked_add(1)?)))
}

fn match_user(name: &str, _: &ClassifyContext<'_>) -> Option<Resolution> {
    indexed(name, "User").map(|_| Resolution::LutOnly)
}

fn match_lut(name: &str, ctx: &ClassifyContext<'_>) -> Option<Resolution> {
    lut_semantic(name, ctx).map(Resolution::Bound)
}

fn match_alias(name: &str, ctx: &ClassifyContext<'_>) -> Option<Resolution> {
    let earlier = &ctx.pass_aliases[..ctx.pass_index.min(ctx.pass_aliases.len())];
    named_pair(name, earlier.iter().map(|a| a.unwrap_or("")))
        .map(|(is_size, k)| {
            let role = if is_size {
                UniformRole::PassSize
            } else {
                UniformRole::PassTexture
            };
            Resolution::Bound(Semantic::new(role, k))
        })
}

fn match_parameter(name: &str, ctx: &ClassifyContext<'_>) -> Option<Resolution> {
    ctx.parameter_names
        .iter()
        .position(|&p| p == name)
        .map(|k| Resolution::Bound(Semantic::new(UniformRole::Parameter, k)))
}

fn lut_semantic(name: &str, ctx: &ClassifyContext<'_>) -> Option<Semantic> {
    named_pair(name, ctx.lut_names.iter().copied()).map(|(is_size, k)| {
        let role = if is_size {
            UniformRole::LutSize
        } else {
            UniformRole::LutTexture
        };
        Semantic::new(role, k)
    })
}

/// Match `name` against `<id>` or `<id>Size` for each id; the last match in
/// list order wins. Empty ids never match.
fn named_pair<'a>(name: &str, ids: impl Iterator<Item = &'a str>) -> Option<(bool, usize)> {
    let mut found = None;
    for (k, id) in ids.enumerate() {
        if id.is_empty() {
            continue;
        }
        if name == id {
            found = Some((false, k));
        } else if name.strip_prefix(id) == Some("Size") {
            found = Some((true, k));
        }
    }
    found
}
