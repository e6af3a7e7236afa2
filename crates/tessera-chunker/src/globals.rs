//! Global-variable chunking strategy.
//!
//! An over-budget variable dictionary is partitioned by [`VariableType`]
//! tag. Each group becomes one chunk when it fits, or a run of greedy
//! sub-chunks (`COLOR-0`, `COLOR-1`, ...) when it does not; a singleton
//! entry that still exceeds the budget is emitted alone with a warning.
//! An index chunk mapping tag → first chunk id is primary.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use tessera_core::estimate::{estimate, exceeds};
use tessera_core::{
    id, Chunk, ChunkContext, ChunkError, ChunkResult, ChunkStrategy, ChunkType,
};

// ============================================================================
// Variable Type
// ============================================================================

/// Variant tag used to partition global variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    Color,
    Float,
    String,
    Boolean,
    TextStyle,
    EffectStyle,
    Other,
}

impl VariableType {
    /// All tags, in partition order.
    pub const ALL: [VariableType; 7] = [
        VariableType::Color,
        VariableType::Float,
        VariableType::String,
        VariableType::Boolean,
        VariableType::TextStyle,
        VariableType::EffectStyle,
        VariableType::Other,
    ];

    /// Wire tag, as used in chunk identifiers and the index payload.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            VariableType::Color => "COLOR",
            VariableType::Float => "FLOAT",
            VariableType::String => "STRING",
            VariableType::Boolean => "BOOLEAN",
            VariableType::TextStyle => "TEXT_STYLE",
            VariableType::EffectStyle => "EFFECT_STYLE",
            VariableType::Other => "OTHER",
        }
    }

    /// Tag for an explicit `type` value, if it names a known variant.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "COLOR" => Some(VariableType::Color),
            "FLOAT" => Some(VariableType::Float),
            "STRING" => Some(VariableType::String),
            "BOOLEAN" => Some(VariableType::Boolean),
            "TEXT_STYLE" => Some(VariableType::TextStyle),
            "EFFECT_STYLE" => Some(VariableType::EffectStyle),
            "OTHER" => Some(VariableType::Other),
            _ => None,
        }
    }

    /// Classify a variable value.
    ///
    /// An explicit `type` wins when it names a known variant; otherwise the
    /// shape heuristics run in order and the first match wins: `{r,g,b}` ⇒
    /// COLOR, `fontFamily`/`fontSize` ⇒ TEXT_STYLE, an `effects` array ⇒
    /// EFFECT_STYLE, else OTHER.
    #[must_use]
    pub fn classify(value: &Value) -> Self {
        if let Some(tag) = value.get("type").and_then(Value::as_str) {
            if let Some(ty) = Self::from_tag(tag) {
                return ty;
            }
        }
        if value.get("r").is_some() && value.get("g").is_some() && value.get("b").is_some() {
            return VariableType::Color;
        }
        if value.get("fontFamily").is_some() || value.get("fontSize").is_some() {
            return VariableType::TextStyle;
        }
        if value.get("effects").is_some_and(Value::is_array) {
            return VariableType::EffectStyle;
        }
        VariableType::Other
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// Strategy for global-variable payloads.
pub struct GlobalVarsStrategy;

impl GlobalVarsStrategy {
    /// Create the global-vars strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlobalVarsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStrategy for GlobalVarsStrategy {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::GlobalVars
    }

    fn should_chunk(&self, data: &Value, ctx: &ChunkContext) -> bool {
        exceeds(data, ctx.max_size)
    }

    async fn chunk(&self, data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError> {
        split_global_vars(data, ctx)
    }
}

/// Split a variable dictionary under `ctx`. Shared with the optimizer's
/// `split`.
pub(crate) fn split_global_vars(
    data: &Value,
    ctx: &ChunkContext,
) -> Result<ChunkResult, ChunkError> {
    if !exceeds(data, ctx.max_size) {
        let chunk_id = id::generate(&ctx.file_key, ChunkType::GlobalVars, Some("all"));
        let chunk = Chunk::new(
            chunk_id.clone(),
            ctx.file_key.clone(),
            ChunkType::GlobalVars,
            data.clone(),
        );
        return Ok(ChunkResult::new(vec![chunk], chunk_id));
    }

    let entries = entries(data)?;

    // Partition by tag, preserving entry order within each group.
    let mut groups: Vec<(VariableType, Vec<(String, Value)>)> = VariableType::ALL
        .iter()
        .map(|ty| (*ty, Vec::new()))
        .collect();
    for (key, value) in entries {
        let ty = VariableType::classify(&value);
        if let Some((_, group)) = groups.iter_mut().find(|(t, _)| *t == ty) {
            group.push((key, value));
        }
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut links: Vec<String> = Vec::new();
    let mut index = Map::new();

    for (ty, group) in groups {
        if group.is_empty() {
            continue;
        }
        let mut first_for_tag: Option<String> = None;
        for (identifier, members) in pack_group(ty, group, ctx.max_size) {
            let chunk_id = id::generate(&ctx.file_key, ChunkType::GlobalVars, Some(&identifier));
            for key in members.keys() {
                ctx.record(key.clone(), chunk_id.clone());
            }
            let data = Value::Object(members);
            if exceeds(&data, ctx.max_size) {
                warn!(
                    chunk_id = %chunk_id,
                    size = estimate(&data),
                    budget = ctx.max_size,
                    "single variable exceeds chunk budget"
                );
            }
            first_for_tag.get_or_insert_with(|| chunk_id.clone());
            links.push(chunk_id.clone());
            chunks.push(Chunk::new(
                chunk_id,
                ctx.file_key.clone(),
                ChunkType::GlobalVars,
                data,
            ));
        }
        if let Some(first) = first_for_tag {
            index.insert(ty.as_str().to_string(), Value::String(first));
        }
    }

    let index_id = id::generate(&ctx.file_key, ChunkType::GlobalVars, Some("index"));
    let mut index_chunk = Chunk::new(
        index_id.clone(),
        ctx.file_key.clone(),
        ChunkType::GlobalVars,
        Value::Object(index),
    );
    index_chunk.links = links;

    let mut ordered = Vec::with_capacity(1 + chunks.len());
    ordered.push(index_chunk);
    ordered.extend(chunks);
    Ok(ChunkResult::new(ordered, index_id))
}

/// Normalize the input into `(variable id, value)` pairs.
///
/// Accepts a dictionary, a `variables`/`localVariables` wrapper around one,
/// or an array of variables keyed by their `id` (index as fallback).
fn entries(data: &Value) -> Result<Vec<(String, Value)>, ChunkError> {
    let inner = data
        .get("variables")
        .or_else(|| data.get("localVariables"))
        .unwrap_or(data);

    match inner {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let key = item
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or_else(|| i.to_string(), str::to_string);
                (key, item.clone())
            })
            .collect()),
        _ => Err(ChunkError::InvalidInput(
            "global variables must be a mapping or an array".into(),
        )),
    }
}

/// Pack one tag group into `(identifier, members)` runs.
///
/// A group that fits keeps the bare tag as identifier; otherwise entries are
/// accumulated greedily until the next one would exceed the budget, with
/// identifiers `TAG-0`, `TAG-1`, ... Singletons over budget are emitted
/// alone.
fn pack_group(
    ty: VariableType,
    group: Vec<(String, Value)>,
    max_size: usize,
) -> Vec<(String, Map<String, Value>)> {
    let whole: Map<String, Value> = group.iter().cloned().collect();
    if !exceeds(&Value::Object(whole.clone()), max_size) {
        return vec![(ty.as_str().to_string(), whole)];
    }

    let mut runs: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut current = Map::new();
    let mut index = 0usize;

    for (key, value) in group {
        current.insert(key.clone(), value.clone());
        if current.len() > 1 && exceeds(&Value::Object(current.clone()), max_size) {
            current.remove(&key);
            runs.push((format!("{}-{index}", ty.as_str()), current));
            index += 1;
            current = Map::new();
            current.insert(key, value);
        }
    }
    if !current.is_empty() {
        runs.push((format!("{}-{index}", ty.as_str()), current));
    }
    runs
}
