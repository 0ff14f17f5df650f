// coordinator-agent: Input resolution across context, extracted values, and
// prior service responses

use crate::contract::is_present;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a resolved value came from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Context,
    Extracted,
    Previous,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Context => "context",
            Source::Extracted => "extracted",
            Source::Previous => "previous",
        }
    }
}

/// Result of resolving one service's effective required set.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    /// Resolved required fields only; optional properties are never assembled
    pub values: Map<String, Value>,
    /// Per-key provenance, for diagnostics
    pub sources: BTreeMap<String, &'static str>,
    /// Required keys that resolved to no present value
    pub missing: Vec<String>,
}

impl ResolvedInputs {
    /// A service is resolvable iff every required key resolved.
    pub fn is_resolvable(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Fill each required key from the first source holding a present value:
/// current context, then extracted values, then any prior response body
/// containing the key at top level.
pub fn resolve(
    required: &[String],
    context: &Map<String, Value>,
    extracted: &Map<String, Value>,
    prior_responses: &Map<String, Value>,
) -> ResolvedInputs {
    let mut resolved = ResolvedInputs::default();

    for key in required {
        if let Some(value) = context.get(key).filter(|v| is_present(v)) {
            resolved.values.insert(key.clone(), value.clone());
            resolved.sources.insert(key.clone(), Source::Context.as_str());
            continue;
        }

        if let Some(value) = extracted.get(key).filter(|v| is_present(v)) {
            resolved.values.insert(key.clone(), value.clone());
            resolved
                .sources
                .insert(key.clone(), Source::Extracted.as_str());
            continue;
        }

        let from_previous = prior_responses.values().find_map(|response| {
            response
                .as_object()
                .and_then(|obj| obj.get(key))
                .filter(|v| is_present(v))
        });

        match from_previous {
            Some(value) => {
                resolved.values.insert(key.clone(), value.clone());
                resolved
                    .sources
                    .insert(key.clone(), Source::Previous.as_str());
            }
            None => resolved.missing.push(key.clone()),
        }
    }

    resolved
}
