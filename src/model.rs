// coordinator-agent: Request-scoped data model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A service description fetched from the vector store for a given query.
///
/// Immutable for the lifetime of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub document: String,
    pub metadata: CandidateMetadata,
}

/// Catalog metadata carried by a candidate.
///
/// `contract_input` and `contract_output` are JSON-schema strings and are
/// parsed lazily; see [`crate::contract::Contract::parse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub endpoint: String,
    #[serde(default, deserialize_with = "list_or_comma_string")]
    pub provides: Vec<String>,
    #[serde(default, deserialize_with = "list_or_comma_string")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contract_input: String,
    #[serde(default)]
    pub contract_output: String,
}

/// Catalog entries store `provides`/`tags` either as a list or as one
/// comma-separated string; both normalize to a list.
fn list_or_comma_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        One(String),
    }

    match Option::<ListOrString>::deserialize(deserializer)? {
        Some(ListOrString::List(items)) => Ok(items),
        Some(ListOrString::One(s)) => Ok(s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()),
        None => Ok(Vec::new()),
    }
}

/// Output of the selector: which candidates to invoke and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    /// Candidate ids to invoke, in the order the model picked them
    pub pickids: Vec<String>,
    /// Preferred execution order; a hint only, the planner recomputes
    pub order: Vec<String>,
    /// Per-pick rationale; entries may be missing
    pub reasons: HashMap<String, String>,
    /// Raw model response, surfaced for debugging
    pub raw: String,
}

/// Stand-in stored in place of a response for a service that never became
/// resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub skipped: bool,
    pub missing_inputs: Vec<String>,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(missing_inputs: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            missing_inputs,
            reason: reason.into(),
        }
    }
}

/// Skip summary as surfaced in the dispatch response `skipped` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedService {
    pub id: String,
    pub missing_inputs: Vec<String>,
    pub reason: String,
}

/// Aggregated result of one dispatch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub pickids: Vec<String>,
    pub reasons: HashMap<String, String>,
    /// Per-service downstream response or skip record
    pub responses: Map<String, Value>,
    pub skipped: Vec<SkippedService>,
    /// Raw selector response
    pub llm_raw: String,
}
