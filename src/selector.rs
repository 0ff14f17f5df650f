// coordinator-agent: Service selection (rerank) over the candidate set

use crate::config::SelectionPrompts;
use crate::contract::Contract;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::llm::{ChatMessage, LanguageModel};
use crate::model::{Candidate, Selection};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Ask the model which candidates are required for the query.
///
/// Pickids preserve the model's order; ids not in the candidate set are
/// dropped silently. Zero surviving picks is an upstream failure.
pub async fn select(
    llm: &dyn LanguageModel,
    prompts: &SelectionPrompts,
    query: &str,
    candidates: &[Candidate],
) -> CoordinatorResult<Selection> {
    let blocks = render_candidate_blocks(candidates);
    let user_prompt = prompts
        .user
        .replace("{query}", query)
        .replace("{candidates}", &blocks);

    let messages = [
        ChatMessage::system(prompts.system.clone()),
        ChatMessage::user(user_prompt),
    ];

    let raw = llm.chat(&messages).await?;
    debug!(raw = %raw, "Selector raw response");

    parse_selection(&raw, candidates)
}

/// One textual block per candidate, fed to the selection prompt.
pub fn render_candidate_blocks(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            let input = Contract::parse(&c.metadata.contract_input);
            let output = Contract::parse(&c.metadata.contract_output);
            let inputs = input.properties.keys().cloned().collect::<Vec<_>>();
            let outputs = output.output_keys();
            format!(
                "{}:\n  description: {}\n  provides: {}\n  inputs: {}\n  outputs: {}\n  tags: {}\n  endpoint: {}",
                c.id,
                c.document,
                c.metadata.provides.join(", "),
                inputs.join(", "),
                outputs.join(", "),
                c.metadata.tags.join(", "),
                c.metadata.endpoint,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse the model response into a selection, tolerating prose around the
/// JSON object.
pub fn parse_selection(raw: &str, candidates: &[Candidate]) -> CoordinatorResult<Selection> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => serde_json::from_str(extract_json_like(raw)).map_err(|e| {
            CoordinatorError::Upstream(format!("rerank error: unparseable response: {}", e))
        })?,
    };

    let known: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let id_list = |value: Option<&Value>| -> Vec<String> {
        let mut seen = Vec::new();
        for id in value
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str))
            .into_iter()
            .flatten()
        {
            if known.contains(&id) && !seen.iter().any(|s| s == id) {
                seen.push(id.to_string());
            }
        }
        seen
    };

    let pickids = id_list(parsed.get("pickids"));
    if pickids.is_empty() {
        return Err(CoordinatorError::Upstream(
            "rerank error: no pickids returned".to_string(),
        ));
    }

    let mut order = id_list(parsed.get("order"));
    if order.is_empty() {
        order = pickids.clone();
    }

    let reasons: HashMap<String, String> = parsed
        .get("reasons")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(id, reason)| Some((id.clone(), reason.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(Selection {
        pickids,
        order,
        reasons,
        raw: raw.to_string(),
    })
}

/// Greedy slice from the first `{` to the last `}`, for models that wrap the
/// JSON in prose or code fences.
fn extract_json_like(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => "{}",
    }
}
