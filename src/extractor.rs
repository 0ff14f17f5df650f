// coordinator-agent: Schema-driven parameter extraction from the user query

use crate::contract::{allow_nulls, is_present, Contract};
use crate::llm::{ChatMessage, LanguageModel};
use crate::model::Candidate;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Build the merged extraction schema for the picked services.
///
/// Properties are the union of all picked input contracts in pickids order;
/// a duplicate key keeps the last declaration. The result is passed through
/// the allow-nulls transform so the model can decline any field.
pub fn merged_schema(pickids: &[String], candidates: &[Candidate]) -> Value {
    let mut properties = Map::new();
    for pid in pickids {
        let Some(candidate) = candidates.iter().find(|c| &c.id == pid) else {
            continue;
        };
        let contract = Contract::parse(&candidate.metadata.contract_input);
        for (name, prop) in contract.properties {
            properties.insert(name, prop);
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    allow_nulls(&mut schema);
    schema
}

/// Extract structured values for the merged schema from the raw query.
///
/// Any transport, parse, or schema-validation failure degrades to the
/// all-null map so unresolvable services skip instead of failing the call.
pub async fn extract(llm: &dyn LanguageModel, query: &str, schema: &Value) -> Map<String, Value> {
    let messages = [
        ChatMessage::system(extraction_system_prompt(schema)),
        ChatMessage::user(query.to_string()),
    ];

    let extracted = match llm.chat(&messages).await {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(value) => match jsonschema::validate(schema, &value) {
                Ok(()) => value.as_object().cloned(),
                Err(e) => {
                    warn!(error = %e, "Extractor output failed schema validation");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Extractor output is not JSON");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Extractor chat call failed");
            None
        }
    };

    extracted.unwrap_or_else(|| all_null(schema))
}

/// Drop entries that fail the presence rule before they reach context.
pub fn filter_usable(extracted: Map<String, Value>) -> Map<String, Value> {
    extracted
        .into_iter()
        .filter(|(_, value)| is_present(value))
        .collect()
}

fn all_null(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().map(|k| (k.clone(), Value::Null)).collect())
        .unwrap_or_default()
}

fn extraction_system_prompt(schema: &Value) -> String {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string());
    debug!(schema = %rendered, "Extraction schema");
    format!(
        r#"You are a strict JSON extractor.

Your task is to extract only explicitly stated or clearly implied values from the user's input, based on the following JSON schema:

{rendered}

Guidelines:
- Prefer extracting values over returning null if the user's intent is reasonably clear and matches the schema type.
- For example: "I am user 2345" -> "customer_id": 2345 is valid.
- Normalize common variants if unambiguous (e.g., city names like "Munic" -> "MUC", or dates like "4. Mai 2025" -> "2025-05-04").

Rules:
- Do NOT guess or fabricate values.
- Do NOT infer unstated values (e.g., don't assume vehicle type unless mentioned).
- Return a single valid JSON object only. No text, markdown, code blocks, or explanations.

Important:
- If a value is missing, ambiguous, or not explicitly derivable, return null.
- Return only fields defined in the schema. Ignore irrelevant content."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use crate::CoordinatorResult;
    use async_trait::async_trait;
    use serde_json::json;

    struct ScriptedModel {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn chat(&self, _messages: &[ChatMessage]) -> CoordinatorResult<String> {
            self.response
                .clone()
                .map_err(|_| CoordinatorError::Upstream("chat failed".to_string()))
        }

        async fn embed(&self, _texts: &[String]) -> CoordinatorResult<Vec<Vec<f32>>> {
            Ok(vec![])
        }
    }

    fn candidate(id: &str, contract_input: &str) -> Candidate {
        serde_json::from_value(json!({
            "id": id,
            "document": "",
            "metadata": {
                "endpoint": "http://svc/run",
                "contract_input": contract_input,
                "contract_output": "{}"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_merged_schema_unions_properties_last_wins() {
        let candidates = vec![
            candidate(
                "a",
                r#"{"properties":{"customer_id":{"type":"integer"},"shared":{"type":"integer"}}}"#,
            ),
            candidate(
                "b",
                r#"{"properties":{"vehicle_type":{"type":"string"},"shared":{"type":"string"}}}"#,
            ),
        ];
        let pickids = vec!["a".to_string(), "b".to_string()];
        let schema = merged_schema(&pickids, &candidates);
        let props = schema["properties"].as_object().unwrap();
        assert_eq!(props.len(), 3);
        // last declaration wins for the duplicate, then allow-nulls widens it
        assert_eq!(props["shared"]["type"], json!(["string", "null"]));
        assert_eq!(props["customer_id"]["type"], json!(["integer", "null"]));
    }

    #[tokio::test]
    async fn test_extract_valid_response_passes_through() {
        let schema = json!({
            "type": "object",
            "properties": {"customer_id": {"type": ["integer", "null"]}}
        });
        let model = ScriptedModel {
            response: Ok(r#"{"customer_id": 42}"#.to_string()),
        };
        let extracted = extract(&model, "I am user 42", &schema).await;
        assert_eq!(extracted["customer_id"], json!(42));
    }

    #[tokio::test]
    async fn test_extract_invalid_json_degrades_to_all_null() {
        let schema = json!({
            "type": "object",
            "properties": {
                "customer_id": {"type": ["integer", "null"]},
                "vehicle_type": {"type": ["string", "null"]}
            }
        });
        let model = ScriptedModel {
            response: Ok("sorry, I cannot".to_string()),
        };
        let extracted = extract(&model, "anything", &schema).await;
        assert_eq!(extracted.len(), 2);
        assert!(extracted.values().all(Value::is_null));
    }

    #[tokio::test]
    async fn test_extract_schema_violation_degrades_to_all_null() {
        let schema = json!({
            "type": "object",
            "properties": {"customer_id": {"type": ["integer", "null"]}}
        });
        let model = ScriptedModel {
            response: Ok(r#"{"customer_id": "not a number"}"#.to_string()),
        };
        let extracted = extract(&model, "anything", &schema).await;
        assert!(extracted["customer_id"].is_null());
    }

    #[tokio::test]
    async fn test_extract_transport_failure_degrades_to_all_null() {
        let schema = json!({
            "type": "object",
            "properties": {"customer_id": {"type": ["integer", "null"]}}
        });
        let model = ScriptedModel { response: Err(()) };
        let extracted = extract(&model, "anything", &schema).await;
        assert!(extracted["customer_id"].is_null());
    }

    #[test]
    fn test_filter_usable_applies_presence_rule() {
        let mut extracted = Map::new();
        extracted.insert("a".to_string(), json!(42));
        extracted.insert("b".to_string(), Value::Null);
        extracted.insert("c".to_string(), json!("Null"));
        extracted.insert("d".to_string(), json!("  "));
        extracted.insert("e".to_string(), json!("SUV"));
        let usable = filter_usable(extracted);
        assert_eq!(usable.len(), 2);
        assert!(usable.contains_key("a"));
        assert!(usable.contains_key("e"));
    }
}
