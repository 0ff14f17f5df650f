// coordinator-agent: Service contract parsing and schema transforms

use serde_json::{Map, Value};

/// Parsed form of a service's JSON-schema input or output contract.
///
/// Contracts travel as JSON-encoded strings inside candidate metadata. A
/// contract that fails to parse degrades to the empty contract: the service
/// becomes trivially resolvable and contributes nothing to the extraction
/// schema.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl Contract {
    /// Parse a contract string, degrading to the empty contract on error.
    pub fn parse(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };

        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let required = value
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            properties,
            required,
        }
    }

    /// Effective required set for an input contract.
    ///
    /// `required` is authoritative when present and non-empty; otherwise every
    /// property whose `type` is not a list containing `"null"` is required.
    pub fn effective_required(&self) -> Vec<String> {
        if !self.required.is_empty() {
            return self.required.clone();
        }

        self.properties
            .iter()
            .filter(|(_, prop)| !type_allows_null(prop))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Key set an output contract makes available. `required` is ignored for
    /// outputs.
    pub fn output_keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

fn type_allows_null(prop: &Value) -> bool {
    match prop.get("type") {
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("null")),
        _ => false,
    }
}

/// Rewrite a schema so every property also admits `null`.
///
/// Scalar `type` values become `[type, "null"]`, list types gain `"null"` when
/// absent, and the transform recurses through nested object properties and
/// array items. Applied only to the merged extraction schema, never to the
/// per-service required check.
pub fn allow_nulls(schema: &mut Value) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    if obj.get("type").and_then(Value::as_str) == Some("object") {
        if let Some(props) = obj.get_mut("properties").and_then(Value::as_object_mut) {
            for (_, prop) in props.iter_mut() {
                let widened = match prop.get("type") {
                    Some(Value::String(t)) => Some(Value::Array(vec![
                        Value::String(t.clone()),
                        Value::String("null".to_string()),
                    ])),
                    Some(Value::Array(types))
                        if !types.iter().any(|t| t.as_str() == Some("null")) =>
                    {
                        let mut types = types.clone();
                        types.push(Value::String("null".to_string()));
                        Some(Value::Array(types))
                    }
                    _ => None,
                };
                if let Some(widened) = widened {
                    prop["type"] = widened;
                }
                allow_nulls(prop);
            }
        }
    }

    if let Some(items) = obj.get_mut("items") {
        allow_nulls(items);
    }
}

/// Uniform presence rule for context and extracted values.
///
/// A value counts as present only when it is not JSON null, not the string
/// `"null"` in any case, and not empty or whitespace-only.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null")
        }
        _ => true,
    }
}
