// coordinator-agent: Fixed-point dispatch loop
//
// Owns the mutable per-request context; ordering decisions stay in the
// planner. One dispatch call is strictly sequential so every response can
// feed context before the next resolvability check.

use crate::audit::{AuditEvent, AuditLogger};
use crate::config::SelectionPrompts;
use crate::contract::Contract;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::extractor;
use crate::llm::LanguageModel;
use crate::model::{Candidate, DispatchOutcome, Selection, SkipRecord, SkippedService};
use crate::planner::{plan_order, ServiceContracts};
use crate::resolver;
use crate::selector;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Consecutive no-progress passes tolerated before the loop gives up
pub const STALL_BUDGET: u32 = 5;

/// Reason recorded for services that never became resolvable
pub const SKIP_REASON: &str = "Unresolvable inputs after dependency resolution loop.";

const DEFAULT_PICK_REASON: &str = "inferred from contract chaining";

/// Per-request pipeline driver: selection, extraction, planning, execution.
pub struct Dispatcher<'a> {
    pub llm: &'a dyn LanguageModel,
    pub http: &'a reqwest::Client,
    pub audit: &'a AuditLogger,
    pub prompts: &'a SelectionPrompts,
}

impl Dispatcher<'_> {
    /// Run the full pipeline for one dispatch body.
    ///
    /// The body must carry `query` and `candidates`; every other top-level
    /// key preloads the execution context.
    pub async fn dispatch(&self, body: Map<String, Value>) -> CoordinatorResult<DispatchOutcome> {
        let query = body
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                CoordinatorError::BadRequest("require 'query' and 'candidates'".to_string())
            })?
            .to_string();

        let candidates: Vec<Candidate> = match body.get("candidates") {
            Some(Value::Array(items)) if !items.is_empty() => {
                serde_json::from_value(Value::Array(items.clone())).map_err(|e| {
                    CoordinatorError::BadRequest(format!("invalid candidates: {}", e))
                })?
            }
            _ => {
                return Err(CoordinatorError::BadRequest(
                    "require 'query' and 'candidates'".to_string(),
                ))
            }
        };

        let correlation_id = uuid::Uuid::new_v4().to_string();
        info!(correlation_id = %correlation_id, query = %query, "Dispatch started");

        let selection = selector::select(self.llm, self.prompts, &query, &candidates).await?;
        debug!(pickids = ?selection.pickids, "Selector picks");

        let schema = extractor::merged_schema(&selection.pickids, &candidates);
        let extracted = extractor::extract(self.llm, &query, &schema).await;
        let usable = extractor::filter_usable(extracted);
        if usable.is_empty() {
            return Err(CoordinatorError::BadRequest(
                "No usable values extracted from query".to_string(),
            ));
        }

        // Context starts as a copy of the request body; extracted values fill
        // gaps but never shadow a present caller-supplied value.
        let mut context = body.clone();
        for (key, value) in &usable {
            let present = context
                .get(key)
                .map(crate::contract::is_present)
                .unwrap_or(false);
            if !present {
                context.insert(key.clone(), value.clone());
            }
        }

        let outcome = self
            .execute(
                &query,
                &correlation_id,
                &selection,
                &candidates,
                context,
                &usable,
            )
            .await;

        info!(
            correlation_id = %correlation_id,
            executed = outcome.responses.len() - outcome.skipped.len(),
            skipped = outcome.skipped.len(),
            "Dispatch finished"
        );

        Ok(outcome)
    }

    /// The fixed-point execution loop over the selected services.
    async fn execute(
        &self,
        query: &str,
        correlation_id: &str,
        selection: &Selection,
        candidates: &[Candidate],
        mut context: Map<String, Value>,
        extracted: &Map<String, Value>,
    ) -> DispatchOutcome {
        let pickids = &selection.pickids;

        let by_id: HashMap<&str, &Candidate> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        let contracts: HashMap<String, ServiceContracts> = pickids
            .iter()
            .filter_map(|sid| {
                let candidate = by_id.get(sid.as_str())?;
                Some((
                    sid.clone(),
                    ServiceContracts {
                        input: Contract::parse(&candidate.metadata.contract_input),
                        output: Contract::parse(&candidate.metadata.contract_output),
                    },
                ))
            })
            .collect();

        let known: BTreeSet<String> = context.keys().cloned().collect();
        let mut order = match plan_order(pickids, &contracts, &known) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Planning failed, falling back to pickids order");
                pickids.clone()
            }
        };

        let mut executed: BTreeSet<String> = BTreeSet::new();
        let mut responses: Map<String, Value> = Map::new();
        let mut retries = 0u32;
        let mut prev_keys: BTreeSet<String> = context.keys().cloned().collect();

        loop {
            if executed.len() == pickids.len() {
                break;
            }

            let mut progress = false;

            for sid in &order {
                if executed.contains(sid) {
                    continue;
                }
                let Some(candidate) = by_id.get(sid.as_str()) else {
                    continue;
                };

                let required = contracts
                    .get(sid)
                    .map(|c| c.input.effective_required())
                    .unwrap_or_default();
                let resolved = resolver::resolve(&required, &context, extracted, &responses);
                if !resolved.is_resolvable() {
                    debug!(service = %sid, missing = ?resolved.missing, "Not yet resolvable");
                    continue;
                }

                let url = substitute_endpoint(&candidate.metadata.endpoint, &resolved.values);
                debug!(service = %sid, url = %url, sources = ?resolved.sources, "Invoking service");

                let response = self
                    .call_downstream(&url, &resolved.values, correlation_id)
                    .await;

                responses.insert(sid.clone(), response.clone());
                executed.insert(sid.clone());

                if let Some(fields) = response.as_object() {
                    for (key, value) in fields {
                        context.insert(key.clone(), value.clone());
                    }
                }

                let reason = selection
                    .reasons
                    .get(sid)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_PICK_REASON);
                self.audit.log(&AuditEvent::new(
                    correlation_id,
                    sid,
                    &url,
                    Value::Object(resolved.values.clone()),
                    response,
                    reason,
                    query,
                    &candidate.metadata.contract_input,
                    &candidate.metadata.contract_output,
                ));

                progress = true;
            }

            let cur_keys: BTreeSet<String> = context.keys().cloned().collect();
            if !progress && cur_keys == prev_keys {
                retries += 1;
            } else {
                retries = 0;
            }
            prev_keys = cur_keys.clone();

            if retries >= STALL_BUDGET {
                debug!(retries = retries, "Stall budget exhausted");
                break;
            }

            if !progress {
                match plan_order(pickids, &contracts, &cur_keys) {
                    Ok(new_order) => order = new_order,
                    Err(e) => {
                        debug!(error = %e, "Replanning failed, keeping pickids order");
                        order = pickids.clone();
                    }
                }
            }
        }

        // Whatever never executed becomes a skip record, with the inputs
        // still missing at the final context.
        let mut skipped = Vec::new();
        for sid in pickids {
            if executed.contains(sid) {
                continue;
            }
            let Some(candidate) = by_id.get(sid.as_str()) else {
                continue;
            };

            let required = contracts
                .get(sid)
                .map(|c| c.input.effective_required())
                .unwrap_or_default();
            let resolved = resolver::resolve(&required, &context, extracted, &responses);

            let record = SkipRecord::new(resolved.missing.clone(), SKIP_REASON);
            let record_value = serde_json::to_value(&record).unwrap_or(Value::Null);
            responses.insert(sid.clone(), record_value.clone());
            skipped.push(SkippedService {
                id: sid.clone(),
                missing_inputs: resolved.missing.clone(),
                reason: SKIP_REASON.to_string(),
            });

            let url = substitute_endpoint(&candidate.metadata.endpoint, &resolved.values);
            self.audit.log(&AuditEvent::new(
                correlation_id,
                sid,
                &url,
                Value::Object(context.clone()),
                record_value,
                SKIP_REASON,
                query,
                &candidate.metadata.contract_input,
                &candidate.metadata.contract_output,
            ));
        }

        DispatchOutcome {
            pickids: pickids.clone(),
            reasons: selection.reasons.clone(),
            responses,
            skipped,
            llm_raw: selection.raw.clone(),
        }
    }

    /// POST the resolved inputs to a downstream service.
    ///
    /// Failures never abort the dispatch: transport errors, non-2xx statuses,
    /// and unparseable bodies all collapse into an `{error: ..}` object that
    /// counts as the service's response.
    async fn call_downstream(
        &self,
        url: &str,
        body: &Map<String, Value>,
        correlation_id: &str,
    ) -> Value {
        let result = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header("x-correlation-id", correlation_id)
            .header("x-jwt", "{}")
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Downstream call failed");
                return json!({ "error": e.to_string() });
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %url, error = %e, "Downstream body read failed");
                return json!({ "error": e.to_string() });
            }
        };

        if !status.is_success() {
            warn!(url = %url, status = %status, "Downstream returned error status");
            return json!({ "error": format!("HTTP {} from {}", status.as_u16(), url) });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => json!({
                "error": "invalid JSON",
                "raw": truncate(&text, 200),
            }),
        }
    }
}

/// Substitute `{field}` placeholders from the resolved required map only.
/// Unrelated context keys never leak into URLs.
pub fn substitute_endpoint(endpoint: &str, resolved: &Map<String, Value>) -> String {
    let mut url = endpoint.to_string();
    for (key, value) in resolved {
        let token = format!("{{{}}}", key);
        if url.contains(&token) {
            url = url.replace(&token, &value_as_segment(value));
        }
    }
    url
}

fn value_as_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
