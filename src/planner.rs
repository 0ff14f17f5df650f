// coordinator-agent: Execution ordering over the implicit contract graph

use crate::contract::Contract;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Parsed input/output contracts for one picked service.
#[derive(Debug, Clone, Default)]
pub struct ServiceContracts {
    pub input: Contract,
    pub output: Contract,
}

/// Raised when no execution order covers every pick.
///
/// The dispatcher treats this as recoverable: it falls back to pickids order
/// and lets the stall budget decide, since contracts are informational and a
/// runtime response may still surface the missing keys.
#[derive(Debug, Error)]
#[error("Dependency resolution failed. Unresolved services: {remaining:?}. Known fields: {available:?}")]
pub struct PlanError {
    pub remaining: Vec<String>,
    pub available: BTreeSet<String>,
}

/// Compute a feasible execution order by repeated passes over the picks.
///
/// A service becomes schedulable once its effective required set is covered
/// by the initially known fields plus the declared outputs of already
/// scheduled services. Iteration follows pickids order, so ties always break
/// by input position and the result is deterministic.
pub fn plan_order(
    pickids: &[String],
    contracts: &HashMap<String, ServiceContracts>,
    known_fields: &BTreeSet<String>,
) -> Result<Vec<String>, PlanError> {
    let inputs: HashMap<&str, Vec<String>> = pickids
        .iter()
        .map(|sid| {
            let required = contracts
                .get(sid)
                .map(|c| c.input.effective_required())
                .unwrap_or_default();
            (sid.as_str(), required)
        })
        .collect();

    let outputs: HashMap<&str, Vec<String>> = pickids
        .iter()
        .map(|sid| {
            let keys = contracts
                .get(sid)
                .map(|c| c.output.output_keys())
                .unwrap_or_default();
            (sid.as_str(), keys)
        })
        .collect();

    let mut remaining: Vec<String> = pickids.to_vec();
    let mut available = known_fields.clone();
    let mut order = Vec::with_capacity(pickids.len());

    while !remaining.is_empty() {
        let mut progress = false;
        let mut still_remaining = Vec::with_capacity(remaining.len());

        for sid in remaining {
            let satisfied = inputs
                .get(sid.as_str())
                .map(|req| req.iter().all(|key| available.contains(key)))
                .unwrap_or(true);

            if satisfied {
                if let Some(out) = outputs.get(sid.as_str()) {
                    available.extend(out.iter().cloned());
                }
                order.push(sid);
                progress = true;
            } else {
                still_remaining.push(sid);
            }
        }

        remaining = still_remaining;

        if !progress {
            return Err(PlanError {
                remaining,
                available,
            });
        }
    }

    Ok(order)
}
