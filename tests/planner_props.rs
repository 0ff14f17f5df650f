// Property tests over the planner, the merged extraction schema, and
// endpoint placeholder substitution.

use coordinator_agent::contract::Contract;
use coordinator_agent::dispatcher::substitute_endpoint;
use coordinator_agent::extractor::merged_schema;
use coordinator_agent::model::Candidate;
use coordinator_agent::planner::{plan_order, ServiceContracts};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

const FIELDS: [&str; 6] = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
const TYPES: [&str; 4] = ["string", "integer", "number", "boolean"];

#[derive(Debug, Clone)]
struct ServiceSpec {
    required: BTreeSet<usize>,
    outputs: BTreeSet<usize>,
}

fn service_spec() -> impl Strategy<Value = ServiceSpec> {
    (
        prop::collection::btree_set(0..FIELDS.len(), 0..3),
        prop::collection::btree_set(0..FIELDS.len(), 0..3),
    )
        .prop_map(|(required, outputs)| ServiceSpec { required, outputs })
}

fn graph() -> impl Strategy<Value = (Vec<ServiceSpec>, BTreeSet<usize>)> {
    (
        prop::collection::vec(service_spec(), 1..6),
        prop::collection::btree_set(0..FIELDS.len(), 0..4),
    )
}

fn build_inputs(
    specs: &[ServiceSpec],
    known: &BTreeSet<usize>,
) -> (Vec<String>, HashMap<String, ServiceContracts>, BTreeSet<String>) {
    let pickids: Vec<String> = (0..specs.len()).map(|i| format!("svc-{}", i)).collect();

    let contracts: HashMap<String, ServiceContracts> = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let input = Contract {
                properties: Map::new(),
                required: spec.required.iter().map(|f| FIELDS[*f].to_string()).collect(),
            };
            let output = Contract {
                properties: spec
                    .outputs
                    .iter()
                    .map(|f| (FIELDS[*f].to_string(), json!({"type": "string"})))
                    .collect(),
                required: Vec::new(),
            };
            (pickids[i].clone(), ServiceContracts { input, output })
        })
        .collect();

    let known_fields: BTreeSet<String> = known.iter().map(|f| FIELDS[*f].to_string()).collect();
    (pickids, contracts, known_fields)
}

proptest! {
    /// The planner is a pure function: identical inputs give byte-identical
    /// output, whether order or error.
    #[test]
    fn prop_plan_is_deterministic((specs, known) in graph()) {
        let (pickids, contracts, known_fields) = build_inputs(&specs, &known);
        let first = plan_order(&pickids, &contracts, &known_fields);
        let second = plan_order(&pickids, &contracts, &known_fields);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.remaining, b.remaining),
            _ => prop_assert!(false, "plan result flipped between runs"),
        }
    }

    /// A successful plan schedules every pick exactly once and never
    /// schedules a service before its declared inputs are coverable.
    #[test]
    fn prop_plan_respects_dependencies((specs, known) in graph()) {
        let (pickids, contracts, known_fields) = build_inputs(&specs, &known);
        if let Ok(order) = plan_order(&pickids, &contracts, &known_fields) {
            prop_assert_eq!(order.len(), pickids.len());
            let mut seen: BTreeSet<&String> = BTreeSet::new();
            let mut available = known_fields.clone();
            for sid in &order {
                prop_assert!(seen.insert(sid), "{} scheduled twice", sid);
                let service = &contracts[sid];
                for key in &service.input.required {
                    prop_assert!(available.contains(key), "{} ran before input {}", sid, key);
                }
                available.extend(service.output.output_keys());
            }
        }
    }

    /// A failed plan reports a non-empty subset of the picks.
    #[test]
    fn prop_plan_failure_names_remaining((specs, known) in graph()) {
        let (pickids, contracts, known_fields) = build_inputs(&specs, &known);
        if let Err(e) = plan_order(&pickids, &contracts, &known_fields) {
            prop_assert!(!e.remaining.is_empty());
            for sid in &e.remaining {
                prop_assert!(pickids.contains(sid));
            }
        }
    }

    /// The merged schema holds exactly the union of the picked contracts'
    /// property keys, and every leaf type admits null.
    #[test]
    fn prop_merged_schema_union_and_nullability(
        props in prop::collection::vec(
            prop::collection::btree_map(0..FIELDS.len(), 0..TYPES.len(), 0..4),
            1..5,
        )
    ) {
        let candidates: Vec<Candidate> = props
            .iter()
            .enumerate()
            .map(|(i, fields)| {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|(f, t)| (FIELDS[*f].to_string(), json!({"type": TYPES[*t]})))
                    .collect();
                let contract = json!({"type": "object", "properties": properties});
                serde_json::from_value(json!({
                    "id": format!("svc-{}", i),
                    "document": "",
                    "metadata": {
                        "endpoint": "http://svc/run",
                        "contract_input": contract.to_string(),
                        "contract_output": "{}",
                    }
                }))
                .unwrap()
            })
            .collect();
        let pickids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();

        let schema = merged_schema(&pickids, &candidates);
        let merged_keys: BTreeSet<String> = schema["properties"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let expected: BTreeSet<String> = props
            .iter()
            .flat_map(|fields| fields.keys().map(|f| FIELDS[*f].to_string()))
            .collect();
        prop_assert_eq!(merged_keys, expected);

        for (_, leaf) in schema["properties"].as_object().unwrap() {
            let types = leaf["type"].as_array().expect("type widened to a list");
            prop_assert!(types.iter().any(|t| t.as_str() == Some("null")));
        }
    }

    /// Substitution removes every placeholder with a resolved value and
    /// touches nothing else.
    #[test]
    fn prop_substitution_is_complete(
        keys in prop::collection::btree_set(0..FIELDS.len(), 0..4),
        values in prop::collection::vec("[a-z0-9]{1,8}", 6),
    ) {
        let endpoint = format!(
            "http://svc:8000/{{{}}}/x/{{{}}}",
            FIELDS[0], FIELDS[1]
        );
        let resolved: Map<String, Value> = keys
            .iter()
            .map(|f| (FIELDS[*f].to_string(), json!(values[*f])))
            .collect();

        let url = substitute_endpoint(&endpoint, &resolved);
        for key in resolved.keys() {
            let placeholder = format!("{{{}}}", key);
            prop_assert!(!url.contains(&placeholder));
        }
        // unresolved placeholders stay untouched
        for f in [FIELDS[0], FIELDS[1]] {
            if !resolved.contains_key(f) {
                let placeholder = format!("{{{}}}", f);
                prop_assert!(url.contains(&placeholder));
            }
        }
    }
}
