//! Dependency resolution: convert a validated plan's step graph into a
//! concrete execution order.
//!
//! The internal model is a general DAG resolved into layered groups; the
//! external wire contract only carries a single `next_tool` pointer per
//! step, so the flattening at the end is where a genuine fan-out plan would
//! be lossy. No observed plan exercises fan-out, and the limitation is
//! preserved deliberately.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::plan::{PlanKind, RoutingPlan};

/// A step scheduled for execution. `parameters` may still contain
/// `{{tool_name}}` placeholders; the driver binds them once the named
/// dependency has completed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub tool: String,
    pub parameters: Map<String, Value>,
    pub depends_on: Vec<String>,
    /// Linear-chain successor pointer for the wire format.
    pub next_tool: Option<String>,
}

/// Groups of steps safe to run concurrently; every step's dependencies live
/// in an earlier group.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOrder {
    pub groups: Vec<Vec<PlannedStep>>,
}

impl ExecutionOrder {
    pub fn step_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Flattened group-major order (useful in tests and logging).
    pub fn flattened(&self) -> Vec<&PlannedStep> {
        self.groups.iter().flatten().collect()
    }
}

/// Resolve a validated plan into an execution order.
///
/// Sequential plans collapse to singleton groups in the declared (already
/// validated) order. Parallel plans are layered with Kahn's algorithm: each
/// layer holds every step whose dependencies are all satisfied by earlier
/// layers, so an edge-free parallel plan collapses to a single group.
pub fn resolve(plan: &RoutingPlan) -> ExecutionOrder {
    let steps = plan.steps();

    let ordered: Vec<Vec<&crate::plan::ToolStep>> = match plan.execution_plan.kind {
        PlanKind::Sequential => steps.iter().map(|s| vec![s]).collect(),
        PlanKind::Parallel => layer(steps),
    };

    let successor = successor_map(&ordered);

    let groups = ordered
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .map(|s| PlannedStep {
                    tool: s.tool.clone(),
                    parameters: s.parameters.clone(),
                    depends_on: s.depends_on.clone(),
                    next_tool: successor.get(s.tool.as_str()).cloned(),
                })
                .collect()
        })
        .collect();

    ExecutionOrder { groups }
}

/// Layer steps so that each layer's dependencies are satisfied by earlier
/// layers. The plan is already validated acyclic, so this terminates with
/// every step placed.
fn layer<'a>(steps: &'a [crate::plan::ToolStep]) -> Vec<Vec<&'a crate::plan::ToolStep>> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&crate::plan::ToolStep> = steps.iter().collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let (ready, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|s| s.depends_on.iter().all(|d| placed.contains(d.as_str())));
        debug_assert!(!ready.is_empty(), "validated plan cannot stall");
        for s in &ready {
            placed.insert(s.tool.as_str());
        }
        layers.push(ready);
        remaining = rest;
    }

    layers
}

/// Compute each step's wire successor: the first later step (group-major
/// order) that declares it as a dependency. A step with several dependents
/// only points at the first — the single-pointer wire format cannot express
/// more.
fn successor_map(ordered: &[Vec<&crate::plan::ToolStep>]) -> HashMap<String, String> {
    let flat: Vec<&crate::plan::ToolStep> = ordered.iter().flatten().copied().collect();
    let mut successor = HashMap::new();
    for step in &flat {
        for dep in &step.depends_on {
            successor
                .entry(dep.clone())
                .or_insert_with(|| step.tool.clone());
        }
    }
    successor
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([a-z0-9_]+)\}\}").expect("placeholder regex"));

/// Bind `{{tool_name}}` placeholders in step parameters using completed step
/// results.
///
/// A placeholder standing alone as a string value is replaced by the result
/// value itself; one embedded in a longer string (e.g. a calculate
/// expression) is replaced by its textual rendering. Placeholders naming a
/// step with no recorded result are left untouched.
pub fn bind_parameters(
    parameters: &Map<String, Value>,
    results: &HashMap<String, Value>,
) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(k, v)| (k.clone(), bind_value(v, results)))
        .collect()
}

fn bind_value(value: &Value, results: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            // Whole-string placeholder: substitute the raw result value.
            if let Some(caps) = PLACEHOLDER.captures(s) {
                if caps.get(0).map(|m| m.as_str()) == Some(s.as_str()) {
                    if let Some(result) = results.get(&caps[1]) {
                        return result.clone();
                    }
                    return value.clone();
                }
            }
            // Embedded placeholders: textual substitution.
            let replaced = PLACEHOLDER.replace_all(s, |caps: &regex::Captures<'_>| {
                match results.get(&caps[1]) {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => caps[0].to_string(),
                }
            });
            Value::String(replaced.into_owned())
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| bind_value(v, results)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), bind_value(v, results)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
