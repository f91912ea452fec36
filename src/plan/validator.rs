//! Plan validation: a generated plan is never trusted until it passes the
//! catalog and graph invariants.
//!
//! Checks run in order and short-circuit on the first failure. The caller
//! treats a `ValidationError` exactly like a generation failure — discard
//! the plan and fall back to plain conversation. The user cannot act on the
//! details, so they are only logged.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::catalog::ToolCatalog;
use crate::plan::{PlanKind, RoutingPlan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A step references a tool not present in the catalog.
    UnknownTool { tool: String },
    /// Two steps use the same tool name; `depends_on` references would be
    /// ambiguous.
    DuplicateStep { tool: String },
    /// A `depends_on` entry names no step in this plan.
    UnknownDependency { step: String, dependency: String },
    /// A step depends on itself.
    SelfDependency { step: String },
    /// The dependency graph contains a cycle.
    CyclicDependency { remaining: Vec<String> },
    /// A sequential plan lists a step before one of its dependencies.
    OrderViolation { step: String, dependency: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownTool { tool } => {
                write!(f, "unknown tool '{}' (not in catalog)", tool)
            }
            ValidationError::DuplicateStep { tool } => {
                write!(f, "tool '{}' appears in more than one step", tool)
            }
            ValidationError::UnknownDependency { step, dependency } => {
                write!(f, "step '{}' depends on '{}', which is not a step in this plan", step, dependency)
            }
            ValidationError::SelfDependency { step } => {
                write!(f, "step '{}' depends on itself", step)
            }
            ValidationError::CyclicDependency { remaining } => {
                write!(f, "dependency cycle involving: {}", remaining.join(", "))
            }
            ValidationError::OrderViolation { step, dependency } => {
                write!(f, "sequential plan lists '{}' before its dependency '{}'", step, dependency)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed plan against the catalog and graph invariants.
pub fn validate(plan: &RoutingPlan, catalog: &ToolCatalog) -> Result<(), ValidationError> {
    let steps = plan.steps();

    // 1. Catalog membership, and step-name uniqueness so dependency
    //    references stay unambiguous.
    let mut seen: HashSet<&str> = HashSet::new();
    for step in steps {
        if !catalog.contains(&step.tool) {
            return Err(ValidationError::UnknownTool {
                tool: step.tool.clone(),
            });
        }
        if !seen.insert(step.tool.as_str()) {
            return Err(ValidationError::DuplicateStep {
                tool: step.tool.clone(),
            });
        }
    }

    // 2. Every depends_on entry resolves to another step; no self-references.
    for step in steps {
        for dep in &step.depends_on {
            if dep == &step.tool {
                return Err(ValidationError::SelfDependency {
                    step: step.tool.clone(),
                });
            }
            if !seen.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step: step.tool.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // 3. Acyclicity (Kahn's algorithm). Bounded by step count — terminates
    //    deterministically on any input.
    let mut indegree: HashMap<&str, usize> = steps
        .iter()
        .map(|s| (s.tool.as_str(), s.depends_on.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(step.tool.as_str());
        }
    }
    let mut queue: VecDeque<&str> = steps
        .iter()
        .filter(|s| s.depends_on.is_empty())
        .map(|s| s.tool.as_str())
        .collect();
    let mut visited = 0usize;
    while let Some(name) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(name).map(Vec::as_slice).unwrap_or(&[]) {
            let entry = indegree.get_mut(dependent).expect("dependent is a step");
            *entry -= 1;
            if *entry == 0 {
                queue.push_back(dependent);
            }
        }
    }
    if visited != steps.len() {
        let mut remaining: Vec<String> = indegree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        remaining.sort();
        return Err(ValidationError::CyclicDependency { remaining });
    }

    // 4. Sequential order must be a linear extension of the dependency
    //    partial order.
    if plan.execution_plan.kind == PlanKind::Sequential {
        let position: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.tool.as_str(), i))
            .collect();
        for (idx, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                if position[dep.as_str()] >= idx {
                    return Err(ValidationError::OrderViolation {
                        step: step.tool.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExecutionPlan, ToolStep};
    use serde_json::Map;

    fn step(tool: &str, deps: &[&str]) -> ToolStep {
        ToolStep {
            tool: tool.to_string(),
            reason: String::new(),
            parameters: Map::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn plan(kind: PlanKind, steps: Vec<ToolStep>) -> RoutingPlan {
        RoutingPlan {
            analysis: String::new(),
            is_off_topic: false,
            requires_tools: true,
            execution_plan: ExecutionPlan { kind, steps },
            missing_info: vec![],
            complexity: Default::default(),
        }
    }

    #[test]
    fn accepts_valid_sequential_chain() {
        let p = plan(
            PlanKind::Sequential,
            vec![
                step("get_balance", &[]),
                step("fetch_price", &[]),
                step("calculate", &["get_balance", "fetch_price"]),
            ],
        );
        assert!(validate(&p, &ToolCatalog::default()).is_ok());
    }

    #[test]
    fn rejects_unknown_tool() {
        let p = plan(PlanKind::Parallel, vec![step("get_weather", &[])]);
        assert_eq!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::UnknownTool {
                tool: "get_weather".into()
            })
        );
    }

    #[test]
    fn rejects_duplicate_step() {
        let p = plan(
            PlanKind::Parallel,
            vec![step("fetch_price", &[]), step("fetch_price", &[])],
        );
        assert!(matches!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::DuplicateStep { .. })
        ));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let p = plan(
            PlanKind::Sequential,
            vec![step("fetch_price", &[]), step("calculate", &["get_balance"])],
        );
        assert_eq!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::UnknownDependency {
                step: "calculate".into(),
                dependency: "get_balance".into()
            })
        );
    }

    #[test]
    fn rejects_self_dependency() {
        let p = plan(PlanKind::Parallel, vec![step("calculate", &["calculate"])]);
        assert!(matches!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::SelfDependency { .. })
        ));
    }

    #[test]
    fn rejects_cycle_deterministically() {
        // get_balance -> fetch_price -> calculate -> get_balance
        let p = plan(
            PlanKind::Parallel,
            vec![
                step("get_balance", &["calculate"]),
                step("fetch_price", &["get_balance"]),
                step("calculate", &["fetch_price"]),
            ],
        );
        match validate(&p, &ToolCatalog::default()) {
            Err(ValidationError::CyclicDependency { remaining }) => {
                assert_eq!(remaining.len(), 3);
            }
            other => panic!("expected cycle rejection, got {:?}", other),
        }
    }

    #[test]
    fn rejects_two_node_cycle() {
        let p = plan(
            PlanKind::Parallel,
            vec![
                step("get_balance", &["fetch_price"]),
                step("fetch_price", &["get_balance"]),
            ],
        );
        assert!(matches!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn rejects_sequential_order_violation() {
        // calculate listed before its dependencies.
        let p = plan(
            PlanKind::Sequential,
            vec![
                step("calculate", &["get_balance"]),
                step("get_balance", &[]),
            ],
        );
        assert_eq!(
            validate(&p, &ToolCatalog::default()),
            Err(ValidationError::OrderViolation {
                step: "calculate".into(),
                dependency: "get_balance".into()
            })
        );
    }

    #[test]
    fn parallel_plan_ignores_declared_order() {
        // Same shape as above but parallel: the resolver orders by edges,
        // so declared order does not matter.
        let p = plan(
            PlanKind::Parallel,
            vec![
                step("calculate", &["get_balance"]),
                step("get_balance", &[]),
            ],
        );
        assert!(validate(&p, &ToolCatalog::default()).is_ok());
    }

    #[test]
    fn empty_plan_is_valid() {
        let p = plan(PlanKind::Parallel, vec![]);
        assert!(validate(&p, &ToolCatalog::default()).is_ok());
    }
}
