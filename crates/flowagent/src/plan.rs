//! Plan templates, validation and ordering.

use flowcore::{PlanStep, PlanValidation, StepKind};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const MANY_STEPS: usize = 15;

/// Five-step plan used when no planner output is available.
pub fn default_plan(task: &str) -> Vec<PlanStep> {
    vec![
        PlanStep::new(1, "Understand Requirements", StepKind::Plan)
            .with_description(format!("Analyze and understand: {}", task)),
        PlanStep::new(2, "Design Solution", StepKind::Plan)
            .with_description("Create high-level design and architecture")
            .depends_on([1]),
        PlanStep::new(3, "Implement Core Features", StepKind::Implement)
            .with_description("Write the main implementation code")
            .depends_on([2])
            .with_tools(["Write", "Read"]),
        PlanStep::new(4, "Test Implementation", StepKind::Test)
            .with_description("Test the code and fix any issues")
            .depends_on([3])
            .with_tools(["Bash", "Read"]),
        PlanStep::new(5, "Refine and Document", StepKind::Refactor)
            .with_description("Improve code quality and add documentation")
            .depends_on([4])
            .with_tools(["Write", "Read"]),
    ]
}

pub fn validate_plan(steps: &[PlanStep]) -> PlanValidation {
    let mut validation = PlanValidation {
        is_valid: true,
        ..PlanValidation::default()
    };

    if steps.is_empty() {
        validation.is_valid = false;
        validation.issues.push("No steps defined".to_string());
        return validation;
    }

    let mut ids = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            validation.issues.push(format!("Step {} missing 'name' field", i));
        }
        if !ids.insert(step.id) {
            validation.issues.push(format!("Duplicate step id: {}", step.id));
        }
    }

    for step in steps {
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                validation
                    .issues
                    .push(format!("Step {} has invalid dependency: {}", step.id, dep));
            }
        }
    }

    if has_cycle(steps) {
        validation.issues.push("Circular dependency detected".to_string());
    }

    if !steps.iter().any(|s| s.kind == StepKind::Test) {
        validation.warnings.push("No testing steps defined".to_string());
    }
    if steps.len() > MANY_STEPS {
        validation
            .warnings
            .push("Plan has many steps, consider breaking into sub-tasks".to_string());
    }

    validation.is_valid = validation.issues.is_empty();
    validation
}

fn has_cycle(steps: &[PlanStep]) -> bool {
    let mut graph: DiGraph<u32, ()> = DiGraph::new();
    let index: HashMap<u32, _> = steps.iter().map(|s| (s.id, graph.add_node(s.id))).collect();
    for step in steps {
        for dep in &step.dependencies {
            if let (Some(from), Some(to)) = (index.get(dep), index.get(&step.id)) {
                graph.add_edge(*from, *to, ());
            }
        }
    }
    toposort(&graph, None).is_err()
}

/// Orders steps so every step follows its dependencies, keeping input
/// order otherwise. Steps caught in a cycle keep their relative order, and
/// steps sharing an id are all kept; a dependency on such an id resolves to
/// the first of them.
pub fn prioritize_steps(steps: &[PlanStep]) -> Vec<PlanStep> {
    let mut position: HashMap<u32, usize> = HashMap::new();
    for (at, step) in steps.iter().enumerate() {
        position.entry(step.id).or_insert(at);
    }
    let mut visited = vec![false; steps.len()];
    let mut ordered = Vec::with_capacity(steps.len());

    fn visit(
        at: usize,
        steps: &[PlanStep],
        position: &HashMap<u32, usize>,
        visited: &mut [bool],
        ordered: &mut Vec<PlanStep>,
    ) {
        if visited[at] {
            return;
        }
        visited[at] = true;
        for dep in &steps[at].dependencies {
            if let Some(&dep_at) = position.get(dep) {
                visit(dep_at, steps, position, visited, ordered);
            }
        }
        ordered.push(steps[at].clone());
    }

    for at in 0..steps.len() {
        visit(at, steps, &position, &mut visited, &mut ordered);
    }
    ordered
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[serde(alias = "simple")]
    Low,
    #[default]
    Medium,
    #[serde(alias = "complex")]
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    pub overall: Complexity,
    pub estimated_time: String,
    pub difficulty_factors: Vec<String>,
    pub risk_factors: Vec<String>,
}

pub fn estimate_complexity(task: &str, steps: &[PlanStep]) -> ComplexityEstimate {
    let (overall, estimated_time) = match steps.len() {
        0..=3 => (Complexity::Low, "< 30 minutes"),
        4..=7 => (Complexity::Medium, "30-60 minutes"),
        _ => (Complexity::High, "> 1 hour"),
    };

    let mut difficulty_factors = Vec::new();
    let mut risk_factors = Vec::new();

    let implement_steps = steps.iter().filter(|s| s.kind == StepKind::Implement).count();
    if implement_steps > 5 {
        difficulty_factors.push("Multiple implementation steps".to_string());
    }
    if !steps.iter().any(|s| s.kind == StepKind::Test) {
        risk_factors.push("No testing steps defined".to_string());
    }

    let task = task.to_lowercase();
    for keyword in ["architecture", "refactor", "migrate", "optimize", "scale"] {
        if task.contains(keyword) {
            difficulty_factors.push(format!("Involves {}", keyword));
        }
    }

    ComplexityEstimate {
        overall,
        estimated_time: estimated_time.to_string(),
        difficulty_factors,
        risk_factors,
    }
}
