//! Ready-made agent graphs.
//!
//! All of them share the same node set; they differ in shape and in how
//! hard each node retries.

use crate::collaborators::Collaborators;
use crate::nodes::{
    AnalyzeContext, CreatePlan, DecideAction, FinalizeProject, ImplementCode, RefactorCode, Step,
    TestImplementation, UnderstandRequirements,
};
use crate::plan::Complexity;
use crate::AgentConfig;
use flowcore::{NodeId, NodeSpec, WorkflowError};
use flowruntime::{Flow, FlowBuilder};
use std::time::Duration;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Builds the node specs with single-attempt policies; each flow then sets
/// its own retries.
struct Specs<'a> {
    collaborators: &'a Collaborators,
    config: &'a AgentConfig,
}

impl Specs<'_> {
    fn understand(&self) -> NodeSpec {
        NodeSpec::new(UnderstandRequirements::new(
            self.collaborators.requirements.clone(),
            self.config.requirements_timeout_secs,
        ))
    }

    fn analyze(&self) -> NodeSpec {
        NodeSpec::blocking(AnalyzeContext::new(self.collaborators.project.clone()))
    }

    fn decide(&self) -> NodeSpec {
        NodeSpec::new(DecideAction::new(
            self.collaborators.decider.clone(),
            self.config.decision_timeout_secs,
            self.config.max_plan_attempts,
        ))
        .with_actions::<Step>()
    }

    fn plan(&self) -> NodeSpec {
        NodeSpec::new(CreatePlan::new(
            self.collaborators.planner.clone(),
            self.config.plan_timeout_secs,
            self.config.max_plan_steps,
        ))
    }

    fn implement(&self) -> NodeSpec {
        NodeSpec::new(ImplementCode::new(
            self.collaborators.assistant.clone(),
            self.config.implement_timeout_secs,
            self.config.implement_permission,
        ))
    }

    fn test(&self) -> NodeSpec {
        NodeSpec::new(TestImplementation::new(
            self.collaborators.assistant.clone(),
            self.config.test_timeout_secs,
            self.config.test_permission,
        ))
    }

    fn refactor(&self) -> NodeSpec {
        NodeSpec::new(RefactorCode::new(
            self.collaborators.assistant.clone(),
            self.config.refactor_timeout_secs,
            self.config.refactor_permission,
        ))
    }

    fn finalize(&self) -> NodeSpec {
        NodeSpec::blocking(FinalizeProject)
    }
}

struct LoopNodes {
    decide: NodeId,
    plan: NodeId,
    implement: NodeId,
    test: NodeId,
    refactor: NodeId,
    finalize: NodeId,
}

/// Decide branches on every [`Step`]; every worker returns to decide.
fn wire_loop(builder: &mut FlowBuilder, nodes: &LoopNodes) {
    builder.branch::<Step>(nodes.decide, |step| match step {
        Step::Plan => nodes.plan,
        Step::Implement => nodes.implement,
        Step::Test => nodes.test,
        Step::Refactor => nodes.refactor,
        Step::Complete => nodes.finalize,
    });
    for worker in [nodes.plan, nodes.implement, nodes.test, nodes.refactor] {
        builder.then(worker, nodes.decide);
    }
}

/// understand → analyze → decide loop, with implementation errors routed
/// to refactor.
pub fn coding_agent_flow(
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Result<Flow, WorkflowError> {
    let specs = Specs {
        collaborators,
        config,
    };
    let mut builder = FlowBuilder::new("coding_agent");

    let understand = builder.add_node(specs.understand().with_retry(2, secs(1)));
    let analyze = builder.add_node(specs.analyze().with_retry(2, Duration::ZERO));
    let nodes = LoopNodes {
        decide: builder.add_node(specs.decide().with_retry(3, secs(2))),
        plan: builder.add_node(specs.plan().with_retry(2, secs(1))),
        implement: builder.add_node(
            specs
                .implement()
                .with_retry(3, secs(2))
                .with_action_labels(["default", "error"]),
        ),
        test: builder.add_node(specs.test().with_retry(2, secs(1))),
        refactor: builder.add_node(specs.refactor().with_retry(2, secs(1))),
        finalize: builder.add_node(specs.finalize()),
    };

    builder.chain(&[understand, analyze, nodes.decide]);
    wire_loop(&mut builder, &nodes);
    builder.connect(nodes.implement, "error", nodes.refactor);
    builder.build()
}

/// A straight line with no decision point and single attempts.
pub fn simple_coding_flow(
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Result<Flow, WorkflowError> {
    let specs = Specs {
        collaborators,
        config,
    };
    let mut builder = FlowBuilder::new("simple_coding");

    let line = [
        builder.add_node(specs.understand()),
        builder.add_node(specs.analyze()),
        builder.add_node(specs.plan()),
        builder.add_node(specs.implement()),
        builder.add_node(specs.test()),
        builder.add_node(specs.finalize()),
    ];
    builder.chain(&line);
    builder.build()
}

/// Starts at the decision node, for contexts that already carry
/// requirements. Implementation errors are not routed.
pub fn iterative_coding_flow(
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Result<Flow, WorkflowError> {
    let specs = Specs {
        collaborators,
        config,
    };
    let mut builder = FlowBuilder::new("iterative_coding");

    let nodes = LoopNodes {
        decide: builder.add_node(specs.decide().with_retry(5, secs(1))),
        plan: builder.add_node(specs.plan().with_retry(3, Duration::ZERO)),
        implement: builder.add_node(specs.implement().with_retry(5, secs(2))),
        test: builder.add_node(specs.test().with_retry(3, Duration::ZERO)),
        refactor: builder.add_node(specs.refactor().with_retry(3, Duration::ZERO)),
        finalize: builder.add_node(specs.finalize()),
    };

    wire_loop(&mut builder, &nodes);
    builder.build()
}

/// The agent loop with more persistent retries on the worker nodes.
pub fn advanced_coding_flow(
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Result<Flow, WorkflowError> {
    let specs = Specs {
        collaborators,
        config,
    };
    let mut builder = FlowBuilder::new("advanced_coding");

    let understand = builder.add_node(specs.understand().with_retry(2, Duration::ZERO));
    let analyze = builder.add_node(specs.analyze().with_retry(2, Duration::ZERO));
    let nodes = LoopNodes {
        decide: builder.add_node(specs.decide().with_retry(3, Duration::ZERO)),
        plan: builder.add_node(specs.plan().with_retry(2, Duration::ZERO)),
        implement: builder.add_node(
            specs
                .implement()
                .with_retry(5, secs(2))
                .with_action_labels(["default", "error"]),
        ),
        test: builder.add_node(specs.test().with_retry(3, Duration::ZERO)),
        refactor: builder.add_node(specs.refactor().with_retry(3, Duration::ZERO)),
        finalize: builder.add_node(specs.finalize()),
    };

    builder.chain(&[understand, analyze, nodes.decide]);
    wire_loop(&mut builder, &nodes);
    builder.connect(nodes.implement, "error", nodes.refactor);
    builder.build()
}

/// Low → simple, Medium → coding agent, High → advanced.
pub fn flow_for_complexity(
    complexity: Complexity,
    collaborators: &Collaborators,
    config: &AgentConfig,
) -> Result<Flow, WorkflowError> {
    match complexity {
        Complexity::Low => simple_coding_flow(collaborators, config),
        Complexity::Medium => coding_agent_flow(collaborators, config),
        Complexity::High => advanced_coding_flow(collaborators, config),
    }
}
