//! Turns a crew definition into the plan the scheduler drives.

use serde::Serialize;

use super::graph::TaskGraph;
use crate::error::GraphError;
use crate::model::{Crew, ProcessType};

/// Execution plan in task indices, one variant per process mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessPlan {
    /// Dependency order with `order` as tie-break, run one step at a time.
    Sequential { order: Vec<usize> },
    /// Dependency levels, each funnelled through the manager agent.
    Hierarchical { levels: Vec<Vec<usize>>, manager: usize },
}

impl ProcessPlan {
    pub fn step_count(&self) -> usize {
        match self {
            Self::Sequential { order } => order.len(),
            Self::Hierarchical { levels, .. } => levels.iter().map(Vec::len).sum(),
        }
    }
}

/// A validated plan together with the graph it was derived from.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'a> {
    pub crew: &'a Crew,
    pub graph: TaskGraph<'a>,
    pub process: ProcessPlan,
}

impl<'a> ExecutionPlan<'a> {
    /// Validate the crew and resolve its plan. Any error here is a
    /// configuration error and must be reported before an execution starts.
    pub fn resolve(crew: &'a Crew, manager_role: Option<&str>) -> Result<Self, GraphError> {
        let graph = TaskGraph::build(&crew.tasks)?;
        graph.validate()?;

        for task in &crew.tasks {
            match task.agent_id.as_deref() {
                Some(agent_id) => {
                    if crew.agent(agent_id).is_none() {
                        return Err(GraphError::UnknownAgent {
                            task_id: task.id.clone(),
                            agent_id: agent_id.to_string(),
                        });
                    }
                }
                None if crew.process_type == ProcessType::Sequential => {
                    return Err(GraphError::UnassignedTask(task.id.clone()));
                }
                None => {}
            }
        }

        let process = match crew.process_type {
            // nothing to delegate, the execution completes immediately
            _ if crew.tasks.is_empty() => ProcessPlan::Sequential { order: Vec::new() },
            ProcessType::Sequential => ProcessPlan::Sequential {
                order: graph.linear_order()?,
            },
            ProcessType::Hierarchical => ProcessPlan::Hierarchical {
                levels: graph.levels()?,
                manager: select_manager(crew, manager_role).ok_or(GraphError::NoManager)?,
            },
        };

        tracing::debug!(
            crew_id = %crew.id,
            steps = process.step_count(),
            "resolved execution plan"
        );

        Ok(Self {
            crew,
            graph,
            process,
        })
    }

    /// Serializable view of the plan, by task id.
    pub fn summary(&self) -> PlanSummary {
        let ids = |idx: &[usize]| -> Vec<String> {
            idx.iter().map(|&i| self.crew.tasks[i].id.clone()).collect()
        };
        match &self.process {
            ProcessPlan::Sequential { order } => PlanSummary {
                process_type: ProcessType::Sequential,
                manager: None,
                steps: vec![ids(order)],
            },
            ProcessPlan::Hierarchical { levels, manager } => PlanSummary {
                process_type: ProcessType::Hierarchical,
                manager: Some(self.crew.agents[*manager].id.clone()),
                steps: levels.iter().map(|l| ids(l)).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub process_type: ProcessType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    /// One entry for a sequential plan; one per level for a hierarchical one.
    pub steps: Vec<Vec<String>>,
}

/// Pick the manager agent of a hierarchical crew.
///
/// A configured role wins (case-insensitive). Otherwise the first agent, by
/// `order`, that owns no task; failing that the first agent by `order`.
pub fn select_manager(crew: &Crew, manager_role: Option<&str>) -> Option<usize> {
    let by_order = crew.agents_by_order();

    if let Some(role) = manager_role.map(str::trim).filter(|r| !r.is_empty()) {
        if let Some(&i) = by_order
            .iter()
            .find(|&&i| crew.agents[i].role.eq_ignore_ascii_case(role))
        {
            return Some(i);
        }
        tracing::warn!(crew_id = %crew.id, role, "no agent has the configured manager role");
    }

    let owns_task = |i: usize| {
        let id = crew.agents[i].id.as_str();
        crew.tasks.iter().any(|t| t.agent_id.as_deref() == Some(id))
    };

    by_order
        .iter()
        .copied()
        .find(|&i| !owns_task(i))
        .or_else(|| by_order.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrewAgent, CrewConfiguration, CrewStats, CrewStatus, CrewTask, LlmConfig};

    fn agent(id: &str, role: &str, order: i32) -> CrewAgent {
        CrewAgent {
            id: id.into(),
            name: id.into(),
            role: role.into(),
            goal: String::new(),
            backstory: String::new(),
            tools: vec![],
            llm: LlmConfig::default(),
            max_iterations: 5,
            order,
        }
    }

    fn task(id: &str, agent: Option<&str>, deps: &[&str]) -> CrewTask {
        CrewTask {
            id: id.into(),
            agent_id: agent.map(str::to_string),
            description: id.into(),
            expected_output: String::new(),
            context: Default::default(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            order: 0,
        }
    }

    fn crew(process_type: ProcessType, agents: Vec<CrewAgent>, tasks: Vec<CrewTask>) -> Crew {
        Crew {
            id: "crew".into(),
            tenant_id: "tenant".into(),
            name: "crew".into(),
            process_type,
            configuration: CrewConfiguration::default(),
            status: CrewStatus::Active,
            stats: CrewStats::default(),
            agents,
            tasks,
        }
    }

    #[test]
    fn test_sequential_rejects_unassigned_task() {
        let c = crew(
            ProcessType::Sequential,
            vec![agent("w", "writer", 0)],
            vec![task("a", Some("w"), &[]), task("b", None, &["a"])],
        );
        assert_eq!(
            ExecutionPlan::resolve(&c, None).unwrap_err(),
            GraphError::UnassignedTask("b".into())
        );
    }

    #[test]
    fn test_hierarchical_allows_unassigned_task() {
        let c = crew(
            ProcessType::Hierarchical,
            vec![agent("w", "writer", 0), agent("m", "lead", 1)],
            vec![task("a", Some("w"), &[]), task("b", None, &["a"])],
        );
        let plan = ExecutionPlan::resolve(&c, None).unwrap();
        assert_eq!(
            plan.process,
            ProcessPlan::Hierarchical {
                levels: vec![vec![0], vec![1]],
                manager: 1,
            }
        );
        assert_eq!(plan.summary().manager.as_deref(), Some("m"));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let c = crew(
            ProcessType::Sequential,
            vec![agent("w", "writer", 0)],
            vec![task("a", Some("ghost"), &[])],
        );
        assert!(matches!(
            ExecutionPlan::resolve(&c, None),
            Err(GraphError::UnknownAgent { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected_before_agent_checks() {
        let c = crew(
            ProcessType::Sequential,
            vec![],
            vec![task("a", None, &["b"]), task("b", None, &["a"])],
        );
        assert!(matches!(ExecutionPlan::resolve(&c, None), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_empty_crew_resolves_to_empty_plan() {
        let c = crew(ProcessType::Hierarchical, vec![], vec![]);
        let plan = ExecutionPlan::resolve(&c, None).unwrap();
        assert_eq!(plan.process.step_count(), 0);
    }

    #[test]
    fn test_hierarchical_without_agents_has_no_manager() {
        let c = crew(ProcessType::Hierarchical, vec![], vec![task("a", None, &[])]);
        assert_eq!(ExecutionPlan::resolve(&c, None).unwrap_err(), GraphError::NoManager);
    }

    #[test]
    fn test_manager_selection_order() {
        let c = crew(
            ProcessType::Hierarchical,
            vec![agent("a", "Researcher", 2), agent("b", "Manager", 3), agent("c", "writer", 1)],
            vec![task("t1", Some("a"), &[]), task("t2", Some("c"), &[])],
        );
        assert_eq!(select_manager(&c, Some("manager")), Some(1));
        // no configured role: first agent without tasks
        assert_eq!(select_manager(&c, None), Some(1));
        // unknown role falls back the same way
        assert_eq!(select_manager(&c, Some("director")), Some(1));

        let busy = crew(
            ProcessType::Hierarchical,
            vec![agent("a", "x", 2), agent("c", "y", 1)],
            vec![task("t1", Some("a"), &[]), task("t2", Some("c"), &[])],
        );
        assert_eq!(select_manager(&busy, None), Some(1));
    }
}
