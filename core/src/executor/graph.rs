use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::GraphError;
use crate::model::CrewTask;

/// Task dependency graph over arena indices into the crew's task slice.
///
/// `deps[i]` lists the tasks `i` depends on, `dependents[i]` the tasks that
/// depend on `i`. Indices never outlive the task slice they were built from.
#[derive(Debug, Clone)]
pub struct TaskGraph<'a> {
    tasks: &'a [CrewTask],
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl<'a> TaskGraph<'a> {
    /// Build the graph, rejecting duplicate ids and dependencies outside the crew.
    pub fn build(tasks: &'a [CrewTask]) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(GraphError::DuplicateTaskId(task.id.clone()));
            }
        }

        let mut deps = vec![Vec::new(); tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(GraphError::DependencyNotFound {
                        task_id: task.id.clone(),
                        missing_dep: dep.clone(),
                    });
                };
                // repeated entries in a dependency list count once
                if !deps[i].contains(&j) {
                    deps[i].push(j);
                    dependents[j].push(i);
                }
            }
        }

        Ok(Self {
            tasks,
            deps,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn deps(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }

    pub fn dependents(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }

    pub fn task(&self, i: usize) -> &'a CrewTask {
        &self.tasks[i]
    }

    /// Detect circular dependencies using DFS with visiting/visited coloring.
    ///
    /// Returns the ids on the first cycle found, closed (first id repeated last).
    /// Roots are visited in task order, so the result is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut color = vec![Color::White; self.len()];
        let mut path: Vec<usize> = Vec::new();

        for root in 0..self.len() {
            if color[root] == Color::White {
                if let Some(cycle) = self.dfs_cycle(root, &mut color, &mut path) {
                    return Some(cycle.into_iter().map(|i| self.tasks[i].id.clone()).collect());
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: usize,
        color: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        color[node] = Color::Gray;
        path.push(node);

        for &dep in &self.deps[node] {
            match color[dep] {
                Color::Gray => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_cycle(dep, color, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        color[node] = Color::Black;
        None
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        match self.find_cycle() {
            Some(cycle) => Err(GraphError::Cycle(cycle)),
            None => Ok(()),
        }
    }

    fn tie_break(&self, i: usize) -> Reverse<(i32, usize)> {
        Reverse((self.tasks[i].order, i))
    }

    /// Kahn's algorithm, always taking the ready task with the lowest `order`
    /// (insertion index breaking ties). Dependency order always wins.
    pub fn linear_order(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(i32, usize)>> = (0..self.len())
            .filter(|&i| in_degree[i] == 0)
            .map(|i| self.tie_break(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &d in &self.dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(self.tie_break(d));
                }
            }
        }

        if order.len() != self.len() {
            return Err(self.cycle_error());
        }
        Ok(order)
    }

    /// Groups of tasks with no dependency among themselves; every task sits
    /// one level after its deepest dependency.
    pub fn levels(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut current: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut levels = Vec::new();
        let mut processed = 0;

        while !current.is_empty() {
            current.sort_by_key(|&i| (self.tasks[i].order, i));
            processed += current.len();

            let mut next = Vec::new();
            for &i in &current {
                for &d in &self.dependents[i] {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            levels.push(std::mem::take(&mut current));
            current = next;
        }

        if processed != self.len() {
            return Err(self.cycle_error());
        }
        Ok(levels)
    }

    fn cycle_error(&self) -> GraphError {
        GraphError::Cycle(self.find_cycle().unwrap_or_default())
    }

    /// Every task that transitively depends on `i`.
    pub fn transitive_dependents(&self, i: usize) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut stack = vec![i];
        let mut out = Vec::new();
        while let Some(n) = stack.pop() {
            for &d in &self.dependents[n] {
                if !seen[d] {
                    seen[d] = true;
                    out.push(d);
                    stack.push(d);
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn task(id: &str, deps: &[&str], order: i32) -> CrewTask {
        CrewTask {
            id: id.to_string(),
            agent_id: Some("agent".to_string()),
            description: format!("do {id}"),
            expected_output: String::new(),
            context: Default::default(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            order,
        }
    }

    fn ids(tasks: &[CrewTask], idx: &[usize]) -> Vec<String> {
        idx.iter().map(|&i| tasks[i].id.clone()).collect()
    }

    #[test]
    fn test_linear_order_respects_dependencies_then_order() {
        // c has the lowest order but depends on b
        let tasks = vec![task("a", &[], 2), task("b", &["a"], 3), task("c", &["b"], 0), task("d", &[], 1)];
        let graph = TaskGraph::build(&tasks).unwrap();
        graph.validate().unwrap();

        let order = graph.linear_order().unwrap();
        assert_eq!(ids(&tasks, &order), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_equal_order_falls_back_to_insertion() {
        let tasks = vec![task("x", &[], 0), task("y", &[], 0), task("z", &[], 0)];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(ids(&tasks, &graph.linear_order().unwrap()), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_levels() {
        let tasks = vec![
            task("a", &[], 0),
            task("b", &[], 1),
            task("c", &["a", "b"], 0),
            task("d", &["a"], 0),
            task("e", &["c"], 0),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        let levels: Vec<Vec<String>> = graph
            .levels()
            .unwrap()
            .iter()
            .map(|l| ids(&tasks, l))
            .collect();
        assert_eq!(levels, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn test_cycle_names_tasks_on_cycle() {
        let tasks = vec![
            task("start", &[], 0),
            task("a", &["start", "c"], 0),
            task("b", &["a"], 0),
            task("c", &["b"], 0),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        let err = graph.validate().unwrap_err();
        let cycle = err.cycle().unwrap().to_vec();
        assert_eq!(cycle, vec!["a", "c", "b", "a"]);
        assert!(graph.linear_order().is_err());
        assert!(graph.levels().is_err());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = vec![task("a", &["a"], 0)];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(
            graph.validate(),
            Err(GraphError::Cycle(vec!["a".into(), "a".into()]))
        );
    }

    #[test]
    fn test_build_rejects_unknown_and_duplicate() {
        let tasks = vec![task("a", &["ghost"], 0)];
        assert!(matches!(
            TaskGraph::build(&tasks),
            Err(GraphError::DependencyNotFound { .. })
        ));

        let tasks = vec![task("a", &[], 0), task("a", &[], 1)];
        assert_eq!(
            TaskGraph::build(&tasks).unwrap_err(),
            GraphError::DuplicateTaskId("a".into())
        );
    }

    #[test]
    fn test_transitive_dependents() {
        let tasks = vec![
            task("a", &[], 0),
            task("b", &["a"], 0),
            task("c", &["b"], 0),
            task("d", &[], 0),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(graph.transitive_dependents(0), vec![1, 2]);
        assert!(graph.transitive_dependents(3).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let tasks: Vec<CrewTask> = vec![];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert!(graph.is_empty());
        assert!(graph.linear_order().unwrap().is_empty());
        assert!(graph.levels().unwrap().is_empty());
    }
}
