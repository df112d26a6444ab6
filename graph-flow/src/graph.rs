use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    context::Context,
    error::{GraphError, Result},
    task::{NextAction, Task, TaskResult},
};

/// Upper bound on task executions in a single run, guards against `GoTo` cycles
pub const DEFAULT_STEP_LIMIT: usize = 64;

/// A graph of tasks that can be executed
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, String>,
    start_task_id: Option<String>,
    step_limit: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: HashMap::new(),
            start_task_id: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Get the start task ID
    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }

    /// Get a task by ID
    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }

    /// The task reached by following the outgoing edge of `task_id`, if any
    pub fn next_task_id(&self, task_id: &str) -> Option<&str> {
        self.edges.get(task_id).map(String::as_str)
    }

    /// Run the graph from its start task until a task ends the run or has no
    /// outgoing edge.
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let start = self
            .start_task_id
            .clone()
            .ok_or_else(|| GraphError::NoStartTask(self.id.clone()))?;
        self.execute_from(&start, context).await
    }

    /// Run the graph starting from a specific task
    pub async fn execute_from(&self, task_id: &str, context: Context) -> Result<ExecutionResult> {
        let mut current = task_id.to_string();
        let mut trail = Vec::new();

        loop {
            if trail.len() >= self.step_limit {
                return Err(GraphError::StepLimitExceeded {
                    graph: self.id.clone(),
                    limit: self.step_limit,
                });
            }

            let result = self.execute_single_task(&current, context.clone()).await?;
            trail.push(TrailEntry {
                task_id: result.task_id.clone(),
                status_message: result.status_message.clone(),
            });

            match result.next_action {
                NextAction::Continue => match self.next_task_id(&current) {
                    Some(next) => {
                        debug!(graph = %self.id, from = %current, to = %next, "following edge");
                        current = next.to_string();
                    }
                    None => return Ok(ExecutionResult::completed(result.response, trail)),
                },
                NextAction::GoTo(target) => {
                    if !self.tasks.contains_key(&target) {
                        return Err(GraphError::TaskNotFound(target));
                    }
                    current = target;
                }
                NextAction::End => return Ok(ExecutionResult::completed(result.response, trail)),
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        info!(graph = %self.id, task = %task_id, "running task");
        let mut result = task.run(context).await?;

        // Track which task generated the result
        result.task_id = task_id.to_string();

        Ok(result)
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task; the first task added becomes the start task
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.tasks.is_empty() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    /// Add an edge between tasks. A task has at most one outgoing edge; a
    /// later edge from the same task replaces the earlier one.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.insert(from.into(), to.into());
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.graph.step_limit = limit;
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// One executed task and the status it reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub task_id: String,
    pub status_message: Option<String>,
}

/// Outcome of a graph run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub trail: Vec<TrailEntry>,
}

impl ExecutionResult {
    fn completed(response: Option<String>, trail: Vec<TrailEntry>) -> Self {
        Self { response, trail }
    }

    /// Status messages in execution order, skipping tasks that reported none
    pub fn status_messages(&self) -> Vec<String> {
        self.trail
            .iter()
            .filter_map(|entry| entry.status_message.clone())
            .collect()
    }
}
