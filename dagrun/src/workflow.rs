/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Workflow Management
//!
//! The in-memory model of a workflow: a directed acyclic graph of task
//! descriptors with dependency management, structural validation and
//! topological layering.
//!
//! ## Core Components
//!
//! - `Workflow`: the task graph plus global parameters and run policy
//! - `DependencyGraph`: low-level dependency tracking and cycle detection
//! - `WorkflowBuilder`: fluent interface for programmatic construction
//!
//! Layering assigns each task its longest-path distance from a root; all
//! tasks in one layer may run in parallel, and the execution engine drains
//! layers in order.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::{Directed, Graph};

use crate::alert::AlertConfig;
use crate::error::ValidationError;
use crate::params::ParamMap;
use crate::task::TaskSpec;

/// Low-level representation of task dependencies.
///
/// Nodes are task IDs; an edge `u -> v` means `v` depends on `u`. Both
/// directions are indexed so predecessor and successor queries are cheap.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    predecessors: HashMap<String, Vec<String>>,
    successors: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node_id: String) {
        self.nodes.insert(node_id);
    }

    pub fn add_edge(&mut self, from: String, to: String) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());

        let preds = self.predecessors.entry(to.clone()).or_default();
        if !preds.contains(&from) {
            preds.push(from.clone());
        }
        let succs = self.successors.entry(from).or_default();
        if !succs.contains(&to) {
            succs.push(to);
        }
    }

    pub fn predecessors(&self, node_id: &str) -> &[String] {
        self.predecessors
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check if the graph contains cycles
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.to_petgraph())
    }

    /// Get tasks in topological order
    pub fn topological_sort(&self) -> Result<Vec<String>, ValidationError> {
        let graph = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx].clone()).collect()),
            Err(_) => Err(ValidationError::CyclicDependency {
                cycle: self.find_cycle().unwrap_or_default(),
            }),
        }
    }

    fn to_petgraph(&self) -> Graph<String, (), Directed> {
        let mut graph = Graph::<String, (), Directed>::new();
        let mut indices = HashMap::new();

        for node in &self.nodes {
            let index = graph.add_node(node.clone());
            indices.insert(node.clone(), index);
        }
        for (from, targets) in &self.successors {
            if let Some(&from_index) = indices.get(from) {
                for to in targets {
                    if let Some(&to_index) = indices.get(to) {
                        graph.add_edge(from_index, to_index, ());
                    }
                }
            }
        }

        graph
    }

    /// Find a witness cycle via DFS, for error reporting.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut nodes: Vec<&String> = self.nodes.iter().collect();
        nodes.sort();
        for node in nodes {
            if !visited.contains(node.as_str()) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        for next in self.successors(node) {
            if !visited.contains(next) {
                if let Some(cycle) = self.dfs_cycle(next, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(next) {
                let cycle_start = path.iter().position(|x| x == next).unwrap_or(0);
                let mut cycle = path[cycle_start..].to_vec();
                cycle.push(next.clone());
                return Some(cycle);
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }

    /// Group tasks by longest-path distance from a root. Tasks within one
    /// layer have no dependency relationship and may run in parallel.
    pub fn execution_layers(&self) -> Result<Vec<Vec<String>>, ValidationError> {
        let sorted = self.topological_sort()?;
        let mut layer_of: HashMap<&str, usize> = HashMap::new();
        let mut layers: Vec<Vec<String>> = Vec::new();

        for node in &sorted {
            let layer = self
                .predecessors(node)
                .iter()
                .map(|pred| layer_of.get(pred.as_str()).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            layer_of.insert(node, layer);
            if layers.len() <= layer {
                layers.resize_with(layer + 1, Vec::new);
            }
            layers[layer].push(node.clone());
        }

        for layer in &mut layers {
            layer.sort();
        }
        Ok(layers)
    }
}

/// A workflow: named task graph, global parameters, failure policy and
/// optional alerting.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    description: Option<String>,
    globals: ParamMap,
    tasks: HashMap<String, TaskSpec>,
    graph: DependencyGraph,
    fail_fast: bool,
    alert: Option<AlertConfig>,
}

impl Workflow {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            globals: ParamMap::new(),
            tasks: HashMap::new(),
            graph: DependencyGraph::new(),
            fail_fast: true,
            alert: None,
        }
    }

    pub fn builder(name: &str) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = Some(description.to_string());
    }

    pub fn globals(&self) -> &ParamMap {
        &self.globals
    }

    /// Merge parameters into the workflow-global scope.
    pub fn set_params(&mut self, params: &ParamMap) {
        self.globals.extend(params);
    }

    pub fn set_param(&mut self, key: &str, value: &str) {
        self.globals.insert(key, value);
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn set_fail_fast(&mut self, fail_fast: bool) {
        self.fail_fast = fail_fast;
    }

    pub fn alert(&self) -> Option<&AlertConfig> {
        self.alert.as_ref()
    }

    pub fn set_alert(&mut self, alert: AlertConfig) {
        self.alert = Some(alert);
    }

    /// Add a task to the workflow.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateTask` when the ID is already taken.
    pub fn add_task(&mut self, task: TaskSpec) -> Result<(), ValidationError> {
        if self.tasks.contains_key(&task.task_id) {
            return Err(ValidationError::DuplicateTask(task.task_id));
        }
        self.graph.add_node(task.task_id.clone());
        self.tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    /// Add a dependency edge `from -> to`.
    ///
    /// Both endpoints must be declared tasks and self-loops are rejected;
    /// cycle detection happens during [`Workflow::validate`].
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), ValidationError> {
        for endpoint in [from, to] {
            if !self.tasks.contains_key(endpoint) {
                return Err(ValidationError::UnknownEdgeTask {
                    task: endpoint.to_string(),
                });
            }
        }
        if from == to {
            return Err(ValidationError::SelfDependency(from.to_string()));
        }
        self.graph.add_edge(from.to_string(), to.to_string());
        Ok(())
    }

    /// Validate the workflow structure.
    ///
    /// Checks for empty workflows and circular dependencies. Edge endpoints
    /// are already validated on insertion.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tasks.is_empty() {
            return Err(ValidationError::EmptyWorkflow);
        }
        if self.graph.has_cycles() {
            let cycle = self.graph.find_cycle().unwrap_or_default();
            return Err(ValidationError::CyclicDependency { cycle });
        }
        Ok(())
    }

    pub fn topological_sort(&self) -> Result<Vec<String>, ValidationError> {
        self.validate()?;
        self.graph.topological_sort()
    }

    /// Tasks grouped by execution layer; see
    /// [`DependencyGraph::execution_layers`].
    pub fn execution_layers(&self) -> Result<Vec<Vec<String>>, ValidationError> {
        self.validate()?;
        self.graph.execution_layers()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.tasks.get(task_id)
    }

    pub fn contains_task(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn predecessors(&self, task_id: &str) -> &[String] {
        self.graph.predecessors(task_id)
    }

    pub fn successors(&self, task_id: &str) -> &[String] {
        self.graph.successors(task_id)
    }

    /// All dependency edges as `(from, to)` pairs, sorted for stable output.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for from in self.tasks.keys() {
            for to in self.graph.successors(from) {
                edges.push((from.clone(), to.clone()));
            }
        }
        edges.sort();
        edges
    }

    /// The task and everything reachable downstream of it.
    pub fn downstream_closure(&self, task_id: &str) -> Result<HashSet<String>, ValidationError> {
        self.closure(task_id, |graph, node| graph.successors(node))
    }

    /// The task and everything upstream of it.
    pub fn upstream_closure(&self, task_id: &str) -> Result<HashSet<String>, ValidationError> {
        self.closure(task_id, |graph, node| graph.predecessors(node))
    }

    fn closure<'a, F>(&'a self, task_id: &str, next: F) -> Result<HashSet<String>, ValidationError>
    where
        F: Fn(&'a DependencyGraph, &str) -> &'a [String],
    {
        if !self.tasks.contains_key(task_id) {
            return Err(ValidationError::UnknownTask(task_id.to_string()));
        }

        let mut result = HashSet::new();
        let mut queue = VecDeque::from([task_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !result.insert(current.clone()) {
                continue;
            }
            for node in next(&self.graph, &current) {
                queue.push_back(node.clone());
            }
        }
        Ok(result)
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .tasks
            .keys()
            .filter(|id| self.graph.predecessors(id).is_empty())
            .cloned()
            .collect();
        roots.sort();
        roots
    }

    /// Tasks no other task depends on.
    pub fn leaves(&self) -> Vec<String> {
        let mut leaves: Vec<String> = self
            .tasks
            .keys()
            .filter(|id| self.graph.successors(id).is_empty())
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }
}

/// Builder pattern for convenient and fluent workflow construction.
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            workflow: Workflow::new(name),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.workflow.set_description(description);
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.workflow.set_param(key, value);
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.workflow.set_fail_fast(fail_fast);
        self
    }

    pub fn alert(mut self, alert: AlertConfig) -> Self {
        self.workflow.set_alert(alert);
        self
    }

    pub fn add_task(mut self, task: TaskSpec) -> Result<Self, ValidationError> {
        self.workflow.add_task(task)?;
        Ok(self)
    }

    pub fn dependency(mut self, from: &str, to: &str) -> Result<Self, ValidationError> {
        self.workflow.add_dependency(from, to)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Workflow, ValidationError> {
        self.workflow.validate()?;
        Ok(self.workflow)
    }
}
