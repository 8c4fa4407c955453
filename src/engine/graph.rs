//! engine::graph
//!
//! A small executor for a static graph of named stages.
//!
//! # Design
//!
//! Each stage declares the stages it depends on. The executor validates the
//! graph up front (unique names, known dependencies, no cycles), then runs
//! every stage whose dependencies have all succeeded, concurrently. A stage
//! receives the outputs of the stages before it.
//!
//! When a stage fails, nothing new is scheduled. Stages already running are
//! allowed to finish so their outputs are kept; dispatched remote calls are
//! never cut off half way.
//!
//! # Example
//!
//! ```
//! use futures::FutureExt;
//! use polypatch::engine::error::Report;
//! use polypatch::engine::graph::StageGraph;
//!
//! # tokio_test::block_on(async {
//! let run = StageGraph::new()
//!     .stage("a", &[], |_| async { Report::ok(vec![1]) }.boxed())
//!     .stage("b", &["a"], |done| {
//!         let a = done.get("a").to_vec();
//!         async move { Report::ok(a.iter().map(|n| n + 1).collect()) }.boxed()
//!     })
//!     .run()
//!     .await;
//!
//! assert_eq!(run.into_report().results, vec![1, 2]);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use super::error::{EngineError, Report};

type RunFn<'a, T> = Box<dyn FnOnce(&StageOutputs<T>) -> BoxFuture<'a, Report<T>> + Send + 'a>;

struct Stage<'a, T> {
    name: &'static str,
    deps: Vec<&'static str>,
    run: RunFn<'a, T>,
}

/// Results of finished stages, by stage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutputs<T> {
    by_stage: BTreeMap<&'static str, Vec<T>>,
}

impl<T> Default for StageOutputs<T> {
    fn default() -> Self {
        Self {
            by_stage: BTreeMap::new(),
        }
    }
}

impl<T> StageOutputs<T> {
    /// Results of `stage`; empty if it has not run.
    pub fn get(&self, stage: &str) -> &[T] {
        self.by_stage.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of running a graph.
#[derive(Debug)]
pub struct GraphRun<T> {
    /// Stages that finished, successfully or not, in completion order.
    pub completed: Vec<&'static str>,
    pub outputs: StageOutputs<T>,
    /// The first stage error.
    pub error: Option<EngineError>,
}

impl<T> GraphRun<T> {
    /// Flatten stage outputs in completion order.
    pub fn into_report(mut self) -> Report<T> {
        let mut results = Vec::new();
        for stage in &self.completed {
            if let Some(out) = self.outputs.by_stage.remove(stage) {
                results.extend(out);
            }
        }
        Report {
            results,
            error: self.error,
        }
    }
}

/// A static graph of named stages.
pub struct StageGraph<'a, T> {
    stages: Vec<Stage<'a, T>>,
}

impl<'a, T> Default for StageGraph<'a, T> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<'a, T: Send + 'a> StageGraph<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage that runs after every stage in `deps` has succeeded.
    pub fn stage<F>(mut self, name: &'static str, deps: &[&'static str], run: F) -> Self
    where
        F: FnOnce(&StageOutputs<T>) -> BoxFuture<'a, Report<T>> + Send + 'a,
    {
        self.stages.push(Stage {
            name,
            deps: deps.to_vec(),
            run: Box::new(run),
        });
        self
    }

    /// Check names are unique, dependencies exist, and there is no cycle.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name) {
                return Err(EngineError::Internal(format!(
                    "duplicate stage '{}'",
                    stage.name
                )));
            }
        }
        for stage in &self.stages {
            if let Some(dep) = stage.deps.iter().find(|d| !names.contains(*d)) {
                return Err(EngineError::Internal(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    stage.name, dep
                )));
            }
        }

        // Kahn's algorithm
        let mut indegree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|s| (s.name, s.deps.len()))
            .collect();
        let mut ready: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut visited = 0;
        while let Some(name) = ready.pop_front() {
            visited += 1;
            for stage in self.stages.iter().filter(|s| s.deps.iter().any(|d| *d == name)) {
                let n = indegree.entry(stage.name).or_default();
                *n -= stage.deps.iter().filter(|d| **d == name).count();
                if *n == 0 {
                    ready.push_back(stage.name);
                }
            }
        }
        if visited != self.stages.len() {
            return Err(EngineError::Internal("stage graph has a cycle".into()));
        }
        Ok(())
    }

    /// Run the graph to completion or first failure.
    pub async fn run(self) -> GraphRun<T> {
        let mut run = GraphRun {
            completed: Vec::new(),
            outputs: StageOutputs::default(),
            error: None,
        };
        if let Err(e) = self.validate() {
            run.error = Some(e);
            return run;
        }

        let mut pending = self.stages;
        let mut succeeded: HashSet<&'static str> = HashSet::new();
        let mut running = FuturesUnordered::new();

        loop {
            if run.error.is_none() {
                let (ready, waiting): (Vec<_>, Vec<_>) = pending
                    .into_iter()
                    .partition(|s| s.deps.iter().all(|d| succeeded.contains(d)));
                pending = waiting;
                for stage in ready {
                    debug!(stage = stage.name, "starting stage");
                    let name = stage.name;
                    let fut = (stage.run)(&run.outputs);
                    running.push(async move { (name, fut.await) });
                }
            }

            let Some((name, report)) = running.next().await else {
                break;
            };
            let Report { results, error } = report;
            run.outputs.by_stage.insert(name, results);
            run.completed.push(name);
            match error {
                None => {
                    debug!(stage = name, "stage finished");
                    succeeded.insert(name);
                }
                Some(e) => {
                    warn!(stage = name, error = %e, "stage failed");
                    if run.error.is_none() {
                        run.error = Some(e);
                    }
                }
            }
        }

        if run.error.is_none() && !pending.is_empty() {
            run.error = Some(EngineError::Internal(
                "stages left unscheduled without a failure".into(),
            ));
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};

    fn log() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn runs_in_dependency_order() {
        let order = log();
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());
        let run = StageGraph::new()
            .stage("pr", &["commit"], move |_| {
                async move {
                    o3.lock().unwrap().push("pr");
                    Report::ok(vec![3])
                }
                .boxed()
            })
            .stage("branch", &[], move |_| {
                async move {
                    o1.lock().unwrap().push("branch");
                    Report::ok(vec![1])
                }
                .boxed()
            })
            .stage("commit", &["branch"], move |_| {
                async move {
                    o2.lock().unwrap().push("commit");
                    Report::ok(vec![2])
                }
                .boxed()
            })
            .run()
            .await;

        assert_eq!(*order.lock().unwrap(), vec!["branch", "commit", "pr"]);
        assert_eq!(run.completed, vec!["branch", "commit", "pr"]);
        assert_eq!(run.into_report(), Report::ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn downstream_sees_upstream_outputs() {
        let run = StageGraph::new()
            .stage("a", &[], |_| async { Report::ok(vec![10, 20]) }.boxed())
            .stage("b", &[], |_| async { Report::ok(vec![1]) }.boxed())
            .stage("sum", &["a", "b"], |done| {
                let total: i32 = done.get("a").iter().chain(done.get("b")).sum();
                async move { Report::ok(vec![total]) }.boxed()
            })
            .run()
            .await;

        assert!(run.error.is_none());
        assert_eq!(run.outputs.get("sum"), &[31]);
    }

    #[tokio::test]
    async fn failure_stops_downstream_and_keeps_partial_results() {
        let ran = log();
        let r = ran.clone();
        let run = StageGraph::new()
            .stage("branch", &[], |_| {
                async {
                    Report {
                        results: vec![1],
                        error: Some(EngineError::Internal("boom".into())),
                    }
                }
                .boxed()
            })
            .stage("commit", &["branch"], move |_| {
                async move {
                    r.lock().unwrap().push("commit");
                    Report::ok(vec![2])
                }
                .boxed()
            })
            .run()
            .await;

        assert!(ran.lock().unwrap().is_empty());
        let report = run.into_report();
        assert_eq!(report.results, vec![1]);
        assert_eq!(report.error, Some(EngineError::Internal("boom".into())));
    }

    #[tokio::test]
    async fn in_flight_siblings_finish_after_failure() {
        let run = StageGraph::new()
            .stage("fails", &[], |_| {
                async { Report::<u8>::failed(EngineError::Internal("x".into())) }.boxed()
            })
            .stage("slow", &[], |_| {
                async {
                    tokio::task::yield_now().await;
                    Report::ok(vec![7])
                }
                .boxed()
            })
            .stage("after", &["slow"], |_| async { Report::ok(vec![8]) }.boxed())
            .run()
            .await;

        assert_eq!(run.outputs.get("slow"), &[7]);
        assert!(run.outputs.get("after").is_empty());
        assert!(run.error.is_some());
    }

    #[test]
    fn validation_errors() {
        let noop = |_: &StageOutputs<u8>| async { Report::ok(vec![]) }.boxed();

        let dup = StageGraph::new().stage("a", &[], noop).stage("a", &[], noop);
        assert!(matches!(dup.validate(), Err(EngineError::Internal(m)) if m.contains("duplicate")));

        let unknown = StageGraph::new().stage("a", &["ghost"], noop);
        assert!(matches!(unknown.validate(), Err(EngineError::Internal(m)) if m.contains("unknown")));

        let cycle = StageGraph::new()
            .stage("a", &["b"], noop)
            .stage("b", &["a"], noop);
        assert!(matches!(cycle.validate(), Err(EngineError::Internal(m)) if m.contains("cycle")));
    }

    #[tokio::test]
    async fn invalid_graph_runs_nothing() {
        let run = StageGraph::new()
            .stage("a", &["a"], |_| async { Report::ok(vec![1]) }.boxed())
            .run()
            .await;
        assert!(run.completed.is_empty());
        assert!(matches!(run.error, Some(EngineError::Internal(_))));
    }
}
