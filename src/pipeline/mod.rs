pub mod progress;
pub mod stage;
pub mod workspace;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::models::errors::{PipelineError, RetryError};
use crate::pipeline::progress::{ProgressSink, StageStatus};
use crate::pipeline::stage::Stage;
use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::utils::cancel::ExecutionContext;

/// Runs registered stages one at a time in dependency order.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    // Indices into `stages`, recomputed on every registration
    order: Vec<usize>,
    seeded: HashSet<WorkspaceKey>,
    progress: Vec<Arc<dyn ProgressSink>>,
}

impl Pipeline {
    /// A pipeline whose workspace is seeded with `raw_data`.
    pub fn new() -> Self {
        Self::with_seeded_keys([WorkspaceKey::RawData])
    }

    pub fn with_seeded_keys(keys: impl IntoIterator<Item = WorkspaceKey>) -> Self {
        Self {
            stages: Vec::new(),
            order: Vec::new(),
            seeded: keys.into_iter().collect(),
            progress: Vec::new(),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress.push(sink);
        self
    }

    pub fn register<S: Stage + 'static>(&mut self, stage: S) -> Result<(), PipelineError> {
        self.register_all(vec![Box::new(stage)])
    }

    /// Registers a batch atomically. Stages in the batch may depend on each
    /// other regardless of their position in it.
    pub fn register_all(&mut self, batch: Vec<Box<dyn Stage>>) -> Result<(), PipelineError> {
        let mut names: HashSet<String> = self.stages.iter().map(|s| s.name().to_string()).collect();
        for stage in &batch {
            if !names.insert(stage.name().to_string()) {
                return Err(PipelineError::DuplicateStage(stage.name().to_string()));
            }
        }

        for stage in &batch {
            if let Some(missing) = stage
                .dependencies()
                .into_iter()
                .find(|dependency| !names.contains(dependency))
            {
                return Err(PipelineError::MissingDependency {
                    stage: stage.name().to_string(),
                    dependency: missing,
                });
            }
        }

        let first_new = self.stages.len();
        self.stages.extend(batch);

        let outcome = topological_order(&self.stages).and_then(|order| {
            self.check_reads(first_new)?;
            Ok(order)
        });
        match outcome {
            Ok(order) => {
                self.order = order;
                debug!("Execution order: {:?}", self.order());
                Ok(())
            }
            Err(e) => {
                self.stages.truncate(first_new);
                Err(e)
            }
        }
    }

    /// Every read of a newly registered stage must be seeded or written by a
    /// transitive dependency.
    fn check_reads(&self, first_new: usize) -> Result<(), PipelineError> {
        let index: HashMap<&str, usize> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (stage.name(), i))
            .collect();

        for stage in &self.stages[first_new..] {
            let available = self.upstream_writes(stage.as_ref(), &index);
            for key in stage.reads() {
                if !self.seeded.contains(&key) && !available.contains(&key) {
                    return Err(PipelineError::UnavailableKey {
                        stage: stage.name().to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn upstream_writes(&self, stage: &dyn Stage, index: &HashMap<&str, usize>) -> HashSet<WorkspaceKey> {
        let mut writes = HashSet::new();
        let mut visited = HashSet::new();
        let mut pending: Vec<String> = stage.dependencies();

        while let Some(name) = pending.pop() {
            let Some(&i) = index.get(name.as_str()) else {
                continue;
            };
            if !visited.insert(i) {
                continue;
            }
            let upstream = &self.stages[i];
            writes.extend(upstream.writes());
            pending.extend(upstream.dependencies());
        }
        writes
    }

    /// Stage names in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.stages[i].name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage once, in order, stopping at the first failure.
    ///
    /// Stages operate on a copy of `workspace` that replaces it only when
    /// all stages succeed.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        workspace: &mut Workspace,
    ) -> Result<(), PipelineError> {
        let mut scratch = workspace.clone();

        for &i in &self.order {
            self.emit(self.stages[i].name(), StageStatus::NotStarted);
        }

        let pipeline_start = Instant::now();
        for &i in &self.order {
            let stage = &self.stages[i];
            let name = stage.name();

            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    stage: name.to_string(),
                });
            }

            self.emit(name, StageStatus::Running);
            let stage_start = Instant::now();

            if let Err(e) = stage.process(ctx, &mut scratch).await {
                self.emit(name, StageStatus::Errored);
                error!("Stage '{}' failed: {:#}", name, e);

                if ctx.is_cancelled() || is_cancellation(&e) {
                    return Err(PipelineError::Cancelled {
                        stage: name.to_string(),
                    });
                }
                return Err(PipelineError::StageFailed {
                    stage: name.to_string(),
                    source: e,
                });
            }

            self.emit(name, StageStatus::Finished);
            debug!(
                "Stage '{}' finished in {:.3}s",
                name,
                stage_start.elapsed().as_secs_f64()
            );

            for key in stage.writes() {
                if !scratch.contains(&key) {
                    warn!("Stage '{}' declares '{}' but did not publish it", name, key);
                }
            }
        }

        info!(
            "Pipeline finished {} stages in {:.3}s",
            self.order.len(),
            pipeline_start.elapsed().as_secs_f64()
        );
        *workspace = scratch;
        Ok(())
    }

    fn emit(&self, stage: &str, status: StageStatus) {
        for sink in &self.progress {
            sink.on_transition(stage, status);
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cancellation(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<RetryError>()
            .is_some_and(RetryError::is_cancelled)
    })
}

/// Kahn's algorithm over edges dependency -> dependent. Ties keep
/// registration order, but callers must not rely on that.
fn topological_order(stages: &[Box<dyn Stage>]) -> Result<Vec<usize>, PipelineError> {
    let index: HashMap<&str, usize> = stages
        .iter()
        .enumerate()
        .map(|(i, stage)| (stage.name(), i))
        .collect();

    let mut in_degree = vec![0usize; stages.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    for (i, stage) in stages.iter().enumerate() {
        for dependency in stage.dependencies() {
            if let Some(&d) = index.get(dependency.as_str()) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..stages.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(stages.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() < stages.len() {
        let unresolved = (0..stages.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| stages[i].name().to_string())
            .collect();
        return Err(PipelineError::Cycle {
            registered: stages.len(),
            ordered: order.len(),
            unresolved,
        });
    }
    Ok(order)
}
