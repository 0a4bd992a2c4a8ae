//! Orchestration of one optimisation run: guard, build, solve, materialise.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::materialize::{Materialization, SolutionMaterializer};
use super::model::ModelBuilder;
use super::solver::{MilpSolver, SolveOptions, SolveStatus};
use super::OptimizationError;
use crate::config::OptimizerConfig;
use crate::domain::DataSetId;
use crate::progress::ProgressSink;
use crate::repo::DataSetStore;

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub max_demand_points: usize,
    pub integer_flows: bool,
    pub solve_timeout: Option<Duration>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::from(&OptimizerConfig::default())
    }
}

impl From<&OptimizerConfig> for OptimizerSettings {
    fn from(cfg: &OptimizerConfig) -> Self {
        Self {
            max_demand_points: cfg.max_demand_points,
            integer_flows: cfg.integer_flows,
            solve_timeout: (cfg.solve_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.solve_timeout_secs)),
        }
    }
}

type LockMap = Arc<Mutex<HashMap<DataSetId, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per data set. Solve-and-replace for a data set is serialised.
///
/// Entries live only while a run holds or waits for them. The guard belongs to
/// the run future: a solve abandoned at its deadline may still occupy a
/// blocking thread after the guard is released.
#[derive(Debug, Default)]
pub struct RunLocks {
    locks: LockMap,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, data_set: &DataSetId) -> RunGuard {
        let lock = self.locks.lock().entry(data_set.clone()).or_default().clone();
        let entry = LockEntry {
            data_set: data_set.clone(),
            lock,
            locks: self.locks.clone(),
        };
        let guard = entry.lock.clone().lock_owned().await;
        RunGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of data sets with a run in progress or queued.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive access to one data set for the duration of a run.
#[derive(Debug)]
pub struct RunGuard {
    // Field order matters: the mutex guard must be released before the entry
    // checks whether anyone else still references the lock.
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry,
}

#[derive(Debug)]
struct LockEntry {
    data_set: DataSetId,
    lock: Arc<tokio::sync::Mutex<()>>,
    locks: LockMap,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // The map and this entry are the only owners: no run holds or awaits it.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.data_set);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub flows: usize,
    pub open_facilities: Vec<String>,
    pub elapsed_ms: u64,
}

/// How a run ended. None of these is a fault.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Refused before building a model; stored flows untouched.
    CapacityLimitExceeded { demand_points: usize, limit: usize },
    /// Optimal solution stored.
    Solved(RunReport),
    /// Solver ended without an optimal solution; stored flows untouched.
    SolverFailure { status: SolveStatus, objective: Option<f64> },
}

pub struct OptimizationRun {
    store: Arc<dyn DataSetStore>,
    solver: Arc<dyn MilpSolver>,
    settings: OptimizerSettings,
    locks: Arc<RunLocks>,
}

impl OptimizationRun {
    pub fn new(
        store: Arc<dyn DataSetStore>,
        solver: Arc<dyn MilpSolver>,
        settings: OptimizerSettings,
    ) -> Self {
        Self {
            store,
            solver,
            settings,
            locks: Arc::new(RunLocks::new()),
        }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(data_set = %data_set, run_id = %Uuid::new_v4()))]
    pub async fn run(
        &self,
        data_set: &DataSetId,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, OptimizationError> {
        let _guard = self.locks.acquire(data_set).await;
        let started = Instant::now();

        let demand_points = self
            .store
            .list_demand_points(data_set)
            .await
            .map_err(OptimizationError::Persistence)?;

        let limit = self.settings.max_demand_points;
        if demand_points.len() > limit {
            warn!(demand_points = demand_points.len(), limit, "run refused: too many demand points");
            progress.emit(&format!(
                "You can only solve problems with {limit} demand points or fewer; this data set has {}",
                demand_points.len()
            ));
            return Ok(RunOutcome::CapacityLimitExceeded {
                demand_points: demand_points.len(),
                limit,
            });
        }

        progress.emit("Commencing optimisation");

        let facilities = self
            .store
            .list_facilities(data_set)
            .await
            .map_err(OptimizationError::Persistence)?;

        let model = Arc::new(ModelBuilder::new(self.settings.integer_flows).build(&facilities, &demand_points)?);
        info!(
            facilities = facilities.len(),
            demand_points = demand_points.len(),
            constraints = model.constraints().len(),
            "solving facility location model"
        );

        let options = SolveOptions::new(self.settings.solve_timeout, cancel);
        let outcome = self
            .solver
            .solve(model.clone(), options)
            .await
            .map_err(OptimizationError::Solver)?;

        let materialized = SolutionMaterializer::new(self.store.as_ref(), progress)
            .apply(data_set, &model, &outcome)
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = match materialized {
            Materialization::Replaced {
                flows,
                open_facilities,
            } => {
                progress.emit("Finished");
                RunOutcome::Solved(RunReport {
                    status: outcome.status,
                    objective: outcome.objective,
                    flows,
                    open_facilities,
                    elapsed_ms,
                })
            }
            Materialization::Skipped => RunOutcome::SolverFailure {
                status: outcome.status,
                objective: outcome.objective,
            },
        };

        info!(elapsed_ms, status = %outcome.status, "optimisation run complete");
        Ok(result)
    }
}
