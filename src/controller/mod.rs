use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::optimizer::{GoodLpSolver, MilpSolver, OptimizationRun, OptimizerSettings};
use crate::repo::{self, DataSetStore};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub store: Arc<dyn DataSetStore>,
    pub runner: Arc<OptimizationRun>,
    /// Cancelled on shutdown so pending solves return promptly.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let store = repo::connect(&cfg).await?;
        Ok(Self::with_parts(cfg, store, Arc::new(GoodLpSolver)))
    }

    pub fn with_parts(cfg: Config, store: Arc<dyn DataSetStore>, solver: Arc<dyn MilpSolver>) -> Self {
        let settings = OptimizerSettings::from(&cfg.optimizer);
        info!(
            max_demand_points = settings.max_demand_points,
            integer_flows = settings.integer_flows,
            solve_timeout_secs = settings.solve_timeout.map(|t| t.as_secs()),
            "optimizer configured"
        );
        let runner = Arc::new(OptimizationRun::new(store.clone(), solver, settings));

        Self {
            cfg,
            store,
            runner,
            shutdown: CancellationToken::new(),
        }
    }
}
