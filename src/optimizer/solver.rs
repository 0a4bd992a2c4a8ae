//! MILP solver contract and the good_lp backed implementation.
//!
//! The core only depends on [`MilpSolver`]: hand it an assembled model, get back a
//! terminal status, the objective value and one value per declared variable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use good_lp::{
    constraint, solvers::microlp::microlp, variable, Expression, ProblemVariables,
    ResolutionError, Solution, SolverModel, Variable,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::model::{FacilityLocationModel, Relation, Term, VarId, VariableDomain};

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// The solver did not finish: deadline elapsed or the run was cancelled.
    NotSolved,
    /// The backend failed without a more specific diagnosis.
    Undefined,
}

impl SolveStatus {
    pub fn is_optimal(self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// Per-call limits. Both are honoured by returning [`SolveStatus::NotSolved`].
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    pub time_limit: Option<Duration>,
    pub cancel: CancellationToken,
}

impl SolveOptions {
    pub fn new(time_limit: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { time_limit, cancel }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    /// Indexed by [`VarId`]. Empty unless the status carries a solution.
    pub values: Vec<f64>,
}

impl SolveOutcome {
    pub fn optimal(objective: f64, values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective: Some(objective),
            values,
        }
    }

    pub fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            objective: None,
            values: Vec::new(),
        }
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MilpSolver: Send + Sync {
    /// Solves `model`, blocking the calling task until a terminal status is known.
    ///
    /// An `Err` means the solver could not be run at all. Infeasible, unbounded
    /// and unfinished solves are reported through [`SolveOutcome::status`].
    async fn solve(&self, model: Arc<FacilityLocationModel>, options: SolveOptions) -> Result<SolveOutcome>;
}

/// Solves with good_lp's pure-Rust `microlp` backend on a blocking worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

#[async_trait]
impl MilpSolver for GoodLpSolver {
    async fn solve(&self, model: Arc<FacilityLocationModel>, options: SolveOptions) -> Result<SolveOutcome> {
        if options.cancel.is_cancelled() {
            return Ok(SolveOutcome::without_solution(SolveStatus::NotSolved));
        }

        let worker = tokio::task::spawn_blocking(move || solve_blocking(&model));
        // microlp has no interrupt hook; an abandoned worker runs to completion
        // and its result is dropped.
        race_worker(worker, &options).await
    }
}

/// Waits for `worker` unless the deadline elapses or the token is cancelled first.
async fn race_worker<F>(worker: F, options: &SolveOptions) -> Result<SolveOutcome>
where
    F: Future<Output = std::result::Result<SolveOutcome, JoinError>>,
{
    let started = Instant::now();
    let deadline = async {
        match options.time_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        joined = worker => {
            let outcome = joined.context("solver worker terminated abnormally")?;
            debug!(
                status = %outcome.status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "solver finished"
            );
            Ok(outcome)
        }
        _ = options.cancel.cancelled() => {
            warn!("solve cancelled before the solver finished");
            Ok(SolveOutcome::without_solution(SolveStatus::NotSolved))
        }
        _ = deadline => {
            warn!(
                time_limit_secs = options.time_limit.map(|l| l.as_secs_f64()),
                "solve deadline elapsed"
            );
            Ok(SolveOutcome::without_solution(SolveStatus::NotSolved))
        }
    }
}

fn solve_blocking(model: &FacilityLocationModel) -> SolveOutcome {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = model
        .variables()
        .iter()
        .map(|decl| {
            let mut def = variable().name(decl.name.clone()).min(decl.lower);
            if let Some(upper) = decl.upper {
                def = def.max(upper);
            }
            match decl.domain {
                VariableDomain::Binary => def = def.binary(),
                VariableDomain::Integer => def = def.integer(),
                VariableDomain::Continuous => {}
            }
            vars.add(def)
        })
        .collect();

    let linear = |terms: &[Term]| -> Expression {
        terms
            .iter()
            .map(|t| t.coeff * handles[t.var.index()])
            .sum::<Expression>()
    };

    let mut problem = vars.minimise(linear(model.objective())).using(microlp);
    for row in model.constraints() {
        let lhs = linear(&row.terms);
        let bound = row.bound;
        problem = problem.with(match row.relation {
            Relation::LessOrEqual => constraint!(lhs <= bound),
            Relation::GreaterOrEqual => constraint!(lhs >= bound),
        });
    }

    match problem.solve() {
        Ok(solution) => {
            let values: Vec<f64> = handles.iter().map(|&v| solution.value(v)).collect();
            let objective = model.objective_value(&values);
            SolveOutcome::optimal(objective, values)
        }
        Err(ResolutionError::Infeasible) => SolveOutcome::without_solution(SolveStatus::Infeasible),
        Err(ResolutionError::Unbounded) => SolveOutcome::without_solution(SolveStatus::Unbounded),
        Err(other) => {
            warn!(error = %other, "solver backend failed");
            SolveOutcome::without_solution(SolveStatus::Undefined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateFacility, DemandPoint};
    use crate::optimizer::ModelBuilder;

    fn small_model() -> Arc<FacilityLocationModel> {
        let facilities = vec![
            CandidateFacility::new("Near", 0.0, 0.0, 100, 10.0),
            CandidateFacility::new("Far", 10.0, 10.0, 50, 5.0),
        ];
        let demand_points = vec![
            DemandPoint::new("East", 0.0, 0.1, 60),
            DemandPoint::new("North", 0.1, 0.0, 40),
        ];
        Arc::new(ModelBuilder::default().build(&facilities, &demand_points).unwrap())
    }

    #[test]
    fn test_status_names() {
        assert_eq!(SolveStatus::Optimal.to_string(), "Optimal");
        assert_eq!(SolveStatus::NotSolved.to_string(), "NotSolved");
        assert_eq!("Infeasible".parse::<SolveStatus>().unwrap(), SolveStatus::Infeasible);
        assert!(SolveStatus::Optimal.is_optimal());
        assert!(!SolveStatus::Undefined.is_optimal());
    }

    #[test]
    fn test_missing_values_read_as_zero() {
        let outcome = SolveOutcome::without_solution(SolveStatus::Infeasible);
        assert_eq!(outcome.value(small_model().flow_var(0, 0)), 0.0);
    }

    #[tokio::test]
    async fn test_good_lp_solves_small_instance() {
        let model = small_model();
        let outcome = GoodLpSolver
            .solve(model.clone(), SolveOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.values.len(), model.variables().len());
        assert!(model.is_feasible(&outcome.values, 1e-6));
        assert!(outcome.value(model.open_var(0)) > 0.5);
        assert!(outcome.value(model.open_var(1)) < 0.5);
    }

    #[tokio::test]
    async fn test_infeasible_capacity_is_reported() {
        let facilities = vec![CandidateFacility::new("Tiny", 0.0, 0.0, 5, 1.0)];
        let demand_points = vec![DemandPoint::new("Big", 0.0, 0.1, 50)];
        let model = Arc::new(ModelBuilder::default().build(&facilities, &demand_points).unwrap());

        let outcome = GoodLpSolver.solve(model, SolveOptions::default()).await.unwrap();

        assert!(!outcome.status.is_optimal());
        assert!(outcome.values.is_empty());
        assert_eq!(outcome.objective, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_waiting_for_worker() {
        let options = SolveOptions::new(Some(Duration::from_secs(60)), CancellationToken::new());

        let worker = std::future::pending::<Result<SolveOutcome, JoinError>>();

        let outcome = race_worker(worker, &options).await.unwrap();

        assert_eq!(outcome, SolveOutcome::without_solution(SolveStatus::NotSolved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_solve() {
        let cancel = CancellationToken::new();
        let options = SolveOptions::new(None, cancel.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let worker = std::future::pending::<Result<SolveOutcome, JoinError>>();

        let outcome = race_worker(worker, &options).await.unwrap();

        assert_eq!(outcome.status, SolveStatus::NotSolved);
        assert!(outcome.values.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_result_wins_before_deadline() {
        let options = SolveOptions::new(Some(Duration::from_secs(60)), CancellationToken::new());
        let worker = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, JoinError>(SolveOutcome::optimal(3.0, vec![1.0]))
        };

        let outcome = race_worker(worker, &options).await.unwrap();

        assert_eq!(outcome, SolveOutcome::optimal(3.0, vec![1.0]));
    }

    #[tokio::test]
    async fn test_worker_panic_is_an_error() {
        let worker = tokio::task::spawn_blocking(|| -> SolveOutcome { panic!("backend crashed") });

        let err = race_worker(worker, &SolveOptions::default()).await.unwrap_err();

        assert!(err.to_string().contains("terminated abnormally"));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_solver() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = GoodLpSolver
            .solve(small_model(), SolveOptions::new(None, cancel))
            .await
            .unwrap();

        assert_eq!(outcome.status, SolveStatus::NotSolved);
    }
}
