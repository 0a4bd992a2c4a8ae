use thiserror::Error;

/// Failures that abort an optimisation run.
///
/// A refused run (too many demand points) and a solve that ends without an
/// optimal solution are outcomes, not errors; see [`super::RunOutcome`].
#[derive(Debug, Error)]
pub enum OptimizationError {
    /// No facilities or no demand points: there is nothing to optimise.
    #[error("cannot optimise a data set with {facilities} candidate facilities and {demand_points} demand points; both must be non-empty")]
    EmptyProblem {
        facilities: usize,
        demand_points: usize,
    },

    /// Reading the snapshot or replacing the stored flows failed.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    /// The solver could not be invoked or crashed before reporting a status.
    #[error("solver invocation failed: {0:#}")]
    Solver(anyhow::Error),
}

impl OptimizationError {
    /// Whether the message is meant for the person who supplied the data.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, OptimizationError::EmptyProblem { .. })
    }
}
