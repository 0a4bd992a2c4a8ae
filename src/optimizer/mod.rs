//! Facility location optimisation.
//!
//! Data flows one way: facility/demand snapshot -> [`ModelBuilder`] ->
//! [`MilpSolver`] -> [`SolutionMaterializer`] -> stored flows.
//! [`OptimizationRun`] drives the sequence for one data set.

pub mod cost;
pub mod error;
pub mod materialize;
pub mod model;
pub mod run;
pub mod solver;

pub use cost::{haversine_km, transport_cost_per_unit, EARTH_RADIUS_KM};
pub use error::OptimizationError;
pub use materialize::{flows_from_solution, open_facilities, Materialization, SolutionMaterializer};
pub use model::{ConstraintKind, ConstraintRecord, FacilityLocationModel, ModelBuilder, VarId};
pub use run::{OptimizationRun, OptimizerSettings, RunGuard, RunLocks, RunOutcome, RunReport};
pub use solver::{GoodLpSolver, MilpSolver, SolveOptions, SolveOutcome, SolveStatus};
