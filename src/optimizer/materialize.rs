//! Turns a solver outcome into stored flow records.

use tracing::{info, warn};

use super::model::{FacilityLocationModel, VariableDomain};
use super::solver::SolveOutcome;
use super::OptimizationError;
use crate::domain::{DataSetId, Flow};
use crate::progress::ProgressSink;
use crate::repo::DataSetStore;

/// Solved values closer to zero than this are treated as "no flow".
pub const FLOW_EPSILON: f64 = 1e-6;

/// Result of applying one solve outcome to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialization {
    /// The stored flows were replaced by the new solution.
    Replaced {
        flows: usize,
        open_facilities: Vec<String>,
    },
    /// The status carried no usable solution; stored flows were not touched.
    Skipped,
}

pub struct SolutionMaterializer<'a> {
    store: &'a dyn DataSetStore,
    progress: &'a dyn ProgressSink,
}

impl<'a> SolutionMaterializer<'a> {
    pub fn new(store: &'a dyn DataSetStore, progress: &'a dyn ProgressSink) -> Self {
        Self { store, progress }
    }

    pub async fn apply(
        &self,
        data_set: &DataSetId,
        model: &FacilityLocationModel,
        outcome: &SolveOutcome,
    ) -> Result<Materialization, OptimizationError> {
        self.progress.emit(&format!("Status: {}", outcome.status));
        self.progress.emit(&match outcome.objective {
            Some(objective) => format!("Total Cost = {objective}"),
            None => "Total Cost = unavailable".to_string(),
        });

        if !outcome.status.is_optimal() {
            warn!(data_set = %data_set, status = %outcome.status, "no optimal solution; stored flows left unchanged");
            self.progress.emit(&format!(
                "No optimal solution ({}); the stored solution was left unchanged",
                outcome.status
            ));
            return Ok(Materialization::Skipped);
        }

        let flows = flows_from_solution(model, &outcome.values);
        let open_facilities = open_facilities(model, &outcome.values);
        let count = flows.len();

        self.store
            .replace_flows(data_set, flows)
            .await
            .map_err(OptimizationError::Persistence)?;

        info!(data_set = %data_set, flows = count, open = open_facilities.len(), "solution stored");
        self.progress.emit(&format!(
            "Stored {count} flows from {} open facilities",
            open_facilities.len()
        ));

        Ok(Materialization::Replaced {
            flows: count,
            open_facilities,
        })
    }
}

/// Non-zero flows of a solution, facility-major. Integer flows are rounded to whole units.
pub fn flows_from_solution(model: &FacilityLocationModel, values: &[f64]) -> Vec<Flow> {
    let mut flows = Vec::new();
    for (f, facility) in model.facility_names().iter().enumerate() {
        for (d, demand) in model.demand_names().iter().enumerate() {
            let var = model.flow_var(f, d);
            let Some(&raw) = values.get(var.index()) else {
                continue;
            };
            let volume = match model.variables()[var.index()].domain {
                VariableDomain::Continuous => raw,
                VariableDomain::Integer | VariableDomain::Binary => raw.round(),
            }
            .max(0.0);
            if volume < FLOW_EPSILON {
                continue;
            }
            flows.push(Flow::new(facility.clone(), demand.clone(), volume));
        }
    }
    flows
}

/// Names of facilities whose open variable is set in the solution.
pub fn open_facilities(model: &FacilityLocationModel, values: &[f64]) -> Vec<String> {
    model
        .facility_names()
        .iter()
        .enumerate()
        .filter(|(f, _)| values.get(model.open_var(*f).index()).is_some_and(|v| *v > 0.5))
        .map(|(_, name)| name.clone())
        .collect()
}
