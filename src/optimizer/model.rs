//! Capacitated facility location model.
//!
//! Variables:
//! - `open[f]`: binary, 1 when facility `f` is commissioned
//! - `flow[f][d]`: non-negative units routed from `f` to demand point `d`
//!
//! Objective (minimise): `sum flow[f][d] * cost(f, d) + sum fixed_cost[f] * open[f]`
//!
//! Constraints, generated in three passes:
//! 1. capacity, per facility: `sum_d flow[f][d] - capacity[f] * open[f] <= 0`
//! 2. demand, per demand point: `sum_f flow[f][d] >= demand[d]`
//! 3. open link, per pair: `flow[f][d] - demand[d] * open[f] <= 0`
//!
//! Rows of pass 3 are implied by 1 and 2 for integer solutions; they tighten
//! the LP relaxation.

use itertools::Itertools;
use std::fmt;
use tracing::debug;

use super::cost::transport_cost_per_unit;
use super::OptimizationError;
use crate::domain::{CandidateFacility, DemandPoint};

/// Index of a decision variable within a [`FacilityLocationModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableDomain {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub domain: VariableDomain,
    pub lower: f64,
    /// `None` means unbounded above.
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub var: VarId,
    pub coeff: f64,
}

impl Term {
    fn new(var: VarId, coeff: f64) -> Self {
        Self { var, coeff }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    GreaterOrEqual,
}

/// What a constraint row encodes, with indices into the model's facilities and demand points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Capacity { facility: usize },
    Demand { demand: usize },
    OpenLink { facility: usize, demand: usize },
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Capacity { facility } => write!(f, "capacity[{facility}]"),
            ConstraintKind::Demand { demand } => write!(f, "demand[{demand}]"),
            ConstraintKind::OpenLink { facility, demand } => {
                write!(f, "open_link[{facility}][{demand}]")
            }
        }
    }
}

/// One linear row: `sum(terms) relation bound`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRecord {
    pub kind: ConstraintKind,
    pub terms: Vec<Term>,
    pub relation: Relation,
    pub bound: f64,
}

impl ConstraintRecord {
    /// Whether `values` (indexed by variable) satisfy the row within `tolerance`.
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs: f64 = self
            .terms
            .iter()
            .map(|t| t.coeff * values[t.var.index()])
            .sum();
        match self.relation {
            Relation::LessOrEqual => lhs <= self.bound + tolerance,
            Relation::GreaterOrEqual => lhs >= self.bound - tolerance,
        }
    }
}

/// Assembled MILP for one data-set snapshot. Solver agnostic.
#[derive(Debug, Clone)]
pub struct FacilityLocationModel {
    facility_names: Vec<String>,
    demand_names: Vec<String>,
    variables: Vec<VariableDecl>,
    objective: Vec<Term>,
    constraints: Vec<ConstraintRecord>,
}

impl FacilityLocationModel {
    pub fn facility_names(&self) -> &[String] {
        &self.facility_names
    }

    pub fn demand_names(&self) -> &[String] {
        &self.demand_names
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn objective(&self) -> &[Term] {
        &self.objective
    }

    pub fn constraints(&self) -> &[ConstraintRecord] {
        &self.constraints
    }

    pub fn open_var(&self, facility: usize) -> VarId {
        debug_assert!(facility < self.facility_names.len());
        VarId(facility)
    }

    pub fn flow_var(&self, facility: usize, demand: usize) -> VarId {
        let n_dem = self.demand_names.len();
        debug_assert!(demand < n_dem);
        VarId(self.facility_names.len() + facility * n_dem + demand)
    }

    /// Objective value of an assignment indexed by variable.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|t| t.coeff * values[t.var.index()])
            .sum()
    }

    /// Whether an assignment satisfies every row within `tolerance`.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        values.len() == self.variables.len()
            && self
                .constraints
                .iter()
                .all(|row| row.is_satisfied(values, tolerance))
    }
}

/// Builds a [`FacilityLocationModel`] from the facility and demand records of one data set.
#[derive(Debug, Clone, Copy)]
pub struct ModelBuilder {
    flow_domain: VariableDomain,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ModelBuilder {
    pub fn new(integer_flows: bool) -> Self {
        let flow_domain = if integer_flows {
            VariableDomain::Integer
        } else {
            VariableDomain::Continuous
        };
        Self { flow_domain }
    }

    pub fn build(
        &self,
        facilities: &[CandidateFacility],
        demand_points: &[DemandPoint],
    ) -> Result<FacilityLocationModel, OptimizationError> {
        if facilities.is_empty() || demand_points.is_empty() {
            return Err(OptimizationError::EmptyProblem {
                facilities: facilities.len(),
                demand_points: demand_points.len(),
            });
        }

        let mut model = FacilityLocationModel {
            facility_names: facilities.iter().map(|f| f.name.clone()).collect(),
            demand_names: demand_points.iter().map(|d| d.name.clone()).collect(),
            variables: Vec::with_capacity(facilities.len() * (demand_points.len() + 1)),
            objective: Vec::new(),
            constraints: Vec::new(),
        };

        self.declare_variables(&mut model, facilities, demand_points);
        model.objective = objective_terms(&model, facilities, demand_points);

        let capacity = capacity_rows(&model, facilities);
        let demand = demand_rows(&model, demand_points);
        let open_link = open_link_rows(&model, demand_points);
        model.constraints = capacity.into_iter().chain(demand).chain(open_link).collect();

        debug!(
            facilities = facilities.len(),
            demand_points = demand_points.len(),
            variables = model.variables.len(),
            constraints = model.constraints.len(),
            "facility location model assembled"
        );

        Ok(model)
    }

    // Order must match `open_var` / `flow_var`: all open vars, then flows facility-major.
    fn declare_variables(
        &self,
        model: &mut FacilityLocationModel,
        facilities: &[CandidateFacility],
        demand_points: &[DemandPoint],
    ) {
        for facility in facilities {
            model.variables.push(VariableDecl {
                name: format!("open[{}]", facility.name),
                domain: VariableDomain::Binary,
                lower: 0.0,
                upper: Some(1.0),
            });
        }
        for (facility, demand_point) in facilities.iter().cartesian_product(demand_points) {
            model.variables.push(VariableDecl {
                name: format!("flow[{}][{}]", facility.name, demand_point.name),
                domain: self.flow_domain,
                lower: 0.0,
                upper: None,
            });
        }
    }
}

fn objective_terms(
    model: &FacilityLocationModel,
    facilities: &[CandidateFacility],
    demand_points: &[DemandPoint],
) -> Vec<Term> {
    let transport = facilities.iter().enumerate().flat_map(|(f, facility)| {
        demand_points.iter().enumerate().map(move |(d, demand_point)| {
            Term::new(
                model.flow_var(f, d),
                transport_cost_per_unit(facility, demand_point),
            )
        })
    });
    let fixed = facilities
        .iter()
        .enumerate()
        .map(|(f, facility)| Term::new(model.open_var(f), facility.fixed_cost));

    transport.chain(fixed).collect()
}

fn capacity_rows(model: &FacilityLocationModel, facilities: &[CandidateFacility]) -> Vec<ConstraintRecord> {
    let n_dem = model.demand_names.len();
    facilities
        .iter()
        .enumerate()
        .map(|(f, facility)| {
            let mut terms: Vec<Term> = (0..n_dem).map(|d| Term::new(model.flow_var(f, d), 1.0)).collect();
            terms.push(Term::new(model.open_var(f), -f64::from(facility.capacity)));
            ConstraintRecord {
                kind: ConstraintKind::Capacity { facility: f },
                terms,
                relation: Relation::LessOrEqual,
                bound: 0.0,
            }
        })
        .collect()
}

fn demand_rows(model: &FacilityLocationModel, demand_points: &[DemandPoint]) -> Vec<ConstraintRecord> {
    let n_fac = model.facility_names.len();
    demand_points
        .iter()
        .enumerate()
        .map(|(d, demand_point)| ConstraintRecord {
            kind: ConstraintKind::Demand { demand: d },
            terms: (0..n_fac).map(|f| Term::new(model.flow_var(f, d), 1.0)).collect(),
            relation: Relation::GreaterOrEqual,
            bound: f64::from(demand_point.demand),
        })
        .collect()
}

fn open_link_rows(model: &FacilityLocationModel, demand_points: &[DemandPoint]) -> Vec<ConstraintRecord> {
    (0..model.facility_names.len())
        .cartesian_product(demand_points.iter().enumerate())
        .map(|(f, (d, demand_point))| ConstraintRecord {
            kind: ConstraintKind::OpenLink { facility: f, demand: d },
            terms: vec![
                Term::new(model.flow_var(f, d), 1.0),
                Term::new(model.open_var(f), -f64::from(demand_point.demand)),
            ],
            relation: Relation::LessOrEqual,
            bound: 0.0,
        })
        .collect()
}
