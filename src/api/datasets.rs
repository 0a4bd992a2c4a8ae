use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::{
    api::{
        error::ApiError,
        response::{listing, ApiResponse},
    },
    controller::AppState,
    domain::{CandidateFacility, DataSetId, DemandPoint, Flow},
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// GET /api/v1/datasets/:data_set/facilities
pub async fn list_facilities(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
) -> ApiResult<Vec<CandidateFacility>> {
    let facilities = state.store.list_facilities(&data_set).await?;
    Ok(Json(listing(facilities)))
}

/// POST /api/v1/datasets/:data_set/facilities
pub async fn add_facility(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
    Json(facility): Json<CandidateFacility>,
) -> Result<(StatusCode, Json<ApiResponse<CandidateFacility>>), ApiError> {
    facility.validate()?;
    if !facility.fixed_cost.is_finite() {
        return Err(ApiError::ValidationError("fixed_cost must be finite".to_string()));
    }
    state.store.add_facility(&data_set, facility.clone()).await?;
    tracing::info!(data_set = %data_set, facility = %facility.name, "facility added");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(facility))))
}

/// DELETE /api/v1/datasets/:data_set/facilities/:name
pub async fn delete_facility(
    State(state): State<AppState>,
    Path((data_set, name)): Path<(DataSetId, String)>,
) -> ApiResult<()> {
    state.store.delete_facility(&data_set, &name).await?;
    tracing::info!(data_set = %data_set, facility = %name, "facility deleted");
    Ok(Json(ApiResponse::ok()))
}

/// GET /api/v1/datasets/:data_set/demand-points
pub async fn list_demand_points(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
) -> ApiResult<Vec<DemandPoint>> {
    let demand_points = state.store.list_demand_points(&data_set).await?;
    Ok(Json(listing(demand_points)))
}

/// POST /api/v1/datasets/:data_set/demand-points
pub async fn add_demand_point(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
    Json(demand_point): Json<DemandPoint>,
) -> Result<(StatusCode, Json<ApiResponse<DemandPoint>>), ApiError> {
    demand_point.validate()?;
    state
        .store
        .add_demand_point(&data_set, demand_point.clone())
        .await?;
    tracing::info!(data_set = %data_set, demand_point = %demand_point.name, "demand point added");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(demand_point))))
}

/// DELETE /api/v1/datasets/:data_set/demand-points/:name
pub async fn delete_demand_point(
    State(state): State<AppState>,
    Path((data_set, name)): Path<(DataSetId, String)>,
) -> ApiResult<()> {
    state.store.delete_demand_point(&data_set, &name).await?;
    tracing::info!(data_set = %data_set, demand_point = %name, "demand point deleted");
    Ok(Json(ApiResponse::ok()))
}

/// GET /api/v1/datasets/:data_set/flows
pub async fn list_flows(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
) -> ApiResult<Vec<Flow>> {
    let flows = state.store.list_flows(&data_set).await?;
    Ok(Json(listing(flows)))
}

/// Outbound volume of one candidate facility in the stored solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityThroughput {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: u32,
    pub throughput: f64,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub facilities: Vec<FacilityThroughput>,
    pub open_facilities: usize,
    pub total_flow: f64,
}

/// Per-facility totals. Facilities without flow are kept and reported closed.
pub fn summarize(facilities: &[CandidateFacility], flows: &[Flow]) -> FlowSummary {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for flow in flows {
        *totals.entry(flow.facility_name.as_str()).or_default() += flow.volume;
    }

    let facilities: Vec<FacilityThroughput> = facilities
        .iter()
        .map(|f| {
            let throughput = totals.get(f.name.as_str()).copied().unwrap_or(0.0);
            FacilityThroughput {
                name: f.name.clone(),
                latitude: f.latitude,
                longitude: f.longitude,
                capacity: f.capacity,
                throughput,
                open: throughput > 0.0,
            }
        })
        .collect();

    FlowSummary {
        open_facilities: facilities.iter().filter(|f| f.open).count(),
        total_flow: flows.iter().map(|f| f.volume).sum(),
        facilities,
    }
}

/// GET /api/v1/datasets/:data_set/flows/summary
pub async fn flow_summary(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
) -> ApiResult<FlowSummary> {
    let facilities = state.store.list_facilities(&data_set).await?;
    let flows = state.store.list_flows(&data_set).await?;
    Ok(Json(ApiResponse::success(summarize(&facilities, &flows))))
}
