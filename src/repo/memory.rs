use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{DataSetStore, RecordKind, StoreError};
use crate::domain::{CandidateFacility, DataSetId, DemandPoint, Flow};

#[derive(Debug, Default)]
struct DataSetRecords {
    facilities: Vec<CandidateFacility>,
    demand_points: Vec<DemandPoint>,
    flows: Vec<Flow>,
}

/// Process-local store. Each mutation holds the write lock for its whole duration,
/// so a flow replacement is never observed half done.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_sets: RwLock<HashMap<DataSetId, DataSetRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, data_set: &DataSetId, f: impl FnOnce(&DataSetRecords) -> T) -> Option<T> {
        self.data_sets.read().get(data_set).map(f)
    }
}

#[async_trait]
impl DataSetStore for MemoryStore {
    async fn list_facilities(&self, data_set: &DataSetId) -> Result<Vec<CandidateFacility>> {
        Ok(self
            .read(data_set, |r| r.facilities.clone())
            .unwrap_or_default())
    }

    async fn list_demand_points(&self, data_set: &DataSetId) -> Result<Vec<DemandPoint>> {
        Ok(self
            .read(data_set, |r| r.demand_points.clone())
            .unwrap_or_default())
    }

    async fn list_flows(&self, data_set: &DataSetId) -> Result<Vec<Flow>> {
        Ok(self.read(data_set, |r| r.flows.clone()).unwrap_or_default())
    }

    async fn add_facility(&self, data_set: &DataSetId, facility: CandidateFacility) -> Result<()> {
        let mut guard = self.data_sets.write();
        let records = guard.entry(data_set.clone()).or_default();
        if records.facilities.iter().any(|f| f.name == facility.name) {
            return Err(StoreError::DuplicateName {
                kind: RecordKind::Facility,
                name: facility.name,
                data_set: data_set.clone(),
            }
            .into());
        }
        records.facilities.push(facility);
        Ok(())
    }

    async fn add_demand_point(&self, data_set: &DataSetId, demand_point: DemandPoint) -> Result<()> {
        let mut guard = self.data_sets.write();
        let records = guard.entry(data_set.clone()).or_default();
        if records.demand_points.iter().any(|d| d.name == demand_point.name) {
            return Err(StoreError::DuplicateName {
                kind: RecordKind::DemandPoint,
                name: demand_point.name,
                data_set: data_set.clone(),
            }
            .into());
        }
        records.demand_points.push(demand_point);
        Ok(())
    }

    async fn delete_facility(&self, data_set: &DataSetId, name: &str) -> Result<()> {
        let mut guard = self.data_sets.write();
        let records = guard.get_mut(data_set);
        let Some(records) = records.filter(|r| r.facilities.iter().any(|f| f.name == name)) else {
            return Err(StoreError::NotFound {
                kind: RecordKind::Facility,
                name: name.to_string(),
                data_set: data_set.clone(),
            }
            .into());
        };
        records.facilities.retain(|f| f.name != name);
        let before = records.flows.len();
        records.flows.retain(|flow| flow.facility_name != name);
        debug!(data_set = %data_set, facility = name, cascaded = before - records.flows.len(), "facility deleted");
        Ok(())
    }

    async fn delete_demand_point(&self, data_set: &DataSetId, name: &str) -> Result<()> {
        let mut guard = self.data_sets.write();
        let records = guard.get_mut(data_set);
        let Some(records) = records.filter(|r| r.demand_points.iter().any(|d| d.name == name)) else {
            return Err(StoreError::NotFound {
                kind: RecordKind::DemandPoint,
                name: name.to_string(),
                data_set: data_set.clone(),
            }
            .into());
        };
        records.demand_points.retain(|d| d.name != name);
        let before = records.flows.len();
        records.flows.retain(|flow| flow.demand_name != name);
        debug!(data_set = %data_set, demand_point = name, cascaded = before - records.flows.len(), "demand point deleted");
        Ok(())
    }

    async fn replace_flows(&self, data_set: &DataSetId, flows: Vec<Flow>) -> Result<()> {
        let mut guard = self.data_sets.write();
        let records = guard.entry(data_set.clone()).or_default();

        let facilities: HashSet<&str> = records.facilities.iter().map(|f| f.name.as_str()).collect();
        let demand_points: HashSet<&str> = records.demand_points.iter().map(|d| d.name.as_str()).collect();
        for flow in &flows {
            if !facilities.contains(flow.facility_name.as_str()) {
                return Err(StoreError::UnknownReference {
                    kind: RecordKind::Facility,
                    name: flow.facility_name.clone(),
                    data_set: data_set.clone(),
                }
                .into());
            }
            if !demand_points.contains(flow.demand_name.as_str()) {
                return Err(StoreError::UnknownReference {
                    kind: RecordKind::DemandPoint,
                    name: flow.demand_name.clone(),
                    data_set: data_set.clone(),
                }
                .into());
            }
        }

        debug!(data_set = %data_set, replaced = records.flows.len(), inserted = flows.len(), "flows replaced");
        records.flows = flows;
        Ok(())
    }
}
