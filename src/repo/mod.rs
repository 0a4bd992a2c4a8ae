//! Data-set persistence.
//!
//! Every operation is scoped to one [`DataSetId`]. Flows reference facilities and
//! demand points by name; deleting either cascades to the flows that use it.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use strum::Display;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::domain::{CandidateFacility, DataSetId, DemandPoint, Flow};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RecordKind {
    #[strum(to_string = "facility")]
    Facility,
    #[strum(to_string = "demand point")]
    DemandPoint,
}

/// Integrity violations reported by stores, carried inside `anyhow::Error`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{name}' already exists in data set '{data_set}'")]
    DuplicateName {
        kind: RecordKind,
        name: String,
        data_set: DataSetId,
    },

    #[error("flow references unknown {kind} '{name}' in data set '{data_set}'")]
    UnknownReference {
        kind: RecordKind,
        name: String,
        data_set: DataSetId,
    },

    #[error("{kind} '{name}' not found in data set '{data_set}'")]
    NotFound {
        kind: RecordKind,
        name: String,
        data_set: DataSetId,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSetStore: Send + Sync {
    /// Facilities in insertion order.
    async fn list_facilities(&self, data_set: &DataSetId) -> Result<Vec<CandidateFacility>>;

    /// Demand points in insertion order.
    async fn list_demand_points(&self, data_set: &DataSetId) -> Result<Vec<DemandPoint>>;

    async fn list_flows(&self, data_set: &DataSetId) -> Result<Vec<Flow>>;

    async fn add_facility(&self, data_set: &DataSetId, facility: CandidateFacility) -> Result<()>;

    async fn add_demand_point(&self, data_set: &DataSetId, demand_point: DemandPoint) -> Result<()>;

    /// Removes the facility and every flow out of it.
    async fn delete_facility(&self, data_set: &DataSetId, name: &str) -> Result<()>;

    /// Removes the demand point and every flow into it.
    async fn delete_demand_point(&self, data_set: &DataSetId, name: &str) -> Result<()>;

    /// Atomically swaps the data set's flows for `flows`.
    ///
    /// Readers see either the old set or the new one. If any flow references a
    /// missing facility or demand point nothing is changed.
    async fn replace_flows(&self, data_set: &DataSetId, flows: Vec<Flow>) -> Result<()>;
}

/// Opens the store selected at build time: PostgreSQL with `db`, memory otherwise.
pub async fn connect(cfg: &Config) -> Result<Arc<dyn DataSetStore>> {
    #[cfg(feature = "db")]
    {
        let store = pg::PgStore::connect(&cfg.db.url).await?;
        store.migrate().await?;
        info!("using PostgreSQL data-set store");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "db"))]
    {
        let _ = cfg;
        info!("using in-memory data-set store");
        Ok(Arc::new(MemoryStore::new()))
    }
}
