#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use super::{DataSetStore, RecordKind, StoreError};
use crate::domain::{CandidateFacility, DataSetId, DemandPoint, Flow};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS facilities (
        seq BIGSERIAL,
        data_set TEXT NOT NULL,
        name TEXT NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        capacity BIGINT NOT NULL CHECK (capacity >= 0),
        fixed_cost DOUBLE PRECISION NOT NULL CHECK (fixed_cost >= 0),
        PRIMARY KEY (data_set, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS demand_points (
        seq BIGSERIAL,
        data_set TEXT NOT NULL,
        name TEXT NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        demand BIGINT NOT NULL CHECK (demand >= 0),
        PRIMARY KEY (data_set, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS flows (
        seq BIGSERIAL PRIMARY KEY,
        data_set TEXT NOT NULL,
        facility_name TEXT NOT NULL,
        demand_name TEXT NOT NULL,
        volume DOUBLE PRECISION NOT NULL CHECK (volume >= 0),
        FOREIGN KEY (data_set, facility_name) REFERENCES facilities (data_set, name)
            ON DELETE CASCADE ON UPDATE CASCADE,
        FOREIGN KEY (data_set, demand_name) REFERENCES demand_points (data_set, name)
            ON DELETE CASCADE ON UPDATE CASCADE
    )
    "#,
];

#[derive(Debug, sqlx::FromRow)]
struct FacilityRow {
    name: String,
    latitude: f64,
    longitude: f64,
    capacity: i64,
    fixed_cost: f64,
}

impl TryFrom<FacilityRow> for CandidateFacility {
    type Error = anyhow::Error;

    fn try_from(row: FacilityRow) -> Result<Self> {
        Ok(CandidateFacility {
            capacity: u32::try_from(row.capacity)
                .with_context(|| format!("capacity of facility '{}' out of range", row.name))?,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            fixed_cost: row.fixed_cost,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DemandPointRow {
    name: String,
    latitude: f64,
    longitude: f64,
    demand: i64,
}

impl TryFrom<DemandPointRow> for DemandPoint {
    type Error = anyhow::Error;

    fn try_from(row: DemandPointRow) -> Result<Self> {
        Ok(DemandPoint {
            demand: u32::try_from(row.demand)
                .with_context(|| format!("demand of '{}' out of range", row.name))?,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FlowRow {
    facility_name: String,
    demand_name: String,
    volume: f64,
}

impl From<FlowRow> for Flow {
    fn from(row: FlowRow) -> Self {
        Flow::new(row.facility_name, row.demand_name, row.volume)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("Failed to create database pool")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        info!("data-set schema ready");
        Ok(())
    }

    async fn delete_record(&self, table: &str, kind: RecordKind, data_set: &DataSetId, name: &str) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE data_set = $1 AND name = $2");
        let result = sqlx::query(&sql)
            .bind(data_set.as_str())
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete {kind} '{name}'"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
                data_set: data_set.clone(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl DataSetStore for PgStore {
    async fn list_facilities(&self, data_set: &DataSetId) -> Result<Vec<CandidateFacility>> {
        let rows: Vec<FacilityRow> = sqlx::query_as(
            r#"
            SELECT name, latitude, longitude, capacity, fixed_cost
            FROM facilities
            WHERE data_set = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(data_set.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch facilities")?;

        rows.into_iter().map(CandidateFacility::try_from).collect()
    }

    async fn list_demand_points(&self, data_set: &DataSetId) -> Result<Vec<DemandPoint>> {
        let rows: Vec<DemandPointRow> = sqlx::query_as(
            r#"
            SELECT name, latitude, longitude, demand
            FROM demand_points
            WHERE data_set = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(data_set.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch demand points")?;

        rows.into_iter().map(DemandPoint::try_from).collect()
    }

    async fn list_flows(&self, data_set: &DataSetId) -> Result<Vec<Flow>> {
        let rows: Vec<FlowRow> = sqlx::query_as(
            r#"
            SELECT facility_name, demand_name, volume
            FROM flows
            WHERE data_set = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(data_set.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch flows")?;

        Ok(rows.into_iter().map(Flow::from).collect())
    }

    async fn add_facility(&self, data_set: &DataSetId, facility: CandidateFacility) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO facilities (data_set, name, latitude, longitude, capacity, fixed_cost)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(data_set.as_str())
        .bind(&facility.name)
        .bind(facility.latitude)
        .bind(facility.longitude)
        .bind(i64::from(facility.capacity))
        .bind(facility.fixed_cost)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateName {
                kind: RecordKind::Facility,
                name: facility.name,
                data_set: data_set.clone(),
            }
            .into()),
            Err(e) => Err(e).context("Failed to insert facility"),
        }
    }

    async fn add_demand_point(&self, data_set: &DataSetId, demand_point: DemandPoint) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO demand_points (data_set, name, latitude, longitude, demand)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(data_set.as_str())
        .bind(&demand_point.name)
        .bind(demand_point.latitude)
        .bind(demand_point.longitude)
        .bind(i64::from(demand_point.demand))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateName {
                kind: RecordKind::DemandPoint,
                name: demand_point.name,
                data_set: data_set.clone(),
            }
            .into()),
            Err(e) => Err(e).context("Failed to insert demand point"),
        }
    }

    async fn delete_facility(&self, data_set: &DataSetId, name: &str) -> Result<()> {
        self.delete_record("facilities", RecordKind::Facility, data_set, name).await
    }

    async fn delete_demand_point(&self, data_set: &DataSetId, name: &str) -> Result<()> {
        self.delete_record("demand_points", RecordKind::DemandPoint, data_set, name).await
    }

    async fn replace_flows(&self, data_set: &DataSetId, flows: Vec<Flow>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        let deleted = sqlx::query("DELETE FROM flows WHERE data_set = $1")
            .bind(data_set.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to delete previous flows")?;

        for flow in &flows {
            let inserted = sqlx::query(
                r#"
                INSERT INTO flows (data_set, facility_name, demand_name, volume)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(data_set.as_str())
            .bind(&flow.facility_name)
            .bind(&flow.demand_name)
            .bind(flow.volume)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    // Dropping `tx` rolls back the delete.
                    let kind = if db.constraint().is_some_and(|c| c.contains("demand")) {
                        RecordKind::DemandPoint
                    } else {
                        RecordKind::Facility
                    };
                    let name = match kind {
                        RecordKind::DemandPoint => flow.demand_name.clone(),
                        RecordKind::Facility => flow.facility_name.clone(),
                    };
                    return Err(StoreError::UnknownReference {
                        kind,
                        name,
                        data_set: data_set.clone(),
                    }
                    .into());
                }
                Err(e) => return Err(e).context("Failed to insert flow"),
            }
        }

        tx.commit().await.context("Failed to commit flow replacement")?;

        debug!(
            data_set = %data_set,
            replaced = deleted.rows_affected(),
            inserted = flows.len(),
            "flows replaced"
        );
        Ok(())
    }
}
