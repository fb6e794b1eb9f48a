//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `FlightStore` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use flight_assistant_core::domain::{
    AircraftTypeCount, FlightFilter, FlightId, FlightRecord, FlightRow, StoredFlight,
};
use flight_assistant_core::ports::{FlightStore, PortError, PortResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

const RECORD_COLUMNS: &str = "id, airline, airline2, flight_number, origin_date_local, \
    origin_date_utc, domain, category, departure_port, departure_country, departure_time, \
    arrival_port, arrival_country, arrival_time, status, aircraft_registration, aircraft_type, \
    aircraft_owner_airline, capacity, raw_data, error";

const ROW_COLUMNS: &str = "id, airline, flight_number, origin_date_local, departure_port, \
    departure_time, arrival_port, arrival_time, status";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `FlightStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct FlightRecordRow {
    id: i64,
    airline: Option<String>,
    airline2: Option<String>,
    flight_number: Option<String>,
    origin_date_local: Option<String>,
    origin_date_utc: Option<String>,
    domain: Option<String>,
    category: Option<String>,
    departure_port: Option<String>,
    departure_country: Option<String>,
    departure_time: Option<String>,
    arrival_port: Option<String>,
    arrival_country: Option<String>,
    arrival_time: Option<String>,
    status: Option<String>,
    aircraft_registration: Option<String>,
    aircraft_type: Option<String>,
    aircraft_owner_airline: Option<String>,
    capacity: Option<i64>,
    raw_data: String,
    error: Option<String>,
}
impl FlightRecordRow {
    fn to_domain(self) -> StoredFlight {
        StoredFlight {
            id: self.id,
            record: FlightRecord {
                airline: self.airline,
                airline2: self.airline2,
                flight_number: self.flight_number,
                origin_date_local: self.origin_date_local,
                origin_date_utc: self.origin_date_utc,
                domain: self.domain,
                category: self.category,
                departure_port: self.departure_port,
                departure_country: self.departure_country,
                departure_time: self.departure_time,
                arrival_port: self.arrival_port,
                arrival_country: self.arrival_country,
                arrival_time: self.arrival_time,
                status: self.status,
                aircraft_registration: self.aircraft_registration,
                aircraft_type: self.aircraft_type,
                aircraft_owner_airline: self.aircraft_owner_airline,
                capacity: self.capacity,
                raw_data: self.raw_data,
                error: self.error,
            },
        }
    }
}

#[derive(FromRow)]
struct ProjectionRow {
    id: i64,
    airline: Option<String>,
    flight_number: Option<String>,
    origin_date_local: Option<String>,
    departure_port: Option<String>,
    departure_time: Option<String>,
    arrival_port: Option<String>,
    arrival_time: Option<String>,
    status: Option<String>,
}
impl ProjectionRow {
    fn to_domain(self) -> FlightRow {
        FlightRow {
            airline: self.airline,
            flight_number: self.flight_number,
            origin_date_local: self.origin_date_local,
            departure_port: self.departure_port,
            departure_time: self.departure_time,
            arrival_port: self.arrival_port,
            arrival_time: self.arrival_time,
            status: self.status,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `FlightStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlightStore for DbAdapter {
    /// Upserts on (airline, flight_number, origin_date_local, departure_port, arrival_port).
    /// SQLite treats NULLs as distinct, so records missing key fields always insert.
    async fn store(&self, record: &FlightRecord) -> PortResult<FlightId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO flights (
                airline, airline2, flight_number, origin_date_local, origin_date_utc,
                domain, category, departure_port, departure_country, departure_time,
                arrival_port, arrival_country, arrival_time, status,
                aircraft_registration, aircraft_type, aircraft_owner_airline,
                capacity, raw_data, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (airline, flight_number, origin_date_local, departure_port, arrival_port)
            DO UPDATE SET
                airline2 = excluded.airline2,
                origin_date_utc = excluded.origin_date_utc,
                domain = excluded.domain,
                category = excluded.category,
                departure_country = excluded.departure_country,
                departure_time = excluded.departure_time,
                arrival_country = excluded.arrival_country,
                arrival_time = excluded.arrival_time,
                status = excluded.status,
                aircraft_registration = excluded.aircraft_registration,
                aircraft_type = excluded.aircraft_type,
                aircraft_owner_airline = excluded.aircraft_owner_airline,
                capacity = excluded.capacity,
                raw_data = excluded.raw_data,
                error = excluded.error
            RETURNING id",
        )
        .bind(&record.airline)
        .bind(&record.airline2)
        .bind(&record.flight_number)
        .bind(&record.origin_date_local)
        .bind(&record.origin_date_utc)
        .bind(&record.domain)
        .bind(&record.category)
        .bind(&record.departure_port)
        .bind(&record.departure_country)
        .bind(&record.departure_time)
        .bind(&record.arrival_port)
        .bind(&record.arrival_country)
        .bind(&record.arrival_time)
        .bind(&record.status)
        .bind(&record.aircraft_registration)
        .bind(&record.aircraft_type)
        .bind(&record.aircraft_owner_airline)
        .bind(record.capacity)
        .bind(&record.raw_data)
        .bind(&record.error)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(id)
    }

    async fn fetch_all_raw(&self) -> PortResult<Vec<(FlightId, String)>> {
        sqlx::query_as::<_, (i64, String)>("SELECT id, raw_data FROM flights ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn fetch_all(&self) -> PortResult<Vec<StoredFlight>> {
        let records = sqlx::query_as::<_, FlightRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM flights ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn fetch_by_id(&self, id: FlightId) -> PortResult<StoredFlight> {
        let record = sqlx::query_as::<_, FlightRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM flights WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Flight {} not found", id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn fetch_projection(
        &self,
        filter: &FlightFilter,
        limit: usize,
    ) -> PortResult<Vec<FlightRow>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ROW_COLUMNS} FROM flights WHERE 1 = 1"));
        // Column names come from the filter's fixed set; values are always bound.
        for (column, value) in filter.conditions() {
            query.push(format!(" AND {column} = "));
            query.push_bind(value.to_string());
        }
        query.push(" ORDER BY id LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let records = query
            .build_query_as::<ProjectionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn fetch_rows_by_ids(&self, ids: &[FlightId]) -> PortResult<Vec<FlightRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ROW_COLUMNS} FROM flights WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let records = query
            .build_query_as::<ProjectionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        // Return rows in the caller's (ranked) order.
        let mut by_id: HashMap<i64, ProjectionRow> =
            records.into_iter().map(|r| (r.id, r)).collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(|r| r.to_domain())
            .collect())
    }

    async fn count_by_aircraft_type(&self) -> PortResult<Vec<AircraftTypeCount>> {
        let counts = sqlx::query_as::<_, (Option<String>, i64)>(
            "SELECT aircraft_type, COUNT(*) AS flights FROM flights
             GROUP BY aircraft_type
             ORDER BY flights DESC, aircraft_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(counts
            .into_iter()
            .map(|(aircraft_type, flights)| AircraftTypeCount {
                aircraft_type,
                flights: flights as usize,
            })
            .collect())
    }

    async fn count(&self) -> PortResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flights")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn delete(&self, id: FlightId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM flights WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Flight {} not found", id)));
        }
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        sqlx::query("DELETE FROM flights")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
