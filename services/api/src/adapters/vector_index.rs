//! services/api/src/adapters/vector_index.rs
//!
//! SQLite-backed implementation of the `VectorIndex` port.
//!
//! Documents and their embeddings live in a separate database file per model
//! backend. Search is a brute-force cosine scan, which is plenty for the
//! volume of flights a single upload workflow produces.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flight_assistant_core::domain::{
    DocumentMetadata, IndexedDocument, MetadataFilter, ScoredDocument,
};
use flight_assistant_core::ports::{PortError, PortResult, VectorIndex};
use flight_assistant_core::retrieval::cosine_similarity;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::info;

const BUILT_AT_KEY: &str = "built_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteVectorIndex {
    /// Opens (or creates) the index stored at `path`.
    pub async fn load(path: &Path) -> PortResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let index = Self {
            pool,
            path: path.to_path_buf(),
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> PortResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS flight_documents (
                flight_id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                departure_port TEXT,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_flight_documents_departure
             ON flight_documents(departure_port)",
        )
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> IndexedDocument {
        IndexedDocument {
            content: row.get("content"),
            metadata: DocumentMetadata {
                flight_id: row.get("flight_id"),
                departure_port: row.get("departure_port"),
            },
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `VectorIndex` Trait Implementation
//=========================================================================================

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    /// Replaces the whole index in one transaction.
    async fn build(&self, entries: Vec<(IndexedDocument, Vec<f32>)>) -> PortResult<usize> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM flight_documents")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        for (document, embedding) in &entries {
            sqlx::query(
                "INSERT OR REPLACE INTO flight_documents (flight_id, content, departure_port, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(document.metadata.flight_id)
            .bind(&document.content)
            .bind(&document.metadata.departure_port)
            .bind(Self::serialize_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)")
            .bind(BUILT_AT_KEY)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        info!(entries = entries.len(), path = %self.path.display(), "Vector index written");
        Ok(entries.len())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> PortResult<Vec<ScoredDocument>> {
        let rows = match filter {
            Some(MetadataFilter::DeparturePort(code)) => sqlx::query(
                "SELECT flight_id, content, departure_port, embedding
                 FROM flight_documents WHERE departure_port = ?1",
            )
            .bind(code)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT flight_id, content, departure_port, embedding FROM flight_documents",
            )
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(unexpected)?;

        let mut scored: Vec<ScoredDocument> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredDocument {
                    document: Self::row_to_document(row),
                    score: cosine_similarity(vector, &Self::deserialize_embedding(&blob)),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn built_at(&self) -> PortResult<Option<DateTime<Utc>>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(BUILT_AT_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;

        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    async fn len(&self) -> PortResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flight_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count as usize)
    }

    async fn clear(&self) -> PortResult<()> {
        sqlx::query("DELETE FROM flight_documents")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_survive_blob_encoding() {
        let embedding = vec![0.25_f32, -1.5, 3.0e-7];
        let blob = SqliteVectorIndex::serialize_embedding(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(SqliteVectorIndex::deserialize_embedding(&blob), embedding);
    }
}
