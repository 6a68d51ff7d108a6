use crate::types::Assignment;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS assignments (
    profile TEXT NOT NULL,
    participant TEXT NOT NULL,
    set_path TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (profile, participant)
)";

// A set goes to one participant only.
const CREATE_SET_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS assignments_set ON assignments (profile, set_path)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Existing(Assignment),
    Created(Assignment),
    Exhausted,
}

impl Allocation {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Allocation::Existing(a) | Allocation::Created(a) => Some(a),
            Allocation::Exhausted => None,
        }
    }
}

/// Which participant got which POI set.
#[derive(Clone)]
pub struct AssignmentStore {
    pool: SqlitePool,
    // Held from id and set choice through the insert.
    allocation: Arc<Mutex<()>>,
}

impl AssignmentStore {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::with_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self> {
        // One connection, otherwise every connection sees its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        create_schema(&pool).await?;
        Ok(Self { pool, allocation: Arc::new(Mutex::new(())) })
    }

    pub async fn get(&self, profile: &str, participant: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, Assignment>(
            "SELECT profile, participant, set_path, created_at FROM assignments
             WHERE profile = ? AND participant = ?",
        )
        .bind(profile)
        .bind(participant)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn save(&self, profile: &str, participant: &str, set_path: &str) -> Result<Assignment> {
        let created_at = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO assignments (profile, participant, set_path, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(profile)
        .bind(participant)
        .bind(set_path)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        debug!("assigned {} to {}/{}", set_path, profile, participant);
        Ok(Assignment {
            profile: profile.to_string(),
            participant: participant.to_string(),
            set_path: set_path.to_string(),
            created_at,
        })
    }

    pub async fn used_sets(&self, profile: &str) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT set_path FROM assignments WHERE profile = ?")
            .bind(profile)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    pub async fn used_participants(&self, profile: &str) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT participant FROM assignments WHERE profile = ?")
            .bind(profile)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Smallest positive integer not yet used as a participant id.
    pub async fn next_participant_id(&self, profile: &str) -> Result<String> {
        let used: HashSet<u64> = self
            .used_participants(profile)
            .await?
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect();
        let next = (1..).find(|n| !used.contains(n)).unwrap_or(1);
        Ok(next.to_string())
    }

    /// Resolves the participant (allocating an id when none is given) and
    /// hands out the first candidate set nobody holds yet.
    pub async fn assign(&self, profile: &str, participant: Option<&str>, candidates: &[String]) -> Result<Allocation> {
        let _guard = self.allocation.lock().await;

        let participant = match participant {
            Some(p) => p.to_string(),
            None => self.next_participant_id(profile).await?,
        };
        if let Some(existing) = self.get(profile, &participant).await? {
            return Ok(Allocation::Existing(existing));
        }

        let used = self.used_sets(profile).await?;
        let Some(set_path) = candidates.iter().find(|c| !used.contains(c.as_str())) else {
            return Ok(Allocation::Exhausted);
        };
        Ok(Allocation::Created(self.save(profile, &participant, set_path).await?))
    }

    pub async fn reset(&self) -> Result<()> {
        let _guard = self.allocation.lock().await;
        sqlx::query("DROP TABLE IF EXISTS assignments").execute(&self.pool).await?;
        create_schema(&self.pool).await?;
        info!("assignment table recreated");
        Ok(())
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_TABLE).execute(pool).await?;
    sqlx::query(CREATE_SET_INDEX).execute(pool).await?;
    Ok(())
}
