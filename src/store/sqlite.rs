// SQLite record store. One table for all tiers, keyed by (tier, timestamp).
// Timestamps are stored as text in the boundary format so range predicates compare
// lexicographically.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::instrument;

use super::{
    Page, PageRequest, PointPatch, PointStore, RangeFilter, SortOrder, StoreError, StoreResult,
    blob, clamp_bound, format_timestamp, parse_timestamp,
};
use crate::models::{Aggregation, PointMetadata, RecordId, StoredPoint, TimeSeriesPoint};

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, resolution, aggregation_type, sample_count, entity_data FROM tier_points";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size.max(1))
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tier_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tier TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                resolution TEXT NOT NULL,
                aggregation_type TEXT NOT NULL,
                sample_count INTEGER,
                entity_data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tier_points_tier_timestamp ON tier_points(tier, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends `AND timestamp >= .. AND timestamp < ..` for the bounds that are set.
    fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, filter: RangeFilter) -> StoreResult<()> {
        if let Some(from) = filter.from {
            qb.push(" AND timestamp >= ")
                .push_bind(format_timestamp(clamp_bound(from))?);
        }
        if let Some(to) = filter.to {
            qb.push(" AND timestamp < ")
                .push_bind(format_timestamp(clamp_bound(to))?);
        }
        Ok(())
    }

    fn parse_row(row: &SqliteRow) -> StoreResult<StoredPoint> {
        let id: i64 = row.try_get("id")?;
        let timestamp: String = row.try_get("timestamp")?;
        let resolution: String = row.try_get("resolution")?;
        let aggregation_type: String = row.try_get("aggregation_type")?;
        let sample_count: Option<i64> = row.try_get("sample_count")?;
        let entity_data: Vec<u8> = row.try_get("entity_data")?;

        let aggregation =
            Aggregation::from_parts(&aggregation_type, sample_count).ok_or_else(|| {
                StoreError::Encoding(format!("unknown aggregation type {aggregation_type:?}"))
            })?;
        // An unreadable blob fails the read; it never decodes as an empty map.
        let entities = blob::decode_entities(&entity_data)?;

        Ok(StoredPoint {
            id,
            point: TimeSeriesPoint {
                timestamp: parse_timestamp(&timestamp)?,
                entities,
                metadata: PointMetadata {
                    resolution,
                    aggregation,
                },
            },
        })
    }
}

impl PointStore for SqliteStore {
    #[instrument(skip(self, point), fields(repo = "tier_points", operation = "create", timestamp = point.timestamp))]
    async fn create(&self, tier: &str, point: &TimeSeriesPoint) -> StoreResult<RecordId> {
        if tier.is_empty() {
            return Err(StoreError::Validation("tier must be non-empty".into()));
        }
        if point.metadata.resolution.is_empty() {
            return Err(StoreError::Validation("resolution must be non-empty".into()));
        }
        let timestamp = format_timestamp(point.timestamp)?;
        let entity_data = blob::encode_entities(&point.entities)?;

        let r = sqlx::query(
            "INSERT INTO tier_points (tier, timestamp, resolution, aggregation_type, sample_count, entity_data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(tier)
        .bind(&timestamp)
        .bind(&point.metadata.resolution)
        .bind(point.metadata.aggregation.as_str())
        .bind(point.metadata.aggregation.count().map(i64::from))
        .bind(&entity_data)
        .execute(&self.pool)
        .await?;
        Ok(r.last_insert_rowid())
    }

    #[instrument(skip(self), fields(repo = "tier_points", operation = "query"))]
    async fn query(
        &self,
        tier: &str,
        filter: RangeFilter,
        order: SortOrder,
        page: PageRequest,
    ) -> StoreResult<Page> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE tier = ").push_bind(tier.to_string());
        Self::push_range(&mut qb, filter)?;
        qb.push(" ORDER BY timestamp ")
            .push(order.sql())
            .push(", id ")
            .push(order.sql());
        // One extra row tells us whether another page exists.
        qb.push(" LIMIT ")
            .push_bind(page.per_page as i64 + 1)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let has_more = rows.len() > page.per_page as usize;
        let items = rows
            .iter()
            .take(page.per_page as usize)
            .map(Self::parse_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page { items, has_more })
    }

    #[instrument(skip(self, patch), fields(repo = "tier_points", operation = "update"))]
    async fn update(&self, tier: &str, id: RecordId, patch: PointPatch) -> StoreResult<()> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tier_points SET id = id");
        if let Some(entities) = &patch.entities {
            qb.push(", entity_data = ")
                .push_bind(blob::encode_entities(entities)?);
        }
        if let Some(metadata) = &patch.metadata {
            qb.push(", resolution = ")
                .push_bind(metadata.resolution.clone())
                .push(", aggregation_type = ")
                .push_bind(metadata.aggregation.as_str())
                .push(", sample_count = ")
                .push_bind(metadata.aggregation.count().map(i64::from));
        }
        qb.push(" WHERE tier = ")
            .push_bind(tier.to_string())
            .push(" AND id = ")
            .push_bind(id);

        let r = qb.build().execute(&self.pool).await?;
        if r.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                tier: tier.to_string(),
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "tier_points", operation = "delete"))]
    async fn delete(&self, tier: &str, id: RecordId) -> StoreResult<()> {
        let r = sqlx::query("DELETE FROM tier_points WHERE tier = $1 AND id = $2")
            .bind(tier)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if r.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                tier: tier.to_string(),
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "tier_points", operation = "delete_where"))]
    async fn delete_where(&self, tier: &str, filter: RangeFilter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM tier_points WHERE tier = ");
        qb.push_bind(tier.to_string());
        Self::push_range(&mut qb, filter)?;
        let r = qb.build().execute(&self.pool).await?;
        Ok(r.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "tier_points", operation = "vacuum"))]
    async fn vacuum(&self) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
