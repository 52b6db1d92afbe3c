use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, FromQueryResult, JsonValue, Statement};
use tracing::{info, instrument};

use crate::errors::SyncError;

/// One ERP line item, as an opaque key-value record.
pub type SourceRow = serde_json::Map<String, serde_json::Value>;

/// Executes the fixed source query and returns the rows to reconcile.
///
/// Connection management is the implementation's concern; each run
/// re-derives its full row set, so there is no checkpoint to persist.
#[async_trait]
pub trait SourceDataProvider: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<SourceRow>, SyncError>;
}

/// SQL-backed source provider running a configured raw query.
pub struct SqlSourceProvider {
    db: DatabaseConnection,
    query: String,
}

impl SqlSourceProvider {
    pub async fn connect(url: &str, query: impl Into<String>) -> Result<Self, SyncError> {
        let db = Database::connect(url).await?;
        info!("Connected to source database");
        Ok(Self {
            db,
            query: query.into(),
        })
    }

    pub fn with_connection(db: DatabaseConnection, query: impl Into<String>) -> Self {
        Self {
            db,
            query: query.into(),
        }
    }
}

#[async_trait]
impl SourceDataProvider for SqlSourceProvider {
    #[instrument(skip(self))]
    async fn fetch_rows(&self) -> Result<Vec<SourceRow>, SyncError> {
        let stmt = Statement::from_string(self.db.get_database_backend(), self.query.clone());
        let values = JsonValue::find_by_statement(stmt).all(&self.db).await?;

        let rows: Vec<SourceRow> = values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();

        info!(row_count = rows.len(), "Fetched source rows");
        Ok(rows)
    }
}
