//! SQLite sink for the merged table.

use crate::{data::JobRecord, error::HarvestError, utils};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::path::Path;
use tracing::debug;

#[async_trait::async_trait]
pub trait Table {
    type Record: Send + Sync;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;
    async fn insert(&self, record: &Self::Record) -> Result<(), sqlx::Error>;

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}

pub(crate) async fn is_table_exists(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub struct JobTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for JobTable {
    type Record = JobRecord;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                    CREATE TABLE {} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        created_at DATETIME,
                        search_query TEXT NOT NULL,
                        title TEXT NOT NULL,
                        company TEXT NOT NULL,
                        location TEXT NOT NULL,
                        url TEXT NOT NULL,
                        experience TEXT NOT NULL,
                        description TEXT NOT NULL,
                        platform TEXT NOT NULL
                    )
                "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
            debug!("Created table {}", self.name);
        } else {
            debug!("Use table {}", self.name);
        }
        Ok(())
    }

    async fn insert(&self, record: &JobRecord) -> Result<(), sqlx::Error> {
        let mut tx = self.get_pool().begin().await?;
        let query = format!(
            r#"INSERT INTO {} (
                search_query,
                title,
                company,
                location,
                url,
                experience,
                description,
                platform,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        sqlx::query(&query)
            .bind(&record.source_query)
            .bind(&record.title)
            .bind(&record.company)
            .bind(&record.location)
            .bind(&record.url)
            .bind(&record.experience)
            .bind(&record.description)
            .bind(&record.platform)
            .bind(utils::get_now())
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// The `{name}_jobs` table of one database. Holds final records only.
pub struct JobStore {
    pub name: String,
    jobs: JobTable,
}

impl JobStore {
    pub async fn open<P: AsRef<Path>>(path: P, name: &str) -> Result<JobStore, HarvestError> {
        let opt = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        JobStore::with_pool(pool, name).await
    }

    pub async fn with_pool(pool: SqlitePool, name: &str) -> Result<JobStore, HarvestError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(HarvestError::Config(format!("invalid table prefix {:?}", name)));
        }
        let store = JobStore {
            name: name.to_string(),
            jobs: JobTable {
                name: format!("{}_jobs", name),
                pool,
            },
        };
        store.jobs.create().await?;
        Ok(store)
    }

    pub async fn save(&self, records: &[JobRecord]) -> Result<usize, HarvestError> {
        for record in records {
            self.jobs.insert(record).await?;
        }
        debug!("Saved {} record(s) into {}", records.len(), self.jobs.get_name());
        Ok(records.len())
    }

    pub async fn load(&self) -> Result<Vec<JobRecord>, HarvestError> {
        let query = format!(
            "SELECT search_query, title, company, location, url, experience, description, platform \
             FROM {} ORDER BY id",
            self.jobs.get_name()
        );
        let mut records = vec![];
        for row in sqlx::query(&query).fetch_all(self.jobs.get_pool()).await? {
            records.push(JobRecord {
                source_query: row.try_get("search_query")?,
                title: row.try_get("title")?,
                company: row.try_get("company")?,
                location: row.try_get("location")?,
                url: row.try_get("url")?,
                experience: row.try_get("experience")?,
                description: row.try_get("description")?,
                platform: row.try_get("platform")?,
            });
        }
        Ok(records)
    }

    pub async fn count(&self) -> Result<u32, HarvestError> {
        Ok(self.jobs.count().await?)
    }
}
