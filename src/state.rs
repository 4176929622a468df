use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::email::{LettreMailer, Mailer};
use crate::payments::{create_processor, PaymentProcessor};
use crate::storage::{Storage, StorageClient};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn StorageClient>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub mailer: Arc<dyn Mailer>,
    /// Set when running against Postgres; used for migrations.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, db): (Arc<dyn Store>, Option<PgPool>) = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                (Arc::new(PgStore::new(db.clone())), Some(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                (Arc::new(MemoryStore::new()), None)
            }
        };

        let storage = Arc::new(Storage::new(&config.s3).await?) as Arc<dyn StorageClient>;
        let payments: Arc<dyn PaymentProcessor> =
            Arc::from(create_processor(&config.payment));
        let mailer = Arc::new(LettreMailer::new(&config.email)?) as Arc<dyn Mailer>;

        Ok(Self {
            config,
            store,
            storage,
            payments,
            mailer,
            db,
        })
    }
}
