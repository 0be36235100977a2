use bootstage::prelude::*;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory stand-in for a connection pool
#[derive(Default)]
pub struct Database {
    // Key: format!("{}:{}", table, id)
    storage: RwLock<HashMap<String, String>>,
    connections: RwLock<Option<usize>>,
}

impl Database {
    pub async fn insert(&self, table: &str, id: &str, data: String) {
        self.storage
            .write()
            .await
            .insert(format!("{}:{}", table, id), data);
    }

    pub async fn count(&self) -> usize {
        self.storage.read().await.len()
    }
}

#[async_trait]
impl Component<Application> for Database {
    async fn setup(&self, app: Application) -> anyhow::Result<()> {
        let url = app
            .config()
            .get_str("database.url")
            .ok_or_else(|| anyhow::anyhow!("database.url is not set"))?;
        let pool_size = app.config().get_as::<usize>("database.poolSize")?.unwrap_or(1);

        tracing::info!(%url, pool_size, "📦 Database: opening connection pool");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        *self.connections.write().await = Some(pool_size);
        tracing::info!("✅ Database: connection pool ready");
        Ok(())
    }

    async fn teardown(&self, _app: Application) -> anyhow::Result<()> {
        if let Some(pool_size) = self.connections.write().await.take() {
            tracing::info!(pool_size, "📦 Database: closing connection pool");
        }
        Ok(())
    }
}

pub struct DatabaseModule;

impl Module for DatabaseModule {
    fn register(&self, stages: &StageRegistry<Application>) -> Result<(), LifecycleError> {
        let database = Arc::new(Database::default());

        stages.component("connections", "database", Arc::clone(&database))?;

        stages.up("starting")?.initializer(
            "database.seed",
            InitializerOptions::new().before("http.bind"),
            move |_app: Application| {
                let database = Arc::clone(&database);
                async move {
                    database.insert("greetings", "1", "hello".to_string()).await;
                    let rows = database.count().await;
                    tracing::info!(rows, "Database seeded");
                    Ok(())
                }
            },
        );

        Ok(())
    }
}
