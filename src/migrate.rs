//! Store initialization: graph/vector/KV schema migrations plus the object store
//! root directory. Each store owns its own `migrate()`; this just sequences them the
//! way `ctx init` used to run a single flat migration, now fanned out across stores.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::graph_store::SqliteGraphStore;
use crate::kv_store::SqliteKvStore;
use crate::vector_store::SqliteVectorStore;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    SqliteGraphStore::new(pool.clone()).migrate().await?;
    SqliteVectorStore::new(pool.clone()).migrate().await?;
    SqliteKvStore::new(pool.clone()).migrate().await?;

    tokio::fs::create_dir_all(&config.stores.object_store_root).await?;

    pool.close().await;
    Ok(())
}
