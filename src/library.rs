//! Collection management commands: create, list, delete, and list files.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use crate::store::CollectionStore;

async fn open_store(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(config).await?))
}

pub async fn run_create(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("collection name must not be empty");
    }
    let store = open_store(config).await?;
    let collection = store
        .create_collection(name, &config.account.name)
        .await?;
    tracing::info!(collection = %collection.name, id = %collection.id, "collection ready");
    println!("collection {} ready", collection.name);
    store.pool().close().await;
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let collections = store.list_collections(&config.account.name).await?;

    if collections.is_empty() {
        println!("No collections. Create one with `lsum collection create <name>`.");
    } else {
        for c in &collections {
            println!("{}", c.name);
        }
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str) -> Result<()> {
    let store = open_store(config).await?;
    let Some(collection) = store.load_collection(name, &config.account.name).await? else {
        bail!("collection not found: {}", name);
    };
    store.delete_collection(&collection).await?;
    tracing::info!(collection = %collection.name, "collection deleted");
    println!("collection {} deleted", collection.name);
    store.pool().close().await;
    Ok(())
}

pub async fn run_files(config: &Config, name: &str) -> Result<()> {
    let store = open_store(config).await?;
    let Some(collection) = store.load_collection(name, &config.account.name).await? else {
        bail!("collection not found: {}", name);
    };
    let files = store.list_files(&collection).await?;

    if files.is_empty() {
        println!("No files in {}.", collection.name);
    } else {
        println!("{:<48} {:>8}  TYPE", "FILE", "SEGMENTS");
        for f in &files {
            println!("{:<48} {:>8}  {}", f.filename, f.segment_count, f.content_type);
        }
    }
    store.pool().close().await;
    Ok(())
}
