//! Durable document store on RocksDB
//!
//! # Column Families
//!
//! - `users` - Account documents (key: account id)
//! - `deposits` - Deposit documents (key: `userId:depositId`)
//! - `transactions` - Transaction documents (key: `userId:transactionId`)
//!
//! Values are JSON documents. RocksDB calls block, so every gateway call runs
//! on the blocking thread pool.

use crate::{
    config::Config,
    error::{Error, Result},
    gateway::{merge_fields, Collection, PersistenceGateway},
};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde_json::{Map, Value};
use std::sync::Arc;

/// RocksDB-backed [`PersistenceGateway`]
#[derive(Clone)]
pub struct RocksGateway {
    db: Arc<DB>,
}

impl RocksGateway {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = Collection::ALL
            .iter()
            .map(|collection| ColumnFamilyDescriptor::new(collection.name(), Self::cf_options()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            Collection::ALL.len()
        );

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// Read a document (blocking)
    pub fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        read_document(&self.db, collection, key)
    }

    fn insert_blocking(db: &DB, collection: Collection, key: &str, record: &Value) -> Result<()> {
        let cf = cf_handle(db, collection)?;
        db.put_cf(cf, key.as_bytes(), serde_json::to_vec(record)?)?;

        tracing::debug!(collection = %collection, key, "Document written");
        Ok(())
    }

    fn update_blocking(
        db: &DB,
        collection: Collection,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        let mut document = read_document(db, collection, key)?
            .ok_or_else(|| Error::Storage(format!("no document {} in {}", key, collection)))?;
        merge_fields(&mut document, fields)?;

        let cf = cf_handle(db, collection)?;
        db.put_cf(cf, key.as_bytes(), serde_json::to_vec(&document)?)?;

        tracing::debug!(collection = %collection, key, "Document updated");
        Ok(())
    }
}

fn cf_handle(db: &DB, collection: Collection) -> Result<&rocksdb::ColumnFamily> {
    db.cf_handle(collection.name())
        .ok_or_else(|| Error::Storage(format!("Column family {} not found", collection)))
}

fn read_document(db: &DB, collection: Collection, key: &str) -> Result<Option<Value>> {
    let cf = cf_handle(db, collection)?;
    match db.get_pinned_cf(cf, key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl PersistenceGateway for RocksGateway {
    async fn insert(&self, collection: Collection, key: &str, record: Value) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::insert_blocking(&db, collection, &key, &record))
            .await
            .map_err(|e| Error::Concurrency(format!("Storage task failed: {}", e)))?
    }

    async fn update_fields(
        &self,
        collection: Collection,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::update_blocking(&db, collection, &key, fields))
            .await
            .map_err(|e| Error::Concurrency(format!("Storage task failed: {}", e)))?
    }
}
