//! Metadata store using RocksDB
//!
//! Stores:
//! - Peer records (peer id → addresses, member id, state)
//! - Volume records (volume name → status, bricks)

use crate::common::{Error, Result};
use crate::store::{Peer, PeerDirectory, Volume, VolumeRepository};
use rocksdb::{ColumnFamily, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

const CF_PEERS: &str = "peers";
const CF_VOLUMES: &str = "volumes";

/// Metadata store
pub struct MetadataStore {
    db: DB,
}

impl MetadataStore {
    /// Open or create metadata store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_PEERS, CF_VOLUMES])?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Internal(format!("missing column family {}", name)))
    }

    fn put_record<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let value = bincode::serialize(value)
            .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
        self.db.put_cf(self.cf(cf)?, key, value)?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| Error::MetadataCorrupted(e.to_string())),
            None => Ok(None),
        }
    }

    fn scan_records<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, rocksdb::IteratorMode::Start);

        let mut out = Vec::new();
        for item in iter {
            let (_, value_bytes) = item?;
            out.push(
                bincode::deserialize(&value_bytes)
                    .map_err(|e| Error::MetadataCorrupted(e.to_string()))?,
            );
        }
        Ok(out)
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl PeerDirectory for MetadataStore {
    fn lookup(&self, id: Uuid) -> Result<Option<Peer>> {
        self.get_record(CF_PEERS, id.as_bytes())
    }

    fn save(&self, peer: &Peer) -> Result<()> {
        self.put_record(CF_PEERS, peer.id.as_bytes(), peer)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.db.delete_cf(self.cf(CF_PEERS)?, id.as_bytes())?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Peer>> {
        self.scan_records(CF_PEERS)
    }
}

impl VolumeRepository for MetadataStore {
    fn get(&self, name: &str) -> Result<Option<Volume>> {
        self.get_record(CF_VOLUMES, name.as_bytes())
    }

    fn save(&self, volume: &Volume) -> Result<()> {
        self.put_record(CF_VOLUMES, volume.name.as_bytes(), volume)
    }

    fn list(&self) -> Result<Vec<Volume>> {
        self.scan_records(CF_VOLUMES)
    }
}
