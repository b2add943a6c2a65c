//! RocksDB-backed proof storage.
//!
//! All operations are synchronous blocking I/O. Proof writes go through a
//! synced write batch so the proof, the finalized pair and both indexes land
//! atomically and durably.

use crate::{proof_point, ProofStorage, StorageError};
use keystone_chain::FinalizationProof;
use keystone_types::{FinalizationMessage, FinalizationPoint, Height, HeightHashPair};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;
use tracing::debug;

const PROOFS_CF: &str = "proofs";
const PAIRS_CF: &str = "pairs";

const FINALIZATION_POINT_KEY: &[u8] = b"finalization_point";
const FINALIZED_HEIGHT_KEY: &[u8] = b"finalized_height";

/// RocksDB-based proof storage for production use.
pub struct RocksProofStorage {
    db: DB,
}

impl RocksProofStorage {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(PROOFS_CF, Options::default()),
            ColumnFamilyDescriptor::new(PAIRS_CF, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&options, path, column_families)
            .map_err(|error| StorageError::Database(error.to_string()))?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Database(format!("missing column family {}", name)))
    }

    fn read_index(&self, key: &[u8]) -> Result<Option<u64>, StorageError> {
        let Some(bytes) = self
            .db
            .get(key)
            .map_err(|error| StorageError::Database(error.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Codec("index record has wrong size".into()))?;
        Ok(Some(u64::from_le_bytes(bytes)))
    }
}

impl ProofStorage for RocksProofStorage {
    fn finalization_point(&self) -> Result<FinalizationPoint, StorageError> {
        // nemesis is implicitly finalized
        Ok(FinalizationPoint(self.read_index(FINALIZATION_POINT_KEY)?.unwrap_or(1)))
    }

    fn finalized_height(&self) -> Result<Height, StorageError> {
        Ok(Height(self.read_index(FINALIZED_HEIGHT_KEY)?.unwrap_or(1)))
    }

    fn save_proof(
        &self,
        height_hash_pair: &HeightHashPair,
        proof: &FinalizationProof,
    ) -> Result<(), StorageError> {
        let point = proof_point(proof)?;

        let messages: Vec<&FinalizationMessage> =
            proof.iter().map(|message| message.as_ref()).collect();
        let proof_bytes =
            bincode::serialize(&messages).map_err(|error| StorageError::Codec(error.to_string()))?;
        let pair_bytes = bincode::serialize(height_hash_pair)
            .map_err(|error| StorageError::Codec(error.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(PROOFS_CF)?, point.0.to_be_bytes(), proof_bytes);
        batch.put_cf(self.cf(PAIRS_CF)?, point.0.to_be_bytes(), pair_bytes);
        batch.put(FINALIZATION_POINT_KEY, point.0.to_le_bytes());
        batch.put(FINALIZED_HEIGHT_KEY, height_hash_pair.height.0.to_le_bytes());

        let mut write_options = WriteOptions::default();
        write_options.set_sync(true);
        self.db
            .write_opt(batch, &write_options)
            .map_err(|error| StorageError::Database(error.to_string()))?;

        debug!(point = %point, height = %height_hash_pair.height, "proof persisted");
        Ok(())
    }

    fn load_proof(
        &self,
        point: FinalizationPoint,
    ) -> Result<Vec<FinalizationMessage>, StorageError> {
        let bytes = self
            .db
            .get_cf(self.cf(PROOFS_CF)?, point.0.to_be_bytes())
            .map_err(|error| StorageError::Database(error.to_string()))?
            .ok_or(StorageError::ProofNotFound(point))?;

        bincode::deserialize(&bytes).map_err(|error| StorageError::Codec(error.to_string()))
    }

    fn load_finalized_hashes_from(
        &self,
        point: FinalizationPoint,
        max_hashes: usize,
    ) -> Result<Vec<HeightHashPair>, StorageError> {
        let mut pairs = Vec::new();
        let iterator = self.db.iterator_cf(
            self.cf(PAIRS_CF)?,
            rocksdb::IteratorMode::From(&point.0.to_be_bytes(), rocksdb::Direction::Forward),
        );

        for entry in iterator.take(max_hashes) {
            let (_, value) = entry.map_err(|error| StorageError::Database(error.to_string()))?;
            let pair = bincode::deserialize(&value)
                .map_err(|error| StorageError::Codec(error.to_string()))?;
            pairs.push(pair);
        }
        Ok(pairs)
    }
}
