use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::StoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};

const MAGIC: &[u8; 4] = b"SWKV";

fn io_err(e: std::io::Error) -> StoreError {
    StoreError::Io {
        message: e.to_string(),
    }
}

/// File-backed key-value store for nodes without RocksDB.
///
/// The whole map is rewritten on every mutation: write to `<path>.tmp`,
/// fsync, rename over `<path>`. A crash leaves either the old or the new
/// image, never a torn one.
///
/// Format: `SWKV` magic, then `[key_len:u32][key][value_len:u32][value]...`,
/// then a CRC32 of everything before it.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open the store at `path`, creating an empty one if the file does not exist.
    ///
    /// A file that fails its checksum is an error, never silently discarded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::File::open(&path) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).map_err(io_err)?;
                let data = Self::decode(&bytes)?;
                info!(
                    "[swap] 💾 Loaded {} keys from {} ({} bytes)",
                    data.len(),
                    path.display(),
                    bytes.len()
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[swap] 📁 No existing store at {}", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(io_err(e)),
        };
        Ok(Self { data, path })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(StoreError::Corrupted("missing store header".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(trailer);
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            warn!("[swap] Store checksum mismatch");
            return Err(StoreError::Corrupted("checksum mismatch".into()));
        }

        let mut data = BTreeMap::new();
        let mut cursor = MAGIC.len();
        while cursor < body.len() {
            let key = Self::read_chunk(body, &mut cursor)?;
            let value = Self::read_chunk(body, &mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn read_chunk(body: &[u8], cursor: &mut usize) -> Result<Vec<u8>, StoreError> {
        let truncated = || StoreError::Corrupted(format!("truncated record at offset {}", cursor));
        let len_end = cursor.checked_add(4).filter(|end| *end <= body.len()).ok_or_else(truncated)?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&body[*cursor..len_end]);
        let len = u32::from_le_bytes(len) as usize;
        let end = len_end.checked_add(len).filter(|end| *end <= body.len()).ok_or_else(truncated)?;
        let chunk = body[len_end..end].to_vec();
        *cursor = end;
        Ok(chunk)
    }

    fn encode(data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        for (key, value) in data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn persist(&self, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(&Self::encode(data)).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Apply `operations` to a copy, persist it, then swap it in.
    ///
    /// The in-memory map only changes once the file write succeeded.
    fn commit(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    next.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    next.remove(&key);
                }
            }
        }
        self.persist(&next)?;
        self.data = next;
        Ok(())
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.commit(vec![BatchOperation::put(key, value)])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.commit(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        self.commit(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
