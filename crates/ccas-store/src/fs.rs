use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use ccas_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

/// Directory-backed storage: one file per object.
///
/// Layout: `<root>/<first two content hex chars>/<object id>`. Objects are
/// streamed into a temporary file in the shard directory and renamed into
/// place, so a crashed or failed write never leaves a partial object under
/// its ID.
#[derive(Clone, Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, id: &ObjectId) -> PathBuf {
        self.root.join(&id.content_hex()[..2])
    }

    fn path_for(&self, id: &ObjectId) -> StoreResult<PathBuf> {
        let name = id.as_str();
        if name.contains(|c: char| c == '/' || c == '\\') || name.starts_with('.') {
            return Err(StoreError::InvalidId(name.to_string()));
        }
        Ok(self.shard_dir(id).join(name))
    }
}

impl StorageBackend for FsStorage {
    fn write_stream(&self, id: &ObjectId, data: &mut dyn Read) -> StoreResult<u64> {
        let path = self.path_for(id)?;
        if path.is_file() {
            return Ok(0);
        }
        let shard = self.shard_dir(id);
        fs::create_dir_all(&shard)?;

        let mut tmp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(&shard)?;
        let written = io::copy(data, tmp.as_file_mut()).map_err(StoreError::from_stream)?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        // A concurrent writer may have committed the same ID; keep its file.
        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(id = %id, "object file committed concurrently, keeping existing");
                return Ok(0);
            }
            Err(e) => return Err(StoreError::Io(e.error)),
        }

        debug!(id = %id, bytes = written, "object file written");
        Ok(written)
    }

    fn open(&self, id: &ObjectId) -> StoreResult<Option<Box<dyn Read + Send>>> {
        let path = self.path_for(id)?;
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.path_for(id)?.is_file())
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let name = entry?.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                match ObjectId::parse(name) {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!(file = name, error = %e, "skipping unrecognized file in store"),
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
