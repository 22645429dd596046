//! src/services/blob_store.rs
//!
//! BlobStore — write-once, content-addressed payload storage on local disk.
//! Blobs live at `root/sha256/{aa}/{bb}/{hex}` where `aa`/`bb` are the first
//! two digest bytes. Uploads are streamed into `root/tmp/` while hashing and
//! renamed into place only after a successful fsync, so a partially written
//! blob is never visible under its address.

use crate::{
    models::content_address::ContentAddress,
    services::error::{StorageError, StorageResult},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut, stream};
use sha2::{Digest, Sha256};
use std::{
    collections::HashSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const BLOB_DIR: &str = "sha256";
const TMP_DIR: &str = "tmp";
const TMP_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

/// Result of committing a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    pub address: ContentAddress,
    pub size_bytes: u64,
    /// True when an identical blob was already stored and nothing was written.
    pub already_existed: bool,
}

/// A fully received, fsynced upload waiting in the temp area.
///
/// Dropping it without calling [`BlobStore::commit`] deletes the temp file,
/// which covers early returns and cancelled request futures alike.
#[derive(Debug)]
pub struct StagedBlob {
    address: ContentAddress,
    size_bytes: u64,
    temp: TempFile,
}

impl StagedBlob {
    pub fn address(&self) -> &ContentAddress {
        &self.address
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

#[derive(Debug)]
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("discarded temp file {}", self.path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    "failed to discard temp file {}: {}",
                    self.path.display(),
                    err
                ),
            }
        }
    }
}

/// Counts from an orphan sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_blobs: u64,
    pub removed_bytes: u64,
    pub removed_temp_files: u64,
    pub kept_blobs: u64,
}

impl BlobStore {
    /// Open (and create if needed) a blob store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(BLOB_DIR)).await?;
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        info!("blob store ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Final on-disk location for a blob. Parent directories may not exist yet.
    fn blob_path(&self, address: &ContentAddress) -> PathBuf {
        let (shard_a, shard_b) = address.shards();
        let mut path = self.root.join(BLOB_DIR);
        path.push(shard_a);
        path.push(shard_b);
        path.push(address.as_str());
        path
    }

    /// Stream an upload into the temp area, hashing and counting as it goes.
    ///
    /// Fails with `PayloadTooLarge` as soon as more than `limit` bytes arrive,
    /// and with `UploadAborted` if the source stream yields an error.
    pub async fn stage<S>(&self, stream: S, limit: Option<u64>) -> StorageResult<StagedBlob>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let temp = TempFile::new(self.tmp_dir().join(format!("{TMP_PREFIX}{}", Uuid::new_v4())));
        let mut file = File::create(&temp.path)
            .await
            .map_err(StorageError::WriteFailure)?;

        let mut size_bytes: u64 = 0;
        let mut hasher = Sha256::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StorageError::UploadAborted)?;
            size_bytes += chunk.len() as u64;
            if let Some(limit) = limit {
                if size_bytes > limit {
                    return Err(StorageError::PayloadTooLarge { limit });
                }
            }
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(StorageError::WriteFailure)?;
        }
        file.flush().await.map_err(StorageError::WriteFailure)?;
        file.sync_all().await.map_err(StorageError::WriteFailure)?;
        drop(file);

        Ok(StagedBlob {
            address: ContentAddress::from_digest(hasher.finalize().as_slice()),
            size_bytes,
            temp,
        })
    }

    /// Move a staged upload to its content address.
    ///
    /// First writer wins: if the address is already populated the staged copy
    /// is discarded. Two racing commits of the same new content both rename
    /// identical bytes onto the same path, which the filesystem makes atomic.
    pub async fn commit(&self, mut staged: StagedBlob) -> StorageResult<PutOutcome> {
        let final_path = self.blob_path(&staged.address);
        let outcome = PutOutcome {
            address: staged.address.clone(),
            size_bytes: staged.size_bytes,
            already_existed: false,
        };

        // Refreshing the mtime keeps a reused blob out of the sweeper's grace
        // window; NotFound means it was swept meanwhile, so write it again.
        match touch(&final_path).await {
            Ok(()) => {
                debug!("blob {} already stored, skipping write", staged.address);
                return Ok(PutOutcome {
                    already_existed: true,
                    ..outcome
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::WriteFailure(err)),
        }

        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::WriteFailure(io::Error::other("blob path missing parent directory"))
        })?;
        rename_into_place(&staged.temp.path, &final_path, &parent)
            .await
            .map_err(StorageError::WriteFailure)?;
        staged.temp.disarm();

        #[cfg(unix)]
        sync_dir(&parent)
            .await
            .map_err(StorageError::WriteFailure)?;

        debug!(
            "stored blob {} ({} bytes) at {}",
            outcome.address,
            outcome.size_bytes,
            final_path.display()
        );
        Ok(outcome)
    }

    /// Store an in-memory payload.
    pub async fn put(&self, data: Bytes) -> StorageResult<PutOutcome> {
        let staged = self
            .stage(stream::once(async move { Ok::<_, io::Error>(data) }), None)
            .await?;
        self.commit(staged).await
    }

    /// Open a blob for sequential reading.
    pub async fn get(&self, address: &ContentAddress) -> StorageResult<File> {
        File::open(self.blob_path(address))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StorageError::BlobNotFound(address.clone()),
                _ => StorageError::Io(err),
            })
    }

    pub async fn exists(&self, address: &ContentAddress) -> bool {
        fs::try_exists(self.blob_path(address))
            .await
            .unwrap_or(false)
    }

    /// Size of a stored blob in bytes.
    pub async fn size(&self, address: &ContentAddress) -> StorageResult<u64> {
        match fs::metadata(self.blob_path(address)).await {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::BlobNotFound(address.clone()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Write, read back and delete a scratch file in the temp area.
    pub async fn probe(&self) -> StorageResult<()> {
        let path = self.tmp_dir().join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&path, b"readyz")
            .await
            .map_err(StorageError::WriteFailure)?;
        let read_back = fs::read(&path).await;
        let removed = fs::remove_file(&path).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::other("probe content mismatch")));
        }
        removed?;
        Ok(())
    }

    /// Remove blobs that no record references, plus abandoned temp files.
    ///
    /// Only entries whose mtime is at least `grace` old are touched, so a
    /// blob committed by an ingest whose index insert is still in flight
    /// survives.
    pub async fn sweep_orphans(
        &self,
        referenced: &HashSet<ContentAddress>,
        grace: Duration,
    ) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();
        let blob_root = self.root.join(BLOB_DIR);

        for shard_a in list_dir(&blob_root).await? {
            for shard_b in list_dir(&shard_a).await? {
                let mut removed_here = 0;
                for path in list_dir(&shard_b).await? {
                    let Some(address) = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .and_then(|name| name.parse::<ContentAddress>().ok())
                    else {
                        warn!("ignoring foreign file {} in blob area", path.display());
                        continue;
                    };
                    if referenced.contains(&address) {
                        report.kept_blobs += 1;
                        continue;
                    }
                    let meta = fs::metadata(&path).await?;
                    if !older_than(&meta, grace) {
                        report.kept_blobs += 1;
                        continue;
                    }
                    match fs::remove_file(&path).await {
                        Ok(()) => {
                            info!("reclaimed orphaned blob {} ({} bytes)", address, meta.len());
                            report.removed_blobs += 1;
                            report.removed_bytes += meta.len();
                            removed_here += 1;
                        }
                        Err(err) if err.kind() == ErrorKind::NotFound => {}
                        Err(err) => return Err(StorageError::Io(err)),
                    }
                }
                // Untouched shards may belong to a commit between mkdir and rename.
                if removed_here > 0 {
                    prune_empty_dirs(&shard_b, &blob_root).await;
                }
            }
        }

        for path in list_dir(&self.tmp_dir()).await? {
            let meta = fs::metadata(&path).await?;
            if meta.is_file() && older_than(&meta, grace) {
                match fs::remove_file(&path).await {
                    Ok(()) => report.removed_temp_files += 1,
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(StorageError::Io(err)),
                }
            }
        }

        Ok(report)
    }
}

/// Set a file's mtime to now.
async fn touch(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(SystemTime::now())
    })
    .await
    .map_err(io::Error::other)?
}

/// Create the shard directory and rename the temp file into it, retrying
/// once if a concurrent sweep pruned the directory in between.
async fn rename_into_place(temp: &Path, target: &Path, parent: &Path) -> io::Result<()> {
    fs::create_dir_all(parent).await?;
    match fs::rename(temp, target).await {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("shard {} vanished before rename, retrying", parent.display());
            fs::create_dir_all(parent).await?;
            fs::rename(temp, target).await
        }
        other => other,
    }
}

/// Persist a rename by syncing the containing directory.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir).await?.sync_all().await
}

/// Entries of a directory, or nothing if it does not exist.
async fn list_dir(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StorageError::Io(err)),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn older_than(meta: &std::fs::Metadata, grace: Duration) -> bool {
    meta.modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= grace)
}

/// Remove empty directories from `start` up to, but not including, `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}
