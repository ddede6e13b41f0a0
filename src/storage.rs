use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, ErrorKind};

use crate::atomic::{AtomicWrite, is_temp_name};
use crate::locking::NameLocks;

#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    stored_total: AtomicU64,
    locks: NameLocks,
}

#[derive(Debug)]
pub struct PutOutcome {
    pub size: u64,
    pub is_new: bool,
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl Storage {
    /// Creates the root directory if needed, canonicalizes it once, and
    /// seeds the stored-files counter from the files already present.
    pub async fn open(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;

        let mut seed = 0u64;
        let mut dir = fs::read_dir(&root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_file() && !is_temp_name(&name) {
                seed += 1;
            }
        }

        Ok(Self {
            root,
            stored_total: AtomicU64::new(seed),
            locks: NameLocks::new(),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Maps a client-supplied name to a location under the root, or rejects
    /// it. Names must be a single path segment: `..`, absolute prefixes and
    /// nested segments never reach the filesystem.
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.trim().is_empty() {
            return Err(StorageError::InvalidName);
        }
        let mut leaf = None;
        for component in Path::new(name).components() {
            match component {
                Component::Normal(segment) => {
                    if leaf.replace(segment).is_some() {
                        // a second segment would cross a directory boundary
                        return Err(StorageError::InvalidName);
                    }
                }
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidName);
                }
            }
        }
        match leaf {
            Some(leaf) => Ok(self.root.join(leaf)),
            None => Err(StorageError::InvalidName),
        }
    }

    /// Confirms the resolved path still lies strictly inside the canonical
    /// root once symlinks are taken into account. The gap between this check
    /// and the following filesystem call is accepted residual risk.
    async fn verify_within_root(
        &self,
        target: &Path,
        allow_missing: bool,
    ) -> Result<(), StorageError> {
        match fs::symlink_metadata(target).await {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() {
                    return Err(StorageError::InvalidName);
                }
                let canonical = fs::canonicalize(target).await?;
                if canonical == self.root || !canonical.starts_with(&self.root) {
                    return Err(StorageError::InvalidName);
                }
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound && allow_missing => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    pub async fn resolve_checked(
        &self,
        name: &str,
        allow_missing: bool,
    ) -> Result<PathBuf, StorageError> {
        let target = self.resolve(name)?;
        self.verify_within_root(&target, allow_missing).await?;
        Ok(target)
    }

    /// Stores `content` under `name`, replacing any previous content.
    /// Returns the byte count written and whether the name was new.
    pub async fn put(&self, name: &str, content: &[u8]) -> Result<PutOutcome, StorageError> {
        // serializes the exists-check and counter update for one name;
        // writes to different names do not contend
        let _guard = self.locks.acquire(name).await;

        let target = self.resolve_checked(name, true).await?;
        let existed = match fs::symlink_metadata(&target).await {
            Ok(metadata) => {
                if metadata.is_dir() {
                    return Err(StorageError::InvalidName);
                }
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        let mut writer = AtomicWrite::begin(&target).await?;
        if let Err(err) = writer.write_all(content).await {
            writer.discard().await;
            return Err(err.into());
        }
        writer.commit().await?;

        // incremented after the rename so a crash in between undercounts
        if !existed {
            self.stored_total.fetch_add(1, Ordering::Relaxed);
        }

        Ok(PutOutcome {
            size: content.len() as u64,
            is_new: !existed,
        })
    }

    pub async fn open_reader(&self, name: &str) -> Result<(File, std::fs::Metadata), StorageError> {
        let target = self.resolve_checked(name, false).await?;
        let metadata = fs::metadata(&target).await?;
        if !metadata.is_file() {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::NotFound,
                "no file stored under this name",
            )));
        }
        let file = File::open(&target).await?;
        Ok((file, metadata))
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let (mut file, metadata) = self.open_reader(name).await?;
        let mut content = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut content).await?;
        Ok(content)
    }

    /// Names of the regular files directly under the root, sorted. Scratch
    /// files from in-flight writes are not reported.
    pub async fn list_names(&self) -> Result<Vec<String>, StorageError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_temp_name(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Live file count, recomputed from the directory on every call.
    pub async fn current_count(&self) -> Result<u64, StorageError> {
        Ok(self.list_names().await?.len() as u64)
    }

    /// Distinct names stored since startup; overwrites are not counted.
    pub fn stored_total(&self) -> u64 {
        self.stored_total.load(Ordering::Relaxed)
    }

    /// Removes scratch files older than `ttl` left behind by interrupted
    /// writes. Returns how many were removed.
    pub async fn sweep_stale_temp(&self, ttl: Duration) -> Result<u64, StorageError> {
        let now = SystemTime::now();
        let mut dir = fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_temp_name(&name) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let expired = now
                .duration_since(modified)
                .map(|age| age >= ttl)
                .unwrap_or(false);
            if expired && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    async fn open_storage() -> (TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path().join("storage"))
            .await
            .expect("open storage");
        (temp, storage)
    }

    fn is_not_found(err: &StorageError) -> bool {
        matches!(err, StorageError::Io(io) if io.kind() == ErrorKind::NotFound)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_temp, storage) = open_storage().await;
        let outcome = storage.put("hello.txt", b"hello world").await.expect("put");
        assert_eq!(outcome.size, 11);
        assert!(outcome.is_new);
        assert_eq!(storage.get("hello.txt").await.expect("get"), b"hello world");
    }

    #[tokio::test]
    async fn overwrite_replaces_content_without_counting_again() {
        let (_temp, storage) = open_storage().await;
        let first = storage.put("dup.txt", b"first").await.expect("first put");
        assert!(first.is_new);
        let second = storage.put("dup.txt", b"second").await.expect("second put");
        assert!(!second.is_new);
        assert_eq!(second.size, 6);
        assert_eq!(storage.get("dup.txt").await.expect("get"), b"second");
        assert_eq!(storage.stored_total(), 1);
        assert_eq!(storage.current_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn counts_each_distinct_name_once() {
        let (_temp, storage) = open_storage().await;
        storage.put("a.txt", b"a").await.expect("put a");
        storage.put("b.txt", b"b").await.expect("put b");
        storage.put("a.txt", b"aa").await.expect("overwrite a");
        assert_eq!(storage.stored_total(), 2);
        assert_eq!(storage.current_count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn rejects_names_that_escape_the_root() {
        let (temp, storage) = open_storage().await;
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"outside").expect("write outside file");

        for name in ["../outside.txt", "..", "/etc/passwd", "", "   ", ".", "./"] {
            assert!(
                matches!(storage.get(name).await, Err(StorageError::InvalidName)),
                "get accepted {name:?}"
            );
            assert!(
                matches!(storage.put(name, b"x").await, Err(StorageError::InvalidName)),
                "put accepted {name:?}"
            );
        }
        assert_eq!(std::fs::read(&outside).expect("outside intact"), b"outside");
    }

    #[tokio::test]
    async fn rejects_nested_names() {
        let (_temp, storage) = open_storage().await;
        let result = storage.put("sub/ok.txt", b"nested").await;
        assert!(matches!(result, Err(StorageError::InvalidName)));
        assert!(!storage.root_path().join("sub").exists());
    }

    #[tokio::test]
    async fn missing_file_is_not_found_not_invalid() {
        let (_temp, storage) = open_storage().await;
        let err = storage.get("absent.txt").await.expect_err("absent name");
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn directory_entry_reads_as_not_found() {
        let (_temp, storage) = open_storage().await;
        std::fs::create_dir(storage.root_path().join("nested")).expect("mkdir");
        let err = storage.get("nested").await.expect_err("directory name");
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn list_reports_stored_names_and_hides_scratch_files() {
        let (_temp, storage) = open_storage().await;
        storage.put("b.txt", b"b").await.expect("put b");
        storage.put("a.txt", b"a").await.expect("put a");
        std::fs::create_dir(storage.root_path().join("nested")).expect("mkdir");
        std::fs::write(storage.root_path().join(".c.txt.tmp.123"), b"partial")
            .expect("write scratch");

        assert_eq!(storage.list_names().await.expect("list"), ["a.txt", "b.txt"]);
        assert_eq!(storage.current_count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn open_seeds_counter_from_existing_files() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create root");
        std::fs::write(root.join("one.txt"), b"1").expect("write one");
        std::fs::write(root.join("two.txt"), b"2").expect("write two");

        let storage = Storage::open(root).await.expect("open storage");
        assert_eq!(storage.stored_total(), 2);
        storage.put("three.txt", b"3").await.expect("put three");
        assert_eq!(storage.stored_total(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rejects_symlink_inside_root() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = open_storage().await;
        let outside = temp.path().join("secret.txt");
        std::fs::write(&outside, b"secret").expect("write secret");
        symlink(&outside, storage.root_path().join("link")).expect("symlink");

        let err = storage.get("link").await.expect_err("symlink accepted");
        assert!(matches!(err, StorageError::InvalidName));
    }

    #[tokio::test]
    async fn concurrent_puts_of_one_new_name_count_once() {
        let (_temp, storage) = open_storage().await;
        let storage = Arc::new(storage);

        let mut tasks = Vec::new();
        for i in 0..8u32 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                storage
                    .put("racy.txt", format!("writer {i}").as_bytes())
                    .await
            }));
        }

        let mut created = 0;
        for task in tasks {
            let outcome = task.await.expect("join").expect("put");
            if outcome.is_new {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(storage.stored_total(), 1);
        assert_eq!(storage.current_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_scratch_files() {
        let (_temp, storage) = open_storage().await;
        storage.put("keep.txt", b"keep").await.expect("put");
        std::fs::write(storage.root_path().join(".keep.txt.tmp.dead"), b"partial")
            .expect("write scratch");

        let removed = storage
            .sweep_stale_temp(Duration::ZERO)
            .await
            .expect("sweep");
        assert_eq!(removed, 1);
        assert_eq!(storage.list_names().await.expect("list"), ["keep.txt"]);
        assert_eq!(storage.get("keep.txt").await.expect("get"), b"keep");
    }
}
