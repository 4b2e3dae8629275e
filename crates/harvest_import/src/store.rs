//! Durable storage for import operations

use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tempfile::NamedTempFile;
use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::operation::{ImporterOperation, OperationId, OperationStatus};

/// Persists operation state.
///
/// `save` must be durable once it returns: recovery after a restart relies
/// on the last saved status and cursor.
#[async_trait::async_trait]
pub trait OperationStore: Send + Sync {
    async fn save(&self, operation: &ImporterOperation) -> StoreResult<()>;

    async fn load(&self, id: OperationId) -> StoreResult<Option<ImporterOperation>>;

    /// All operations, oldest first
    async fn list(&self) -> StoreResult<Vec<ImporterOperation>>;

    async fn find_by_status(&self, status: OperationStatus) -> StoreResult<Vec<ImporterOperation>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|operation| operation.status == status)
            .collect())
    }
}

fn sort_oldest_first(operations: &mut [ImporterOperation]) {
    operations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Keeps operations in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct InMemoryOperationStore {
    operations: DashMap<OperationId, ImporterOperation>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn save(&self, operation: &ImporterOperation) -> StoreResult<()> {
        self.operations.insert(operation.id, operation.clone());
        Ok(())
    }

    async fn load(&self, id: OperationId) -> StoreResult<Option<ImporterOperation>> {
        Ok(self.operations.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> StoreResult<Vec<ImporterOperation>> {
        let mut operations: Vec<_> = self
            .operations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sort_oldest_first(&mut operations);
        Ok(operations)
    }
}

/// Stores every operation as `<root>/<id>.json`.
///
/// Records are written to a temporary file in the same directory and then
/// renamed over the old record, so a crash never leaves a torn file behind.
#[derive(Debug, Clone)]
pub struct JsonFileOperationStore {
    root: PathBuf,
}

impl JsonFileOperationStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: OperationId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn blocking<T, F>(f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(StoreError::backend)?
    }
}

fn write_atomically(root: &Path, target: &Path, contents: &[u8]) -> StoreResult<()> {
    let mut file = NamedTempFile::new_in(root)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

fn read_record(path: &Path) -> StoreResult<Option<ImporterOperation>> {
    match fs_err::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[async_trait::async_trait]
impl OperationStore for JsonFileOperationStore {
    async fn save(&self, operation: &ImporterOperation) -> StoreResult<()> {
        let contents = serde_json::to_vec_pretty(operation)?;
        let root = self.root.clone();
        let target = self.record_path(operation.id);
        trace!(path = %target.display(), "saving operation");
        Self::blocking(move || write_atomically(&root, &target, &contents)).await
    }

    async fn load(&self, id: OperationId) -> StoreResult<Option<ImporterOperation>> {
        let path = self.record_path(id);
        Self::blocking(move || read_record(&path)).await
    }

    async fn list(&self) -> StoreResult<Vec<ImporterOperation>> {
        let root = self.root.clone();
        Self::blocking(move || {
            let mut operations = Vec::new();
            for entry in fs_err::read_dir(&root)? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match read_record(&path) {
                    Ok(Some(operation)) => operations.push(operation),
                    Ok(None) => {}
                    Err(StoreError::Serialization(err)) => {
                        warn!(path = %path.display(), "skipping unreadable operation record: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }
            sort_oldest_first(&mut operations);
            Ok(operations)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::NewOperation;

    fn operation(importer: &str) -> ImporterOperation {
        ImporterOperation::new(NewOperation::new(importer))
    }

    async fn exercise(store: &dyn OperationStore) {
        let mut first = operation("a");
        let mut second = operation("b");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        first.status = OperationStatus::Running;
        first.cursor = Some("c7".into());
        store.save(&first).await.unwrap();

        let loaded = store.load(first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);
        assert!(store.load(OperationId::new()).await.unwrap().is_none());

        let all = store.list().await.unwrap();
        assert_eq!(
            all.iter().map(|op| op.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );

        let running = store.find_by_status(OperationStatus::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].cursor.as_deref(), Some("c7"));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryOperationStore::new()).await;
    }

    #[tokio::test]
    async fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOperationStore::new(dir.path().join("operations")).unwrap();
        exercise(&store).await;

        // Only the two records remain, no temporary files
        let files = fs_err::read_dir(store.root()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let op = operation("a");
        JsonFileOperationStore::new(dir.path())
            .unwrap()
            .save(&op)
            .await
            .unwrap();

        let reopened = JsonFileOperationStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load(op.id).await.unwrap(), Some(op));
    }

    #[tokio::test]
    async fn test_json_file_store_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOperationStore::new(dir.path()).unwrap();
        fs_err::write(dir.path().join("broken.json"), b"{ not json").unwrap();
        fs_err::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        store.save(&operation("a")).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
