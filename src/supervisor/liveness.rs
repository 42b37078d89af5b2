//! Role to process records that survive a scheduler restart
//!
//! A record is only a claim. Callers check it against the process table with
//! [`ProcessIdentity::is_current`] before trusting or signalling it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use super::process_control::ProcessIdentity;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::models::Role;

#[async_trait]
pub trait LivenessStore: Send + Sync {
    /// Recorded process for the role, if any
    async fn read(&self, role: Role) -> SupervisorResult<Option<ProcessIdentity>>;

    async fn write(&self, role: Role, holder: ProcessIdentity) -> SupervisorResult<()>;

    /// Remove the record; absent records are fine
    async fn clear(&self, role: Role) -> SupervisorResult<()>;
}

/// One `<dir>/<role>.pid` file per role holding the JSON identity
pub struct FileLivenessStore {
    dir: PathBuf,
}

impl FileLivenessStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, role: Role) -> PathBuf {
        self.dir.join(format!("{}.pid", role.as_str()))
    }
}

#[async_trait]
impl LivenessStore for FileLivenessStore {
    async fn read(&self, role: Role) -> SupervisorResult<Option<ProcessIdentity>> {
        let path = self.record_path(role);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SupervisorError::liveness(
                    role,
                    format!("{}: {e}", path.display()),
                ))
            }
        };
        ProcessIdentity::parse(&contents).map(Some).ok_or_else(|| {
            SupervisorError::liveness(
                role,
                format!("{} holds no PID: '{}'", path.display(), contents.trim()),
            )
        })
    }

    async fn write(&self, role: Role, holder: ProcessIdentity) -> SupervisorResult<()> {
        let path = self.record_path(role);
        let contents = serde_json::to_string(&holder)
            .map_err(|e| SupervisorError::liveness(role, e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SupervisorError::liveness(role, format!("{}: {e}", self.dir.display())))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SupervisorError::liveness(role, format!("{}: {e}", path.display())))
    }

    async fn clear(&self, role: Role) -> SupervisorResult<()> {
        let path = self.record_path(role);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SupervisorError::liveness(
                role,
                format!("{}: {e}", path.display()),
            )),
        }
    }
}

/// In-process records, for tests and single-run tools
#[derive(Default)]
pub struct MemoryLivenessStore {
    records: Mutex<HashMap<Role, ProcessIdentity>>,
}

impl MemoryLivenessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LivenessStore for MemoryLivenessStore {
    async fn read(&self, role: Role) -> SupervisorResult<Option<ProcessIdentity>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&role).copied())
    }

    async fn write(&self, role: Role, holder: ProcessIdentity) -> SupervisorResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(role, holder);
        Ok(())
    }

    async fn clear(&self, role: Role) -> SupervisorResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(&role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(pid: u32) -> ProcessIdentity {
        ProcessIdentity {
            pid,
            start_time: Some(1_700_000_000),
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLivenessStore::new(dir.path().join("run"));

        assert_eq!(store.read(Role::Upload).await.unwrap(), None);
        store.write(Role::Upload, holder(4242)).await.unwrap();
        assert!(dir.path().join("run/upload.pid").exists());
        assert_eq!(store.read(Role::Upload).await.unwrap(), Some(holder(4242)));
        assert_eq!(store.read(Role::Broadcast).await.unwrap(), None);

        store.clear(Role::Upload).await.unwrap();
        store.clear(Role::Upload).await.unwrap();
        assert_eq!(store.read(Role::Upload).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_reads_bare_pid_without_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("upload.pid"), "4242\n").unwrap();
        let store = FileLivenessStore::new(dir.path());
        assert_eq!(
            store.read(Role::Upload).await.unwrap(),
            Some(ProcessIdentity {
                pid: 4242,
                start_time: None
            })
        );
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("record.pid"), "not-a-pid\n").unwrap();
        let store = FileLivenessStore::new(dir.path());
        assert!(matches!(
            store.read(Role::Record).await,
            Err(SupervisorError::Liveness { role: Role::Record, .. })
        ));
    }
}
