//! Recorded and uploaded media on local disk, as seen by the FREE2UP poll

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::MediaConfig;

#[derive(Debug, Clone)]
pub struct MediaInventory {
    recorded_dir: PathBuf,
    uploaded_dir: PathBuf,
    uploaded_extension: String,
}

impl MediaInventory {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            recorded_dir: config.recorded_dir.clone(),
            uploaded_dir: config.uploaded_dir.clone(),
            uploaded_extension: config.uploaded_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Recordings waiting for upload: any entry in the recorded directory
    pub async fn has_pending_recordings(&self) -> bool {
        match tokio::fs::read_dir(&self.recorded_dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(e) => {
                debug!("Recorded directory {} unavailable: {}", self.recorded_dir.display(), e);
                false
            }
        }
    }

    /// Uploaded media that still has to be broadcast, oldest name first
    pub async fn unbroadcast_uploads(&self) -> Vec<PathBuf> {
        let mut entries = match tokio::fs::read_dir(&self.uploaded_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Uploaded directory {} unavailable: {}", self.uploaded_dir.display(), e);
                return Vec::new();
            }
        };

        let mut uploads = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if self.is_uploaded_marker(&path) {
                uploads.push(path);
            }
        }
        uploads.sort();
        uploads
    }

    fn is_uploaded_marker(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.uploaded_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(root: &Path) -> MediaInventory {
        MediaInventory::new(&MediaConfig {
            recorded_dir: root.join("recorded"),
            uploaded_dir: root.join("uploaded"),
            uploaded_extension: ".uploaded".into(),
        })
    }

    #[tokio::test]
    async fn test_missing_directories_count_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let media = inventory(dir.path());
        assert!(!media.has_pending_recordings().await);
        assert!(media.unbroadcast_uploads().await.is_empty());
    }

    #[tokio::test]
    async fn test_detects_recordings_and_uploaded_markers() {
        let dir = tempfile::tempdir().unwrap();
        let media = inventory(dir.path());
        std::fs::create_dir_all(dir.path().join("recorded")).unwrap();
        std::fs::create_dir_all(dir.path().join("uploaded")).unwrap();
        assert!(!media.has_pending_recordings().await);

        std::fs::write(dir.path().join("recorded/clip.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("uploaded/b.uploaded"), b"").unwrap();
        std::fs::write(dir.path().join("uploaded/a.uploaded"), b"").unwrap();
        std::fs::write(dir.path().join("uploaded/c.broadcasted"), b"").unwrap();

        assert!(media.has_pending_recordings().await);
        let uploads = media.unbroadcast_uploads().await;
        let names: Vec<_> = uploads
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.uploaded", "b.uploaded"]);
    }
}
