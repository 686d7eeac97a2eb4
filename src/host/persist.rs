use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{BridgeError, Result};

/// Stores named artifacts produced by the host (the browser download).
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `contents` under `name`; returns where it ended up.
    async fn persist(&self, name: &str, contents: &[u8]) -> Result<String>;
}

/// Writes artifacts as files into one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn persist(&self, name: &str, contents: &[u8]) -> Result<String> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(BridgeError::Persist(format!("Invalid artifact name: {:?}", name)));
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(name);
        tokio::fs::write(&path, contents).await?;
        tracing::debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(path.display().to_string())
    }
}

/// Keeps artifacts in memory, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    artifacts: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        match self.artifacts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn persist(&self, name: &str, contents: &[u8]) -> Result<String> {
        self.lock().insert(name.to_string(), contents.to_vec());
        Ok(format!("memory://{}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_sink_creates_dir_and_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("exports"));

        let location = sink.persist("out.json", b"{}").await.unwrap();
        assert!(location.ends_with("out.json"));
        let written = std::fs::read(tmp.path().join("exports").join("out.json")).unwrap();
        assert_eq!(written, b"{}");
    }

    #[tokio::test]
    async fn directory_sink_rejects_path_names() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());

        assert!(matches!(
            sink.persist("../escape.json", b"x").await,
            Err(BridgeError::Persist(_))
        ));
    }

    #[tokio::test]
    async fn memory_sink_overwrites_by_name() {
        let sink = MemorySink::new();
        sink.persist("a", b"1").await.unwrap();
        sink.persist("a", b"2").await.unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("a").unwrap(), b"2");
    }
}
