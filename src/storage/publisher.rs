// External imports
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

// Internal imports
use super::{content_type_for, object_path, ObjectStore, StorageResult};
use crate::error::StorageError;

/// A named blob to publish into a ticker's namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a local file, publishing it under its file name
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        Ok(Self::new(filename, fs::read(path)?))
    }
}

/// What happened to each artifact during a publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub uploaded: Vec<String>,
    /// Existed already and were overwritten via update
    pub updated: Vec<String>,
    /// Missing from the listing after publishing and written again
    pub repaired: Vec<String>,
}

impl PublishReport {
    pub fn published(&self) -> usize {
        self.uploaded.len() + self.updated.len()
    }
}

/// Uploads artifacts with upsert, falling back to update on conflicts
pub struct Publisher<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    verify: bool,
}

impl<'a, S: ObjectStore + ?Sized> Publisher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            verify: true,
        }
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    fn rewrite(&self, path: &str, artifact: &Artifact) -> StorageResult<()> {
        let content_type = content_type_for(&artifact.filename);
        match self.store.update(path, &artifact.bytes, content_type) {
            Err(StorageError::NotFound { .. }) => {
                self.store.upload(path, &artifact.bytes, content_type, true)
            }
            other => other,
        }
    }

    /// Publish every artifact to `{namespace}/{filename}`
    ///
    /// Any failure other than a conflict aborts the publish and is returned.
    pub fn publish(&self, namespace: &str, artifacts: &[Artifact]) -> StorageResult<PublishReport> {
        let mut report = PublishReport::default();

        for artifact in artifacts {
            let path = object_path(namespace, &artifact.filename);
            let content_type = content_type_for(&artifact.filename);
            match self.store.upload(&path, &artifact.bytes, content_type, true) {
                Ok(()) => report.uploaded.push(artifact.filename.clone()),
                Err(e) if e.is_conflict() => {
                    info!("{} exists, updating", path);
                    self.store.update(&path, &artifact.bytes, content_type)?;
                    report.updated.push(artifact.filename.clone());
                }
                Err(e) => return Err(e),
            }
        }

        if self.verify {
            let listed: HashSet<String> = self.store.list(namespace)?.into_iter().collect();
            for artifact in artifacts {
                if listed.contains(&artifact.filename) {
                    continue;
                }
                let path = object_path(namespace, &artifact.filename);
                warn!("{} missing after publish, writing again", path);
                self.rewrite(&path, artifact)?;
                report.repaired.push(artifact.filename.clone());
            }
        }

        info!(
            "{}: published {} artifacts ({} updated, {} repaired)",
            namespace,
            report.published(),
            report.updated.len(),
            report.repaired.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory store that can be told to conflict, fail, or hide objects
    #[derive(Default)]
    struct FlakyStore {
        objects: RefCell<HashMap<String, Vec<u8>>>,
        conflict_on_upload: HashSet<String>,
        fail_on_upload: HashSet<String>,
        hidden_from_list: HashSet<String>,
        calls: RefCell<Vec<String>>,
    }

    impl ObjectStore for FlakyStore {
        fn upload(&self, path: &str, bytes: &[u8], _ct: &str, _upsert: bool) -> StorageResult<()> {
            self.calls.borrow_mut().push(format!("upload {}", path));
            if self.fail_on_upload.contains(path) {
                return Err(StorageError::Status {
                    url: path.into(),
                    status: 500,
                    message: "boom".into(),
                });
            }
            if self.conflict_on_upload.contains(path) {
                return Err(StorageError::Conflict { path: path.into() });
            }
            self.objects.borrow_mut().insert(path.into(), bytes.to_vec());
            Ok(())
        }

        fn update(&self, path: &str, bytes: &[u8], _ct: &str) -> StorageResult<()> {
            self.calls.borrow_mut().push(format!("update {}", path));
            self.objects.borrow_mut().insert(path.into(), bytes.to_vec());
            Ok(())
        }

        fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
            let start = format!("{}/", prefix);
            Ok(self
                .objects
                .borrow()
                .keys()
                .filter(|k| k.starts_with(&start) && !self.hidden_from_list.contains(*k))
                .map(|k| k[start.len()..].to_string())
                .collect())
        }

        fn list_buckets(&self) -> StorageResult<Vec<String>> {
            Ok(vec!["models".into()])
        }
    }

    fn artifacts() -> Vec<Artifact> {
        vec![
            Artifact::new("model.json", b"{}".to_vec()),
            Artifact::new("group1-shard1of1.bin", vec![0, 1, 2, 3]),
        ]
    }

    #[test]
    fn test_conflict_falls_back_to_update() {
        let store = FlakyStore {
            conflict_on_upload: ["SAP.DE/model.json".to_string()].into(),
            ..Default::default()
        };
        let report = Publisher::new(&store).publish("SAP.DE", &artifacts()).unwrap();
        assert_eq!(report.uploaded, vec!["group1-shard1of1.bin".to_string()]);
        assert_eq!(report.updated, vec!["model.json".to_string()]);
        assert!(report.repaired.is_empty());
        assert_eq!(store.objects.borrow()["SAP.DE/model.json"], b"{}".to_vec());
    }

    #[test]
    fn test_non_conflict_failure_aborts() {
        let store = FlakyStore {
            fail_on_upload: ["SAP.DE/model.json".to_string()].into(),
            ..Default::default()
        };
        let err = Publisher::new(&store).publish("SAP.DE", &artifacts()).unwrap_err();
        assert!(!err.is_conflict());
        // nothing after the failing artifact was attempted
        assert_eq!(*store.calls.borrow(), vec!["upload SAP.DE/model.json".to_string()]);
    }

    #[test]
    fn test_verification_rewrites_missing_objects() {
        let store = FlakyStore {
            hidden_from_list: ["SAP.DE/group1-shard1of1.bin".to_string()].into(),
            ..Default::default()
        };
        let report = Publisher::new(&store).publish("SAP.DE", &artifacts()).unwrap();
        assert_eq!(report.repaired, vec!["group1-shard1of1.bin".to_string()]);
        assert!(store
            .calls
            .borrow()
            .contains(&"update SAP.DE/group1-shard1of1.bin".to_string()));

        let quiet = FlakyStore {
            hidden_from_list: ["SAP.DE/group1-shard1of1.bin".to_string()].into(),
            ..Default::default()
        };
        let report = Publisher::new(&quiet)
            .with_verification(false)
            .publish("SAP.DE", &artifacts())
            .unwrap();
        assert!(report.repaired.is_empty());
    }

    #[test]
    fn test_artifact_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        fs::write(&path, b"{\"a\":1}").unwrap();
        let artifact = Artifact::from_file(&path).unwrap();
        assert_eq!(artifact.filename, "scaler.json");
        assert_eq!(artifact.bytes, b"{\"a\":1}".to_vec());
    }
}
