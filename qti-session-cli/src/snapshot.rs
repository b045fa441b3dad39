// qti-session-cli/src/snapshot.rs
// ============================================================================
// Module: File Session Stream
// Description: File-backed SessionStream, storing one snapshot per session
//              ID as a single file under a validated root directory.
// Purpose: Let `qti-session run` persist and resume sessions across
//          process invocations.
// Dependencies: qti-session-core
// ============================================================================

//! ## Overview
//! Session IDs are untrusted file name components and are validated before
//! being joined to the root, mirroring the path-escape checks the teacher
//! applies to runpack artifact paths.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use qti_session_core::interfaces::SessionStream;

/// Snapshot file extension, appended to a session ID to form a file name.
const SNAPSHOT_EXTENSION: &str = "qtisession";

/// An error constructing or addressing a [`FileSessionStream`].
#[derive(Debug, thiserror::Error)]
pub enum SnapshotStoreError {
    /// The root directory could not be created.
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateRoot {
        /// Directory that failed to create.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A session ID is unsuitable as a file name component.
    #[error("session id {session_id:?} is not a valid snapshot file name")]
    InvalidSessionId {
        /// The offending session ID.
        session_id: String,
    },
}

/// A [`SessionStream`] that persists each session's snapshot bytes as a
/// single file under `root`, named after the session ID.
///
/// `SessionStream`'s methods are infallible by design (the driver has no
/// notion of storage failure); I/O errors are instead recorded and made
/// available via [`FileSessionStream::take_last_error`] for the CLI to
/// surface after the call returns.
#[derive(Debug)]
pub struct FileSessionStream {
    /// Root directory under which snapshot files are stored.
    root: PathBuf,
    /// The most recent I/O error, if any call has failed since it was last taken.
    last_error: RefCell<Option<String>>,
}

impl FileSessionStream {
    /// Creates a file-backed session stream rooted at `root`, creating the
    /// directory if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotStoreError::CreateRoot`] if `root` cannot be created.
    pub fn new(root: PathBuf) -> Result<Self, SnapshotStoreError> {
        fs::create_dir_all(&root).map_err(|source| SnapshotStoreError::CreateRoot {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            last_error: RefCell::new(None),
        })
    }

    /// Takes and clears the most recently recorded I/O error, if any.
    pub fn take_last_error(&self) -> Option<String> {
        self.last_error.borrow_mut().take()
    }

    /// Resolves `session_id` to a snapshot file path under `root`, rejecting
    /// IDs that are not a single plain path component.
    fn path_for(&self, session_id: &str) -> Result<PathBuf, SnapshotStoreError> {
        let candidate = Path::new(session_id);
        if session_id.is_empty() || candidate.components().count() != 1 || candidate.file_name().is_none() {
            return Err(SnapshotStoreError::InvalidSessionId {
                session_id: session_id.to_string(),
            });
        }
        Ok(self.root.join(format!("{session_id}.{SNAPSHOT_EXTENSION}")))
    }

    /// Records `message` as the most recent error, overwriting any prior one.
    fn record_error(&self, message: String) {
        *self.last_error.borrow_mut() = Some(message);
    }
}

impl SessionStream for FileSessionStream {
    fn get_retrieval_stream(&self, session_id: &str) -> Option<Vec<u8>> {
        let path = match self.path_for(session_id) {
            Ok(path) => path,
            Err(error) => {
                self.record_error(error.to_string());
                return None;
            }
        };
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => {
                self.record_error(format!("failed to read snapshot {}: {error}", path.display()));
                None
            }
        }
    }

    fn persist_stream(&mut self, session_id: &str, bytes: Vec<u8>) {
        let path = match self.path_for(session_id) {
            Ok(path) => path,
            Err(error) => {
                self.record_error(error.to_string());
                return;
            }
        };
        if let Err(error) = fs::write(&path, &bytes) {
            self.record_error(format!("failed to write snapshot {}: {error}", path.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("qti-session-cli-snapshot-test-{name}"))
    }

    #[test]
    fn round_trips_bytes_through_a_file() {
        let root = temp_root("round-trip");
        let _ = fs::remove_dir_all(&root);
        let mut stream = FileSessionStream::new(root.clone()).expect("create stream");
        assert!(stream.get_retrieval_stream("s1").is_none());
        stream.persist_stream("s1", vec![1, 2, 3]);
        assert_eq!(stream.get_retrieval_stream("s1"), Some(vec![1, 2, 3]));
        assert!(stream.take_last_error().is_none());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn rejects_session_ids_that_escape_the_root() {
        let root = temp_root("escape");
        let _ = fs::remove_dir_all(&root);
        let mut stream = FileSessionStream::new(root.clone()).expect("create stream");
        stream.persist_stream("../evil", vec![9]);
        assert!(stream.take_last_error().is_some());
        assert!(stream.get_retrieval_stream("../evil").is_none());
        assert!(stream.take_last_error().is_some());
        let _ = fs::remove_dir_all(&root);
    }
}
