use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

use crate::errors::SessionStoreError;
use crate::model::{Session, SessionFile};

/// Read the session file. Absent or unparseable files yield `None`.
pub fn load(path: &Path) -> Option<Session> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(target: "session-store", path = %path.display(), %err, "session file unreadable");
            return None;
        }
    };
    match serde_json::from_slice::<SessionFile>(&raw) {
        Ok(file) => Some(file.into()),
        Err(err) => {
            warn!(target: "session-store", path = %path.display(), %err, "session file corrupt; ignoring");
            None
        }
    }
}

/// Write-new-then-replace so a crash mid-write leaves the old file intact.
pub fn store(path: &Path, session: &Session) -> Result<(), SessionStoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| SessionStoreError::io(parent, err))?;
    }
    let data = serde_json::to_vec_pretty(&SessionFile::from(session))?;
    let temp = path.with_extension("tmp");
    let mut file = fs::File::create(&temp).map_err(|err| SessionStoreError::io(&temp, err))?;
    file.write_all(&data)
        .and_then(|_| file.sync_all())
        .map_err(|err| SessionStoreError::io(&temp, err))?;
    drop(file);
    fs::rename(&temp, path).map_err(|err| SessionStoreError::io(path, err))
}

pub fn remove(path: &Path) -> Result<bool, SessionStoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(SessionStoreError::io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashprobe_core_types::SerializedState;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn store_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let session = Session::new(SerializedState::from_cookies(vec![json!({ "name": "sid", "value": "1" })]));
        store(&path, &session).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], "1.0");
        assert!(raw["saved_at"].is_string());
        assert_eq!(raw["storage_state"]["cookies"][0]["name"], "sid");
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(load(&path).is_none());

        fs::write(&path, br#"{"storage_state": {"cookies": []}}"#).unwrap();
        assert!(load(&path).is_none(), "missing saved_at is unparseable");
    }

    #[test]
    fn remove_reports_whether_file_existed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert!(!remove(&path).unwrap());
        fs::write(&path, b"{}").unwrap();
        assert!(remove(&path).unwrap());
    }
}
