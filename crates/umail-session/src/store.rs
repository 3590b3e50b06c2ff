use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use umail_core::types::validate_name;
use umail_core::{UmailError, UmailResult};

use crate::session::Session;

/// Directory of session records, one file per session name.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the session `name`. Fails on names that could escape
    /// the store directory.
    pub fn path_for(&self, name: &str) -> UmailResult<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    pub fn exists(&self, name: &str) -> UmailResult<bool> {
        Ok(self.path_for(name)?.exists())
    }

    /// Write a new session. Never replaces an existing record.
    pub fn create(&self, session: &Session) -> UmailResult<()> {
        if self.exists(session.name())? {
            return Err(UmailError::SessionExists {
                name: session.name().to_string(),
            });
        }
        self.persist(session)?;
        info!(
            session = %session.name(),
            pool = %session.pool_name(),
            pool_position = session.pool_position(),
            boundaries = session.total(),
            "created session"
        );
        Ok(())
    }

    /// Write the session record atomically (temp file, then rename).
    pub fn persist(&self, session: &Session) -> UmailResult<()> {
        let path = self.path_for(session.name())?;
        let json = session.to_json()?;

        std::fs::create_dir_all(&self.dir)?;
        // Names never start with '.', so the temp file cannot clash with a session
        let tmp_path = self.dir.join(format!(".{}.tmp", session.name()));
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &path)?;

        debug!(session = %session.name(), path = %path.display(), "persisted session");
        Ok(())
    }

    pub fn load(&self, name: &str) -> UmailResult<Session> {
        let path = self.path_for(name)?;
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UmailError::SessionNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Session::from_json(name, &bytes)
    }

    /// Names of all stored sessions, sorted.
    pub fn list(&self) -> UmailResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
