use std::path::{Path, PathBuf};

use dashprobe_session_store::SessionStore;

use crate::config::Config;

pub struct CliContext {
    config: Config,
    config_path: PathBuf,
    /// Whether `config_path` existed when loading.
    from_file: bool,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf, from_file: bool) -> Self {
        Self {
            config,
            config_path,
            from_file,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn from_file(&self) -> bool {
        self.from_file
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.config.session.path()).with_ttl(self.config.session.ttl())
    }
}
