// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of sidecar plugins reachable over local Unix sockets

use crate::error::{OperatorError, Result};
use std::collections::BTreeMap;
use std::fs::FileType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct PluginRepository {
    plugins: BTreeMap<String, PathBuf>,
}

#[cfg(unix)]
fn is_socket(file_type: &FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_socket()
}

#[cfg(not(unix))]
fn is_socket(_file_type: &FileType) -> bool {
    false
}

impl PluginRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one plugin per Unix socket in `dir`, named after the socket file.
    /// Returns the names registered by this call.
    pub async fn register_unix_socket_plugins_in_path(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| OperatorError::PluginError(format!("cannot read {}: {}", dir.display(), e)))?;

        let mut registered = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !is_socket(&file_type) {
                debug!("Skipping {}, not a socket", entry.path().display());
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            info!("Registered plugin {} at {}", name, entry.path().display());
            self.plugins.insert(name.clone(), entry.path());
            registered.push(name);
        }

        Ok(registered)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn socket_path(&self, name: &str) -> Option<&Path> {
        self.plugins.get(name).map(PathBuf::as_path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}
