//! Update checking and self-update.
//!
//! The update server publishes a `versions` file with one line per script,
//! `<script> <md5 of the current release>`, next to the releases themselves.

use crate::container::checksum;
use crate::error::{Error, Result};
use crate::fetch;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Default location of published releases.
pub const DEFAULT_UPDATE_BASE: &str = "https://raw.github.com/oliversalzburg/typo3scripts/master";

/// Outcome of comparing the running executable against the published list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The running executable matches the published release.
    Current,
    /// A different release is published.
    Available,
    /// The script is not listed at all.
    Unlisted,
}

impl UpdateStatus {
    /// Process exit code reported by `--update-check`.
    pub fn exit_code(self) -> u8 {
        match self {
            UpdateStatus::Current => 0,
            UpdateStatus::Unlisted => 2,
            UpdateStatus::Available => 3,
        }
    }
}

/// Find the published checksum of `script` in a `versions` listing.
pub fn listed_checksum<'a>(versions: &'a str, script: &str) -> Option<&'a str> {
    versions.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(name), Some(sum))
                if name == script
                    && sum.len() == 32
                    && sum.bytes().all(|b| b.is_ascii_alphanumeric()) =>
            {
                Some(sum)
            }
            _ => None,
        }
    })
}

/// Compare the running executable's bytes against a `versions` listing.
pub fn status(versions: &str, script: &str, own: &[u8]) -> UpdateStatus {
    match listed_checksum(versions, script) {
        None => UpdateStatus::Unlisted,
        Some(sum) if sum.eq_ignore_ascii_case(&checksum(own)) => UpdateStatus::Current,
        Some(_) => UpdateStatus::Available,
    }
}

/// Talks to the update server on behalf of one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updater {
    base_url: String,
    script: String,
}

impl Updater {
    pub fn new(base_url: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            script: script.into(),
        }
    }

    pub fn versions_url(&self) -> String {
        format!("{}/versions", self.base_url.trim_end_matches('/'))
    }

    pub fn release_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.script)
    }

    /// Check whether the executable at `exe` is the published release.
    pub fn check(&self, exe: &Path) -> Result<UpdateStatus> {
        let url = self.versions_url();
        log::debug!("Remote hash source: '{}'", url);
        let listing = fetch::download(&url)?;
        let own = fs::read(exe)?;

        let listing = String::from_utf8_lossy(&listing);
        let status = status(&listing, &self.script, &own);
        log::debug!(
            "Own hash: '{}' Remote hash: '{}'",
            checksum(&own),
            listed_checksum(&listing, &self.script).unwrap_or("")
        );
        match status {
            UpdateStatus::Unlisted => log::warn!(
                "No update information is available for '{}'",
                self.script
            ),
            UpdateStatus::Available => log::warn!("NOTE: New version available!"),
            UpdateStatus::Current => log::info!("'{}' is up to date", self.script),
        }
        Ok(status)
    }

    /// Download the published release and put it in place of `exe`.
    pub fn update(&self, exe: &Path) -> Result<()> {
        let url = self.release_url();
        log::info!("Downloading latest version from {}", url);
        let release = fetch::download(&url)?;
        if release.is_empty() {
            return Err(Error::fetch(url, "empty download"));
        }
        replace_executable(exe, &release)?;
        log::info!("Update complete");
        Ok(())
    }
}

/// Atomically replace `exe` with `contents`, keeping its permission bits.
pub fn replace_executable(exe: &Path, contents: &[u8]) -> Result<()> {
    let permissions = fs::metadata(exe)?.permissions();
    let dir = match exe.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    fs::set_permissions(temp_file.path(), permissions)?;

    temp_file.persist(exe)?;
    Ok(())
}
