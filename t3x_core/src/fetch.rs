//! Locating and retrieving extension archives.
//!
//! An extension is given either as a path to a `.t3x` file or as the key of
//! an extension installed below `<base>/typo3conf/ext/`. Installed
//! extensions are re-downloaded from the extension repository (TER), which
//! serves archives at `<base url>/<k>/<e>/<key>_<version>.t3x`.

use crate::emconf;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Default base URL of the extension repository.
pub const DEFAULT_REPOSITORY: &str = "https://typo3.org/fileadmin/ter";

/// Network timeout for every download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest response body accepted.
const MAX_DOWNLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Retrieves archives by extension key and version.
pub trait ArchiveFetcher {
    /// Download the archive of `key` at `version`.
    fn fetch(&self, key: &str, version: &str) -> Result<Vec<u8>>;
}

/// Fetches archives over HTTP from a TER mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerFetcher {
    base_url: String,
}

impl TerFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// URL of an archive in the repository.
    pub fn archive_url(&self, key: &str, version: &str) -> Result<String> {
        let mut chars = key.chars();
        let (Some(first), Some(second)) = (chars.next(), chars.next()) else {
            return Err(Error::usage(format!(
                "extension key '{}' is too short to look up",
                key
            )));
        };
        Ok(format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            first,
            second,
            archive_file_name(key, version)
        ))
    }
}

impl Default for TerFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY)
    }
}

impl ArchiveFetcher for TerFetcher {
    fn fetch(&self, key: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.archive_url(key, version)?;
        log::info!("Retrieving {}", url);
        download(&url)
    }
}

/// Repository file name of an archive.
pub fn archive_file_name(key: &str, version: &str) -> String {
    format!("{}_{}.t3x", key, version)
}

/// Where an archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A container file on disk.
    File(PathBuf),
    /// An archive to download from the repository.
    Repository { key: String, version: String },
}

impl Source {
    /// Decide where the archive for `extension` comes from.
    ///
    /// An existing file wins. Otherwise `extension` must be installed below
    /// `<base>/typo3conf/ext/`; its version is `forced_version` if given,
    /// else the one declared in its `ext_emconf.php`.
    pub fn locate(extension: &str, base: &Path, forced_version: Option<&str>) -> Result<Self> {
        if extension.is_empty() {
            return Err(Error::usage("No extension given"));
        }
        if extension.starts_with("--") {
            return Err(Error::usage(format!(
                "The given extension key '{}' looks like a command line parameter. \
                 Please use --extension= when giving multiple arguments.",
                extension
            )));
        }

        let path = Path::new(extension);
        if path.is_file() {
            return Ok(Source::File(path.to_path_buf()));
        }

        let ext_dir = base.join("typo3conf").join("ext").join(extension);
        if !ext_dir.is_dir() {
            return Err(Error::fetch(
                extension,
                format!(
                    "unable to find extension (directory requested: '{}')",
                    ext_dir.display()
                ),
            ));
        }

        let version = match forced_version {
            Some(version) => version.to_string(),
            None => emconf::read_version(&ext_dir)?,
        };
        log::debug!("Using version {} of {}", version, extension);
        Ok(Source::Repository {
            key: extension.to_string(),
            version,
        })
    }

    /// Name the archive is known by, used to derive output names.
    pub fn archive_name(&self) -> String {
        match self {
            Source::File(path) => path.display().to_string(),
            Source::Repository { key, version } => archive_file_name(key, version),
        }
    }

    /// Extraction directory used when none is configured.
    pub fn default_output_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}-extracted", self.archive_name()))
    }

    /// Read or download the archive bytes.
    pub fn load(&self, fetcher: &dyn ArchiveFetcher) -> Result<Vec<u8>> {
        match self {
            Source::File(path) => {
                log::info!("Reading {}", path.display());
                std::fs::read(path)
                    .map_err(|e| Error::fetch(path.display().to_string(), e.to_string()))
            }
            Source::Repository { key, version } => fetcher.fetch(key, version),
        }
    }
}

/// Download a URL into memory.
pub(crate) fn download(url: &str) -> Result<Vec<u8>> {
    let response = http_agent()
        .get(url)
        .call()
        .map_err(|e| map_ureq_error(url, &e))?;
    response
        .into_body()
        .with_config()
        .limit(MAX_DOWNLOAD_SIZE)
        .read_to_vec()
        .map_err(|e| Error::fetch(url, e.to_string()))
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DOWNLOAD_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

fn map_ureq_error(url: &str, err: &ureq::Error) -> Error {
    match err {
        ureq::Error::StatusCode(404) => Error::fetch(url, "not found"),
        other => Error::fetch(url, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct RecordingFetcher {
        requests: RefCell<Vec<(String, String)>>,
    }

    impl ArchiveFetcher for RecordingFetcher {
        fn fetch(&self, key: &str, version: &str) -> Result<Vec<u8>> {
            self.requests
                .borrow_mut()
                .push((key.to_string(), version.to_string()));
            Ok(b"archive".to_vec())
        }
    }

    fn install(base: &Path, key: &str, version: &str) {
        let dir = base.join("typo3conf/ext").join(key);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("ext_emconf.php"),
            format!("<?php\n$EM_CONF[$_EXTKEY] = array(\n  'version' => '{}',\n);\n", version),
        )
        .unwrap();
    }

    #[test]
    fn test_archive_url() {
        let fetcher = TerFetcher::new("https://mirror.example/ter/");
        assert_eq!(
            fetcher.archive_url("news", "1.2.3").unwrap(),
            "https://mirror.example/ter/n/e/news_1.2.3.t3x"
        );
        assert!(matches!(
            fetcher.archive_url("x", "1.0.0"),
            Err(Error::Usage { .. })
        ));
    }

    #[test]
    fn test_locate_prefers_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("news_1.0.0.t3x");
        fs::write(&file, b"data").unwrap();

        let source = Source::locate(file.to_str().unwrap(), temp_dir.path(), None).unwrap();
        assert_eq!(source, Source::File(file.clone()));
        assert_eq!(
            source.default_output_dir(),
            PathBuf::from(format!("{}-extracted", file.display()))
        );
    }

    #[test]
    fn test_locate_installed_extension() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "news", "2.3.4");

        let source = Source::locate("news", temp_dir.path(), None).unwrap();
        assert_eq!(
            source,
            Source::Repository {
                key: "news".to_string(),
                version: "2.3.4".to_string()
            }
        );
        assert_eq!(
            source.default_output_dir(),
            PathBuf::from("news_2.3.4.t3x-extracted")
        );

        let forced = Source::locate("news", temp_dir.path(), Some("1.0.0")).unwrap();
        assert_eq!(forced.archive_name(), "news_1.0.0.t3x");
    }

    #[test]
    fn test_locate_rejects_option_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let result = Source::locate("--dumb", temp_dir.path(), None);
        assert!(matches!(result, Err(Error::Usage { .. })));
        assert!(matches!(
            Source::locate("", temp_dir.path(), None),
            Err(Error::Usage { .. })
        ));
    }

    #[test]
    fn test_locate_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let err = Source::locate("missing", temp_dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("typo3conf"));
    }

    #[test]
    fn test_load_dispatches_on_source() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("local.t3x");
        fs::write(&file, b"local bytes").unwrap();
        let fetcher = RecordingFetcher {
            requests: RefCell::new(Vec::new()),
        };

        assert_eq!(Source::File(file).load(&fetcher).unwrap(), b"local bytes");
        assert!(fetcher.requests.borrow().is_empty());

        let remote = Source::Repository {
            key: "news".to_string(),
            version: "1.0.0".to_string(),
        };
        assert_eq!(remote.load(&fetcher).unwrap(), b"archive");
        assert_eq!(
            fetcher.requests.borrow().as_slice(),
            &[("news".to_string(), "1.0.0".to_string())]
        );
    }

    #[test]
    fn test_map_ureq_error() {
        let not_found = map_ureq_error("https://example.test/a.t3x", &ureq::Error::StatusCode(404));
        assert!(not_found.to_string().contains("not found"));
        let other = map_ureq_error("https://example.test/a.t3x", &ureq::Error::StatusCode(500));
        assert!(matches!(other, Error::Fetch { .. }));
    }
}
