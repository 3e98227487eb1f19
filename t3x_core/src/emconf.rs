//! Version lookup in an installed extension's `ext_emconf.php`.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Metadata file every installed extension carries.
pub const EMCONF_FILE: &str = "ext_emconf.php";

/// `'version' => '1.2.3'` with either quote style.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]version['"]\s*=>\s*['"]([^'"]+)['"]"#).expect("valid version regex")
});

/// Extract the declared version from `ext_emconf.php` source.
pub fn parse_version(source: &str) -> Option<&str> {
    VERSION_RE
        .captures(source)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().trim())
        .filter(|version| !version.is_empty())
}

/// Read the version of the extension installed in `ext_dir`.
pub fn read_version(ext_dir: &Path) -> Result<String> {
    let path = ext_dir.join(EMCONF_FILE);
    let source = std::fs::read_to_string(&path)
        .map_err(|e| Error::fetch(path.display().to_string(), e.to_string()))?;
    parse_version(&source)
        .map(str::to_string)
        .ok_or_else(|| Error::fetch(path.display().to_string(), "no version declared"))
}
