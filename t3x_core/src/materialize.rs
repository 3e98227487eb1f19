//! Writing a manifest's `FILES` section to disk.

use crate::error::{Error, Result};
use crate::value::{Key, Mapping, ValueNode};
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Manifest key holding the file list.
pub const FILES_KEY: &str = "FILES";

/// One file described by the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry<'a> {
    /// Key of the entry inside `FILES`.
    pub key: &'a Key,
    /// Path relative to the destination directory.
    pub path: PathBuf,
    /// Exact file content.
    pub content: &'a [u8],
}

/// Outcome of a materialization.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    /// Number of files written completely.
    pub files_written: usize,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Files that could not be written, as [`Error::FileWrite`].
    pub failures: Vec<Error>,
}

impl MaterializeReport {
    /// Returns true if every file was written.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Project the `FILES` section into file entries, in manifest order.
///
/// Every entry is checked before anything is written: it must be a mapping
/// with a `name` and a `content` string, and the name must be a relative
/// path that stays inside the destination.
pub fn file_entries(root: &Mapping) -> Result<Vec<FileEntry<'_>>> {
    let files = match root.get(FILES_KEY) {
        Some(ValueNode::Mapping(files)) => files,
        Some(other) => {
            return Err(Error::malformed_manifest(format!(
                "{} must be a mapping, found {}",
                FILES_KEY,
                other.kind()
            )));
        }
        None => {
            return Err(Error::malformed_manifest(format!(
                "no {} section",
                FILES_KEY
            )));
        }
    };

    files
        .iter()
        .map(|(key, value)| {
            let file = value.as_mapping().ok_or_else(|| {
                Error::malformed_manifest(format!(
                    "{}[{}] must be a mapping, found {}",
                    FILES_KEY,
                    key,
                    value.kind()
                ))
            })?;
            let name = string_field(file, key, "name")?;
            let content = string_field(file, key, "content")?;
            let path = relative_path(name).map_err(|reason| {
                Error::malformed_manifest(format!("{}[{}].name: {}", FILES_KEY, key, reason))
            })?;
            Ok(FileEntry { key, path, content })
        })
        .collect()
}

fn string_field<'a>(file: &'a Mapping, key: &Key, field: &str) -> Result<&'a [u8]> {
    match file.get(field) {
        Some(ValueNode::Scalar(bytes)) => Ok(bytes),
        Some(other) => Err(Error::malformed_manifest(format!(
            "{}[{}].{} must be a string, found {}",
            FILES_KEY,
            key,
            field,
            other.kind()
        ))),
        None => Err(Error::malformed_manifest(format!(
            "{}[{}] has no {}",
            FILES_KEY, key, field
        ))),
    }
}

/// Turn a slash-separated archive name into a relative path.
///
/// Names are taken byte for byte, so legacy latin-1 names survive.
fn relative_path(name: &[u8]) -> std::result::Result<PathBuf, String> {
    let shown = String::from_utf8_lossy(name);
    if name.starts_with(b"/") {
        return Err(format!("absolute path '{}'", shown));
    }

    let mut path = PathBuf::new();
    for segment in name.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => continue,
            b".." => return Err(format!("path '{}' leaves the destination", shown)),
            _ if segment.contains(&0) => return Err("contains a NUL byte".to_string()),
            _ => path.push(path_segment(segment)?),
        }
    }

    if path.as_os_str().is_empty() || name.ends_with(b"/") {
        return Err(format!("'{}' does not name a file", shown));
    }
    Ok(path)
}

#[cfg(unix)]
fn path_segment(segment: &[u8]) -> std::result::Result<&OsStr, String> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(segment))
}

#[cfg(not(unix))]
fn path_segment(segment: &[u8]) -> std::result::Result<&OsStr, String> {
    std::str::from_utf8(segment)
        .map(OsStr::new)
        .map_err(|_| "not valid UTF-8".to_string())
}

/// Write every `FILES` entry of `root` below `dest`.
///
/// `dest` must not exist yet. Parent directories are created best-effort;
/// when one cannot be created the failure is logged and attached to the
/// error of the write that follows. A failed write is recorded in the report
/// and the remaining files are still written.
pub fn materialize(root: &Mapping, dest: &Path) -> Result<MaterializeReport> {
    if dest.exists() {
        return Err(Error::destination_exists(dest));
    }
    let entries = file_entries(root)?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::destination_exists(dest));
        }
        Err(e) => return Err(e.into()),
    }

    let mut report = MaterializeReport::default();
    for entry in &entries {
        let target = dest.join(&entry.path);
        let dir_error = target.parent().and_then(ensure_dir);

        match write_new(&target, entry.content) {
            Ok(()) => {
                log::debug!("Wrote {} ({} bytes)", target.display(), entry.content.len());
                report.files_written += 1;
                report.bytes_written += entry.content.len() as u64;
            }
            Err(e) => {
                let err = Error::file_write(&target, e, dir_error);
                log::error!("{}", err);
                report.failures.push(err);
            }
        }
    }

    log::info!(
        "Extracted {} of {} files to {}",
        report.files_written,
        entries.len(),
        dest.display()
    );
    Ok(report)
}

/// Create `dir` and its parents, returning a description of any failure.
fn ensure_dir(dir: &Path) -> Option<String> {
    if dir.is_dir() {
        return None;
    }
    match fs::create_dir_all(dir) {
        Ok(()) => None,
        Err(e) => {
            log::warn!("Could not create directory {}: {}", dir.display(), e);
            Some(format!("creating {} failed: {}", dir.display(), e))
        }
    }
}

/// Write a file that must not exist yet.
fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{self, Compression};
    use tempfile::TempDir;

    fn manifest(files: &[(&str, &str)]) -> Mapping {
        let files: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(name, content)| (*name, content.as_bytes()))
            .collect();
        manifest_bytes(&files)
    }

    fn manifest_bytes(files: &[(&str, &[u8])]) -> Mapping {
        let mut section = Mapping::new();
        for (index, (name, content)) in files.iter().enumerate() {
            let mut file = Mapping::new();
            file.insert("name".into(), ValueNode::scalar(*name)).unwrap();
            file.insert("size".into(), ValueNode::Integer(content.len() as i64))
                .unwrap();
            file.insert("content".into(), ValueNode::scalar(*content)).unwrap();
            section
                .insert(format!("f{}", index + 1).as_str().into(), file.into())
                .unwrap();
        }
        let mut root = Mapping::new();
        root.insert(FILES_KEY.into(), section.into()).unwrap();
        root
    }

    fn count_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                if path.is_dir() { count_files(&path) } else { 1 }
            })
            .sum()
    }

    #[test]
    fn test_single_nested_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");

        let bytes = container::encode(&manifest(&[("a/b.txt", "hi")]), Compression::Identity)
            .unwrap();
        let root = container::decode(&bytes).unwrap();
        let report = materialize(&root, &dest).unwrap();

        assert!(report.is_success());
        assert_eq!(report.files_written, 1);
        assert_eq!(report.bytes_written, 2);
        assert_eq!(fs::read(dest.join("a/b.txt")).unwrap(), b"hi");
        assert_eq!(count_files(&dest), 1);
    }

    #[test]
    fn test_existing_destination_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let result = materialize(&manifest(&[("x.txt", "x")]), &dest);
        assert!(matches!(result, Err(Error::DestinationExists { .. })));
        assert_eq!(count_files(&dest), 0);
    }

    #[test]
    fn test_existing_file_destination_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        fs::write(&dest, b"keep me").unwrap();

        let result = materialize(&manifest(&[("x.txt", "x")]), &dest);
        assert!(matches!(result, Err(Error::DestinationExists { .. })));
        assert_eq!(fs::read(&dest).unwrap(), b"keep me");
    }

    #[test]
    fn test_empty_file_list_creates_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("nested/out");

        let report = materialize(&manifest(&[]), &dest).unwrap();
        assert!(report.is_success());
        assert_eq!(report.files_written, 0);
        assert!(dest.is_dir());
    }

    #[test]
    fn test_binary_content_is_exact() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        materialize(&manifest_bytes(&[("res/blob.bin", content.as_slice())]), &dest).unwrap();
        assert_eq!(fs::read(dest.join("res/blob.bin")).unwrap(), content);
    }

    #[test]
    fn test_write_failure_does_not_stop_remaining_files() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        let root = manifest(&[("x.txt", "one"), ("x.txt", "two"), ("y.txt", "three")]);

        let report = materialize(&root, &dest).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.files_written, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], Error::FileWrite { .. }));
        // The first write wins; nothing is overwritten.
        assert_eq!(fs::read(dest.join("x.txt")).unwrap(), b"one");
        assert_eq!(fs::read(dest.join("y.txt")).unwrap(), b"three");
    }

    #[test]
    fn test_directory_failure_is_attached_to_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        // "a" is written as a file, so "a/b.txt" cannot get its directory.
        let root = manifest(&[("a", "file"), ("a/b.txt", "nested"), ("c.txt", "c")]);

        let report = materialize(&root, &dest).unwrap();
        assert_eq!(report.files_written, 2);
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0] {
            Error::FileWrite { path, context, .. } => {
                assert_eq!(path, &dest.join("a/b.txt"));
                assert!(context.as_deref().unwrap_or("").contains("creating"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(fs::read(dest.join("c.txt")).unwrap(), b"c");
    }

    #[test]
    fn test_shape_errors_write_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");

        let mut good = Mapping::new();
        good.insert("name".into(), ValueNode::scalar("ok.txt")).unwrap();
        good.insert("content".into(), ValueNode::scalar("ok")).unwrap();
        let mut broken = Mapping::new();
        broken.insert("name".into(), ValueNode::scalar("bad.txt")).unwrap();
        let mut files = Mapping::new();
        files.insert("good".into(), good.into()).unwrap();
        files.insert("broken".into(), broken.into()).unwrap();
        let mut root = Mapping::new();
        root.insert(FILES_KEY.into(), files.into()).unwrap();

        let result = materialize(&root, &dest);
        assert!(matches!(result, Err(Error::MalformedManifest { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_or_wrong_files_section() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");

        assert!(matches!(
            materialize(&Mapping::new(), &dest),
            Err(Error::MalformedManifest { .. })
        ));

        let mut root = Mapping::new();
        root.insert(FILES_KEY.into(), ValueNode::scalar("nope")).unwrap();
        assert!(matches!(
            materialize(&root, &dest),
            Err(Error::MalformedManifest { .. })
        ));

        let mut files = Mapping::new();
        files.insert("f1".into(), ValueNode::Integer(1)).unwrap();
        let mut root = Mapping::new();
        root.insert(FILES_KEY.into(), files.into()).unwrap();
        assert!(matches!(
            file_entries(&root),
            Err(Error::MalformedManifest { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unsafe_names_are_rejected() {
        for name in ["../escape.txt", "a/../../b", "/etc/passwd", "", "dir/", "./"] {
            let root = manifest(&[(name, "x")]);
            assert!(
                matches!(file_entries(&root), Err(Error::MalformedManifest { .. })),
                "expected rejection for {:?}",
                name
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_latin1_names_are_written_byte_exact() {
        use std::os::unix::ffi::OsStrExt;

        let mut file = Mapping::new();
        file.insert("name".into(), ValueNode::scalar(&b"doc/gr\xfc\xdfe.txt"[..]))
            .unwrap();
        file.insert("content".into(), ValueNode::scalar("hallo")).unwrap();
        let mut section = Mapping::new();
        section
            .insert(Key::Name(b"gr\xfc\xdfe".to_vec()), file.into())
            .unwrap();
        let mut root = Mapping::new();
        root.insert(FILES_KEY.into(), section.into()).unwrap();

        // Through the container so the serialized form is exercised too
        let bytes = container::encode(&root, Compression::Identity).unwrap();
        let root = container::decode(&bytes).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        let report = materialize(&root, &dest).unwrap();
        assert!(report.is_success());

        let target = dest
            .join("doc")
            .join(OsStr::from_bytes(b"gr\xfc\xdfe.txt"));
        assert_eq!(fs::read(target).unwrap(), b"hallo");
    }

    #[test]
    fn test_entries_follow_manifest_order() {
        let root = manifest(&[("z.txt", ""), ("a/./b.txt", "b"), ("m//n.txt", "n")]);
        let entries = file_entries(&root).unwrap();
        let paths: Vec<PathBuf> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("z.txt"),
                PathBuf::from("a/b.txt"),
                PathBuf::from("m/n.txt")
            ]
        );
        assert_eq!(entries[1].key, &Key::from("f2"));
        assert_eq!(entries[1].content, b"b");
    }

    use proptest::prelude::*;
    use std::collections::BTreeMap;

    // Directory segments have no dot and file names always do, so no path
    // can be both a file and a directory.
    fn arb_files() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
        prop::collection::btree_map(
            "([a-z]{1,6}/){0,2}[a-z]{1,6}\\.[a-z]{1,3}",
            prop::collection::vec(any::<u8>(), 0..512),
            0..12,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Encoding, decoding and materializing reproduces every file exactly
        #[test]
        fn prop_roundtrip_files(
            files in arb_files(),
            compression in prop::sample::select(vec![Compression::Identity, Compression::Zlib]),
        ) {
            let pairs: Vec<(&str, &[u8])> =
                files.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
            let bytes = container::encode(&manifest_bytes(&pairs), compression)?;
            let root = container::decode(&bytes)?;

            let temp_dir = TempDir::new()?;
            let dest = temp_dir.path().join("out");
            let report = materialize(&root, &dest)?;

            prop_assert!(report.is_success());
            prop_assert_eq!(report.files_written, files.len());
            prop_assert_eq!(count_files(&dest), files.len());
            for (name, content) in &files {
                prop_assert_eq!(&fs::read(dest.join(name))?, content);
            }
        }

        /// An existing destination always fails and gains no files
        #[test]
        fn prop_existing_destination_untouched(files in arb_files()) {
            let pairs: Vec<(&str, &[u8])> =
                files.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
            let temp_dir = TempDir::new()?;
            let dest = temp_dir.path().to_path_buf();

            let result = materialize(&manifest_bytes(&pairs), &dest);
            prop_assert!(
                matches!(result, Err(Error::DestinationExists { .. })),
                "existing destination must be refused"
            );
            prop_assert_eq!(count_files(&dest), 0);
        }
    }
}
