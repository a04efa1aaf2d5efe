//! File reference resolution
//!
//! References are normalized to forward slashes with `.`/`..` folded, then
//! written in one of three forms:
//! - absolute (`C:/mods/tractor/textures/paint.png`)
//! - relative to the exported document (`textures/paint.png`)
//! - rooted at the game install (`$data/shaders/vehicleShader.xml`)

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use i3d_core::{ExportConfig, PathMode};

use crate::report::{ExportReport, PathResolutionWarning};

/// Virtual root standing for `<install>/data`
pub const DATA_PREFIX: &str = "$data";

/// A resolved file reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathReference {
    /// Form actually written (may differ from the configured mode after a fallback)
    pub mode: PathMode,
    pub resolved: String,
}

/// Split off a drive (`C:`) or root (`/`) prefix
fn split_prefix(path: &str) -> (Option<String>, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = format!("{}:", (bytes[0] as char).to_ascii_uppercase());
        (Some(drive), &path[2..])
    } else if path.starts_with('/') {
        (Some(String::new()), path)
    } else {
        (None, path)
    }
}

/// Normalize a path
/// - Converts backslashes to forward slashes
/// - Removes redundant separators
/// - Resolves . and .. components
/// - Upper-cases a drive letter
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let (prefix, rest) = split_prefix(&path);

    let mut components: Vec<&str> = Vec::new();
    for component in rest.split('/') {
        match component {
            "" | "." => continue,
            ".." => match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                // Above the root there is nothing to fold
                _ if prefix.is_some() => {}
                _ => components.push(".."),
            },
            _ => components.push(component),
        }
    }

    match prefix {
        Some(prefix) => format!("{}/{}", prefix, components.join("/")),
        None if components.is_empty() => ".".to_string(),
        None => components.join("/"),
    }
}

/// Whether a normalized path is absolute
pub fn is_absolute(path: &str) -> bool {
    split_prefix(path).0.is_some()
}

/// Join path components
pub fn join_paths(base: &str, relative: &str) -> String {
    let relative = relative.replace('\\', "/");
    if is_absolute(&relative) {
        return normalize_path(&relative);
    }
    let base = base.trim_end_matches(['/', '\\']);
    normalize_path(&format!("{}/{}", base, relative))
}

fn components(path: &str) -> (Option<String>, Vec<&str>) {
    let (prefix, rest) = split_prefix(path);
    (prefix, rest.split('/').filter(|c| !c.is_empty()).collect())
}

/// `target` relative to the directory `base`; both absolute and normalized.
///
/// `None` when they live on different drives.
pub fn relative_path(target: &str, base: &str) -> Option<String> {
    let (target_prefix, target_parts) = components(target);
    let (base_prefix, base_parts) = components(base);
    if target_prefix != base_prefix {
        return None;
    }
    // Drive paths compare case-insensitively
    let windows = target_prefix.as_deref().map(|p| !p.is_empty()).unwrap_or(false);
    let same = |a: &str, b: &str| if windows { a.eq_ignore_ascii_case(b) } else { a == b };

    let common = target_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| same(a, b))
        .count();

    let mut parts: Vec<&str> = vec![".."; base_parts.len() - common];
    parts.extend_from_slice(&target_parts[common..]);
    if parts.is_empty() {
        Some(".".to_string())
    } else {
        Some(parts.join("/"))
    }
}

/// Strip a directory prefix case-insensitively, returning the remainder
fn strip_dir_prefix_ci<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    if path.len() <= dir.len() || !path.is_char_boundary(dir.len()) {
        return None;
    }
    let (head, tail) = path.split_at(dir.len());
    if head.eq_ignore_ascii_case(dir) && tail.starts_with('/') {
        Some(&tail[1..])
    } else {
        None
    }
}

/// Resolves authored file references for one export
#[derive(Debug)]
pub struct PathResolver {
    mode: PathMode,
    /// Normalized `<install>/data`
    data_dir: Option<String>,
    document_dir: String,
    /// Directory relative references are authored against
    source_dir: String,
    warned: HashSet<String>,
}

impl PathResolver {
    /// Create a resolver for a document written into `document_dir`
    pub fn new(config: &ExportConfig, document_dir: &Path, source_dir: &Path) -> Self {
        let data_dir = config
            .install_root()
            .map(|root| join_paths(&root.to_string_lossy(), "data"));
        Self {
            mode: config.path_mode,
            data_dir,
            document_dir: normalize_path(&document_dir.to_string_lossy()),
            source_dir: normalize_path(&source_dir.to_string_lossy()),
            warned: HashSet::new(),
        }
    }

    /// Configured mode
    pub fn mode(&self) -> PathMode {
        self.mode
    }

    /// Absolute, normalized form of an authored reference
    pub fn absolute(&self, reference: &str) -> String {
        join_paths(&self.source_dir, reference)
    }

    /// Resolve one reference. Never fails; fallbacks are reported.
    pub fn resolve(&mut self, reference: &str, report: &mut ExportReport) -> PathReference {
        let reference = reference.trim();
        if reference.starts_with('$') {
            return PathReference {
                mode: PathMode::RelativeToInstall,
                resolved: reference.replace('\\', "/"),
            };
        }

        let absolute = self.absolute(reference);
        match self.mode {
            PathMode::Absolute => PathReference {
                mode: PathMode::Absolute,
                resolved: absolute,
            },
            PathMode::RelativeToDocument => self.relative_to_document(absolute),
            PathMode::RelativeToInstall => match &self.data_dir {
                None => {
                    if self.warned.insert(absolute.clone()) {
                        report.path_warning(PathResolutionWarning {
                            path: reference.to_string(),
                            resolved: absolute.clone(),
                            message: "no game install directory configured; written as absolute path"
                                .to_string(),
                        });
                    }
                    PathReference {
                        mode: PathMode::Absolute,
                        resolved: absolute,
                    }
                }
                Some(data_dir) => match strip_dir_prefix_ci(&absolute, data_dir) {
                    Some(rest) => PathReference {
                        mode: PathMode::RelativeToInstall,
                        resolved: format!("{}/{}", DATA_PREFIX, rest),
                    },
                    None => {
                        debug!(path = %absolute, "Outside the install data directory, written relative to the document");
                        self.relative_to_document(absolute)
                    }
                },
            },
        }
    }

    fn relative_to_document(&self, absolute: String) -> PathReference {
        match relative_path(&absolute, &self.document_dir) {
            Some(relative) => PathReference {
                mode: PathMode::RelativeToDocument,
                resolved: relative,
            },
            None => PathReference {
                mode: PathMode::Absolute,
                resolved: absolute,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(mode: PathMode, install: Option<&str>) -> ExportConfig {
        ExportConfig {
            path_mode: mode,
            install_root: install.map(PathBuf::from),
            ..Default::default()
        }
    }

    fn resolver(mode: PathMode, install: Option<&str>) -> PathResolver {
        PathResolver::new(
            &config(mode, install),
            Path::new("C:/mods/tractor"),
            Path::new("C:/mods/tractor/source"),
        )
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("foo\\bar"), "foo/bar");
        assert_eq!(normalize_path("/foo//bar/"), "/foo/bar");
        assert_eq!(normalize_path("foo/./baz/../bar"), "foo/bar");
        assert_eq!(normalize_path("c:\\Games\\FS25"), "C:/Games/FS25");
        assert_eq!(normalize_path("../a"), "../a");
        assert_eq!(normalize_path("/../a"), "/a");
        assert_eq!(normalize_path(""), ".");
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/foo", "bar"), "/foo/bar");
        assert_eq!(join_paths("/foo/", "../bar"), "/bar");
        assert_eq!(join_paths("/foo", "D:/bar"), "D:/bar");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/a/b/c.png", "/a"), Some("b/c.png".into()));
        assert_eq!(relative_path("/a/x/c.png", "/a/b"), Some("../x/c.png".into()));
        assert_eq!(relative_path("C:/A/b.png", "C:/a"), Some("b.png".into()));
        assert_eq!(relative_path("D:/a/b.png", "C:/a"), None);
        assert_eq!(relative_path("/a", "/a"), Some(".".into()));
    }

    #[test]
    fn test_absolute_mode() {
        let mut r = resolver(PathMode::Absolute, None);
        let mut report = ExportReport::new();
        let path = r.resolve("../textures/paint.png", &mut report);
        assert_eq!(path.resolved, "C:/mods/tractor/textures/paint.png");
        assert_eq!(path.mode, PathMode::Absolute);
    }

    #[test]
    fn test_document_mode() {
        let mut r = resolver(PathMode::RelativeToDocument, None);
        let mut report = ExportReport::new();
        assert_eq!(r.resolve("../textures/paint.png", &mut report).resolved, "textures/paint.png");
        let other_drive = r.resolve("D:\\shared\\rust.png", &mut report);
        assert_eq!(other_drive.resolved, "D:/shared/rust.png");
        assert_eq!(other_drive.mode, PathMode::Absolute);
        assert!(report.path_warnings.is_empty());
    }

    #[test]
    fn test_install_mode() {
        let mut r = resolver(PathMode::RelativeToInstall, Some("C:/Games/FS25"));
        let mut report = ExportReport::new();
        let shader = r.resolve("C:\\Games\\FS25\\Data\\shaders\\vehicleShader.xml", &mut report);
        assert_eq!(shader.resolved, "$data/shaders/vehicleShader.xml");
        assert_eq!(shader.mode, PathMode::RelativeToInstall);

        let local = r.resolve("../textures/paint.png", &mut report);
        assert_eq!(local.resolved, "textures/paint.png");
        assert_eq!(local.mode, PathMode::RelativeToDocument);
        assert!(report.path_warnings.is_empty());
    }

    #[test]
    fn test_references_dedup_by_mode_and_path() {
        let mut r = resolver(PathMode::RelativeToDocument, None);
        let mut report = ExportReport::new();
        let references: HashSet<PathReference> = [
            "../textures/paint.png",
            "..\\textures\\paint.png",
            "D:/shared/rust.png",
        ]
        .iter()
        .map(|p| r.resolve(p, &mut report))
        .collect();
        assert_eq!(references.len(), 2);
        assert!(references.contains(&PathReference {
            mode: PathMode::Absolute,
            resolved: "D:/shared/rust.png".into(),
        }));
    }

    #[test]
    fn test_virtual_root_passes_through() {
        for mode in [PathMode::Absolute, PathMode::RelativeToDocument, PathMode::RelativeToInstall] {
            let mut r = resolver(mode, None);
            let mut report = ExportReport::new();
            let path = r.resolve("$data/shaders/treeShader.xml", &mut report);
            assert_eq!(path.resolved, "$data/shaders/treeShader.xml");
            assert!(report.path_warnings.is_empty());
        }
    }

    #[test]
    fn test_missing_install_root_warns_once_per_path() {
        let mut r = resolver(PathMode::RelativeToInstall, None);
        let mut report = ExportReport::new();
        let first = r.resolve("C:/tex/a.dds", &mut report);
        r.resolve("C:/tex/a.dds", &mut report);
        r.resolve("C:/tex/b.dds", &mut report);

        assert_eq!(first.mode, PathMode::Absolute);
        assert_eq!(first.resolved, "C:/tex/a.dds");
        assert_eq!(report.path_warnings.len(), 2);
        assert_eq!(report.path_warnings[0].path, "C:/tex/a.dds");
    }
}
