//! Project assembly: per-target file sets plus externally supplied
//! scaffolding, merged into one path-keyed tree.
//!
//! Generated files for `rust/axum` land under `rust-axum/`. Scaffolding is
//! either shared (archive root) or per target (under the same prefix). The
//! tree never silently overwrites: any path claimed twice is a
//! [`PathConflictError`]. Contents are bytes; scaffolding may hold binary
//! files such as wrapper jars or icons.

use crate::error::PathConflictError;
use crate::generator::FileSet;
use crate::mapping::TargetKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Directory inside a scaffolding root holding per-target trees.
const TARGETS_DIR: &str = "targets";

/// Static files supplied from outside the generator (build files,
/// container files, documentation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scaffolding {
    /// Placed at the archive root.
    pub shared: BTreeMap<String, Vec<u8>>,
    /// Placed under the target's prefix.
    pub per_target: BTreeMap<TargetKey, BTreeMap<String, Vec<u8>>>,
}

impl Scaffolding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.per_target.values().all(BTreeMap::is_empty)
    }

    /// Read a scaffolding directory. Files under `targets/<lang>-<fw>/` go
    /// to that target; everything else is shared.
    pub fn load(root: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        collect(root, root, &mut files)?;

        let mut scaffolding = Self::new();
        for (path, content) in files {
            let target = path
                .strip_prefix(TARGETS_DIR)
                .and_then(|rest| rest.strip_prefix('/'))
                .and_then(|rest| rest.split_once('/'))
                .and_then(|(dir, file)| Some((dir.parse::<TargetKey>().ok()?, file.to_string())));
            match target {
                Some((key, file)) => {
                    scaffolding.per_target.entry(key).or_default().insert(file, content);
                }
                None => {
                    scaffolding.shared.insert(path, content);
                }
            }
        }
        debug!(
            shared = scaffolding.shared.len(),
            targets = scaffolding.per_target.len(),
            "loaded scaffolding"
        );
        Ok(scaffolding)
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((key, fs::read(&path)?));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Generated,
    Scaffolding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    /// Content length in bytes.
    pub size: usize,
    pub origin: Origin,
    /// Owning target, `None` for shared scaffolding.
    pub target: Option<TargetKey>,
}

/// Ordered list of archive entries, kept apart from file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveManifest {
    pub entries: Vec<ManifestEntry>,
}

impl ArchiveManifest {
    pub fn total_size(&self) -> usize {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn count(&self, origin: Origin) -> usize {
        self.entries.iter().filter(|e| e.origin == origin).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Archive {
    files: BTreeMap<String, Vec<u8>>,
    manifest: ArchiveManifest,
}

impl Archive {
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Content of a text file; `None` when absent or not UTF-8.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file below `dir`, creating directories as needed.
    pub fn write_to(&self, dir: &Path) -> io::Result<()> {
        for (path, content) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }
        debug!(dir = %dir.display(), files = self.files.len(), "archive written");
        Ok(())
    }

    fn insert(
        &mut self,
        path: String,
        content: &[u8],
        origin: Origin,
        target: Option<&TargetKey>,
    ) -> Result<(), PathConflictError> {
        if self.files.contains_key(&path) {
            let generated_by = self
                .manifest
                .entries
                .iter()
                .find(|e| e.path == path)
                .map(|e| match (&e.target, e.origin) {
                    (Some(key), Origin::Generated) => key.to_string(),
                    _ => "scaffolding".to_string(),
                })
                .unwrap_or_default();
            return Err(PathConflictError { path, generated_by });
        }
        self.manifest.entries.push(ManifestEntry {
            path: path.clone(),
            size: content.len(),
            origin,
            target: target.cloned(),
        });
        self.files.insert(path, content.to_vec());
        Ok(())
    }
}

/// Merge generated file sets and scaffolding into one archive.
pub fn assemble(
    file_sets: &BTreeMap<TargetKey, FileSet>,
    scaffolding: &Scaffolding,
) -> Result<Archive, PathConflictError> {
    let mut archive = Archive::default();

    for (key, files) in file_sets {
        let prefix = key.prefix();
        for (path, content) in files.iter() {
            archive.insert(
                format!("{}/{}", prefix, path),
                content.as_bytes(),
                Origin::Generated,
                Some(key),
            )?;
        }
    }
    for (key, files) in &scaffolding.per_target {
        let prefix = key.prefix();
        for (path, content) in files {
            archive.insert(
                format!("{}/{}", prefix, path),
                content,
                Origin::Scaffolding,
                Some(key),
            )?;
        }
    }
    for (path, content) in &scaffolding.shared {
        archive.insert(path.clone(), content, Origin::Scaffolding, None)?;
    }

    archive.manifest.entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        files = archive.len(),
        bytes = archive.manifest.total_size(),
        "archive assembled"
    );
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_sets() -> BTreeMap<TargetKey, FileSet> {
        let axum = TargetKey::new("rust", "axum");
        let gin = TargetKey::new("go", "gin");
        let mut a = FileSet::default();
        a.add(&axum, "src/main.rs", "fn main() {}\n".to_string()).unwrap();
        let mut g = FileSet::default();
        g.add(&gin, "cmd/server/main.go", "package main\n".to_string()).unwrap();
        BTreeMap::from([(axum, a), (gin, g)])
    }

    #[test]
    fn test_prefixes_and_manifest_order() {
        let mut scaffolding = Scaffolding::new();
        scaffolding
            .shared
            .insert("README.md".to_string(), b"# shop\n".to_vec());
        scaffolding
            .per_target
            .entry(TargetKey::new("rust", "axum"))
            .or_default()
            .insert("Cargo.toml".to_string(), b"[package]\n".to_vec());

        let archive = assemble(&file_sets(), &scaffolding).unwrap();
        let paths: Vec<&str> = archive
            .manifest()
            .entries
            .iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "README.md",
                "go-gin/cmd/server/main.go",
                "rust-axum/Cargo.toml",
                "rust-axum/src/main.rs",
            ]
        );
        assert_eq!(archive.manifest().count(Origin::Scaffolding), 2);
        assert_eq!(archive.manifest().entries[3].size, 13);
        assert_eq!(archive.get_str("rust-axum/src/main.rs"), Some("fn main() {}\n"));
    }

    #[test]
    fn test_scaffolding_collision_is_fatal() {
        let mut scaffolding = Scaffolding::new();
        scaffolding
            .per_target
            .entry(TargetKey::new("rust", "axum"))
            .or_default()
            .insert("src/main.rs".to_string(), b"// mine\n".to_vec());

        let err = assemble(&file_sets(), &scaffolding).unwrap_err();
        assert_eq!(err.path, "rust-axum/src/main.rs");
        assert_eq!(err.generated_by, "rust/axum");
    }

    #[test]
    fn test_shared_collision_is_fatal() {
        let mut scaffolding = Scaffolding::new();
        scaffolding
            .shared
            .insert("go-gin/cmd/server/main.go".to_string(), Vec::new());
        assert!(assemble(&file_sets(), &scaffolding).is_err());
    }

    #[test]
    fn test_load_and_write_round_trip() {
        let root = std::env::temp_dir().join(format!("schemaforge-scaffold-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("targets/go-gin")).unwrap();
        fs::write(root.join("README.md"), "hi\n").unwrap();
        fs::write(root.join("targets/go-gin/go.mod"), "module shop\n").unwrap();

        let scaffolding = Scaffolding::load(&root).unwrap();
        assert_eq!(scaffolding.shared.keys().collect::<Vec<_>>(), vec!["README.md"]);
        assert_eq!(
            scaffolding.per_target[&TargetKey::new("go", "gin")].get("go.mod"),
            Some(&b"module shop\n".to_vec())
        );

        let archive = assemble(&file_sets(), &scaffolding).unwrap();
        let out = root.join("out");
        archive.write_to(&out).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("go-gin/go.mod")).unwrap(),
            "module shop\n"
        );
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_binary_scaffolding_is_copied_verbatim() {
        let jar: &[u8] = &[0x50, 0x4b, 0x03, 0x04, 0xff, 0xfe, 0x00, 0xc3];
        let root = std::env::temp_dir().join(format!("schemaforge-binary-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let wrapper = root.join("targets/java-spring/gradle/wrapper");
        fs::create_dir_all(&wrapper).unwrap();
        fs::write(wrapper.join("gradle-wrapper.jar"), jar).unwrap();
        fs::write(root.join("favicon.ico"), [0x00, 0x00, 0x01, 0x00, 0xff]).unwrap();

        let scaffolding = Scaffolding::load(&root).unwrap();
        let spring = &scaffolding.per_target[&TargetKey::new("java", "spring")];
        assert_eq!(spring["gradle/wrapper/gradle-wrapper.jar"].as_slice(), jar);

        let archive = assemble(&file_sets(), &scaffolding).unwrap();
        let path = "java-spring/gradle/wrapper/gradle-wrapper.jar";
        assert_eq!(archive.get(path), Some(jar));
        assert_eq!(archive.get_str(path), None);
        let entry = archive.manifest().entries.iter().find(|e| e.path == path).unwrap();
        assert_eq!(entry.size, jar.len());

        let out = root.join("out");
        archive.write_to(&out).unwrap();
        assert_eq!(fs::read(out.join(path)).unwrap(), jar);
        assert_eq!(fs::read(out.join("favicon.ico")).unwrap(), vec![0x00, 0x00, 0x01, 0x00, 0xff]);
        fs::remove_dir_all(&root).unwrap();
    }
}
