//! Project file-tree providers.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::contract::{ProjectFile, ProjectFiles};

/// A project rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryProject {
    root: PathBuf,
}

impl DirectoryProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a relative `/` path back onto the directory, refusing anything
    /// that would escape it.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{path}' is not a path inside the project"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ProjectFiles for DirectoryProject {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn files(&self) -> io::Result<Vec<ProjectFile>> {
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let len = entry.metadata().map_err(io::Error::from)?.len();
            out.push(ProjectFile { path, len });
        }
        Ok(out)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(File::open(self.resolve(path)?)?))
    }
}

/// A project held entirely in memory, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemoryProject {
    name: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl ProjectFiles for MemoryProject {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn files(&self) -> io::Result<Vec<ProjectFile>> {
        Ok(self
            .files
            .iter()
            .map(|(path, contents)| ProjectFile {
                path: path.clone(),
                len: contents.len() as u64,
            })
            .collect())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        let contents = self.files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no file '{path}' in project"))
        })?;
        Ok(Box::new(Cursor::new(contents.as_slice())))
    }
}
