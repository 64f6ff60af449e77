//! # contract: seams for the pluggable collaborators
//!
//! The engine never touches a filesystem, an archive format or a network
//! stack directly. It talks to the traits in this module:
//!
//! - [`ProjectFiles`]: the project being submitted, as relative paths plus
//!   byte readers;
//! - [`Packager`]: turns the filtered project into an archive;
//! - [`Protocol`]: moves the archive to the destination URI;
//! - [`SubmissionListener`]: observes the lifecycle of each attempt;
//! - [`DefinitionsFetcher`]: retrieves definitions documents for the tree
//!   and its import groups.
//!
//! Reference implementations live in [`crate::project`],
//! [`crate::packager`], [`crate::protocol`] and [`crate::import`].
//!
//! ## Mocking & Testing
//! `DefinitionsFetcher` is annotated for `mockall`; the generated
//! `MockDefinitionsFetcher` is exported behind the `test-export-mocks`
//! feature so integration tests can assert how often a document is fetched.

use std::io::{Read, Write};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tokio::runtime::{Handle, RuntimeFlavor};
use url::Url;

use crate::error::{PackageError, ProtocolError, SubmissionError, TargetError};
use crate::manifest::{ParameterResolver, SubmissionManifest};
use crate::target::{Params, TargetId, TargetTree};

/// One file of a project, addressed by its `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub len: u64,
}

/// Read-only view of the project tree being submitted.
pub trait ProjectFiles: Send + Sync {
    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;

    /// Every regular file, recursively, in a stable order.
    fn files(&self) -> std::io::Result<Vec<ProjectFile>>;

    fn open(&self, path: &str) -> std::io::Result<Box<dyn Read + Send + '_>>;
}

/// What a packager needs to produce an archive for one submission.
pub struct PackRequest<'a> {
    pub tree: &'a TargetTree,
    pub target: TargetId,
    pub project: &'a dyn ProjectFiles,
    pub resolver: &'a ParameterResolver,
}

impl PackRequest<'_> {
    /// Effective packager params with placeholders resolved.
    pub fn params(&self) -> Result<Params, TargetError> {
        Ok(self.resolver.resolve_params(&self.tree.packager_params(self.target)?))
    }

    /// Project files that survive the target's include/exclude rules.
    pub fn included_files(&self) -> Result<Vec<ProjectFile>, PackageError> {
        let mut out = Vec::new();
        for file in self.project.files()? {
            if self.tree.is_file_excluded(self.target, &file.path)? {
                tracing::debug!(path = %file.path, "file_excluded");
            } else {
                out.push(file);
            }
        }
        Ok(out)
    }
}

/// Writes the filtered project into an archive format it owns.
pub trait Packager: Send + Sync {
    fn pack(&self, request: &PackRequest<'_>, out: &mut dyn Write) -> Result<(), PackageError>;
}

/// Lets a protocol pull the packaged archive when and where it needs it.
pub struct ArchiveSource<'a> {
    pub packager: &'a dyn Packager,
    pub request: PackRequest<'a>,
}

impl ArchiveSource<'_> {
    pub fn write_to(&self, out: &mut dyn Write) -> Result<(), PackageError> {
        self.packager.pack(&self.request, out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    /// [`ArchiveSource::to_bytes`] for use inside a protocol. Packaging reads
    /// project files synchronously, so on a multi-threaded runtime the
    /// worker's other tasks are handed to another thread meanwhile.
    pub fn package(&self) -> Result<Vec<u8>, PackageError> {
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| self.to_bytes()),
            _ => self.to_bytes(),
        }
    }
}

/// Everything a protocol receives for one transfer.
pub struct Transmission<'a> {
    pub uri: &'a Url,
    /// Effective transport params, placeholders already resolved.
    pub params: &'a Params,
    pub manifest: &'a SubmissionManifest,
    pub archive: &'a ArchiveSource<'a>,
}

/// Transfers an archive to a destination named by a URI scheme.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Returns the textual response of the destination, if it produces one.
    async fn submit(&self, transmission: Transmission<'_>) -> Result<Option<String>, ProtocolError>;
}

/// Observes submission attempts. Callbacks must not panic; if one does, the
/// panic is logged and the remaining listeners still run.
pub trait SubmissionListener: Send + Sync {
    fn on_started(&self, manifest: &SubmissionManifest);

    fn on_succeeded(&self, manifest: &SubmissionManifest, response: Option<&str>);

    fn on_failed(&self, manifest: &SubmissionManifest, error: &SubmissionError);

    fn on_canceled(&self, _manifest: &SubmissionManifest) {}
}

/// Retrieves the text of a definitions document.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DefinitionsFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, TargetError>;
}
