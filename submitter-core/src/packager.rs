//! Reference packagers.
//!
//! Both packagers produce a zip archive of the project files that survive
//! the target's include/exclude rules, stored under their project-relative
//! paths. [`JarPackager`] additionally writes `META-INF/MANIFEST.MF`.

pub mod jar;

use std::io::{self, Cursor, Write};

use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};
use tracing::debug;

use crate::contract::{PackRequest, Packager};
use crate::error::PackageError;

pub use jar::{JarPackager, JAR_PACKAGER};

pub use crate::target::DEFAULT_PACKAGER as ZIP_PACKAGER;

pub(crate) type ArchiveWriter = ZipWriter<Cursor<Vec<u8>>>;

pub(crate) fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Copies every included project file into `archive`, skipping `reserved`
/// paths that the packager writes itself. Returns the number of entries.
pub(crate) fn write_project_entries(
    request: &PackRequest<'_>,
    archive: &mut ArchiveWriter,
    reserved: &[&str],
) -> Result<usize, PackageError> {
    let mut count = 0;
    for file in request.included_files()? {
        if reserved.contains(&file.path.as_str()) {
            debug!(path = %file.path, "skipping reserved archive path");
            continue;
        }
        archive.start_file(file.path.as_str(), entry_options())?;
        let mut reader = request.project.open(&file.path)?;
        let copied = io::copy(&mut reader, archive)?;
        debug!(path = %file.path, bytes = copied, "archive_entry_written");
        count += 1;
    }
    Ok(count)
}

pub(crate) fn finish(archive: ArchiveWriter, out: &mut dyn Write) -> Result<(), PackageError> {
    let bytes = archive.finish()?.into_inner();
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

/// Plain zip archive; the builtin default packager.
#[derive(Debug, Clone, Default)]
pub struct ZipPackager;

impl ZipPackager {
    pub fn new() -> Self {
        Self
    }
}

impl Packager for ZipPackager {
    fn pack(&self, request: &PackRequest<'_>, out: &mut dyn Write) -> Result<(), PackageError> {
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        let entries = write_project_entries(request, &mut archive, &[])?;
        finish(archive, out)?;
        debug!(entries, "zip_archive_packed");
        Ok(())
    }
}
