use std::io::{Cursor, Write};

use ::zip::ZipWriter;
use tracing::debug;

use super::{entry_options, finish, write_project_entries};
use crate::contract::{PackRequest, Packager};
use crate::error::PackageError;
use crate::target::Params;

pub const JAR_PACKAGER: &str = "net.sf.webcat.eclipse.submitter.packagers.jar";

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MAX_LINE_BYTES: usize = 72;

/// Zip archive with a `META-INF/MANIFEST.MF` whose main attributes are the
/// effective packager params, placeholders resolved.
#[derive(Debug, Clone, Default)]
pub struct JarPackager;

impl JarPackager {
    pub fn new() -> Self {
        Self
    }
}

impl Packager for JarPackager {
    fn pack(&self, request: &PackRequest<'_>, out: &mut dyn Write) -> Result<(), PackageError> {
        let params = request.params()?;
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));

        archive.start_file(MANIFEST_PATH, entry_options())?;
        archive.write_all(manifest_text(&params).as_bytes())?;

        let entries = write_project_entries(request, &mut archive, &[MANIFEST_PATH])?;
        finish(archive, out)?;
        debug!(entries, attributes = params.len(), "jar_archive_packed");
        Ok(())
    }
}

/// Renders a manifest main section: `Manifest-Version` first, then one
/// attribute per param. Lines are CRLF-terminated and wrapped at 72 bytes
/// with single-space continuation lines.
pub fn manifest_text(params: &Params) -> String {
    let mut out = String::new();
    push_attribute(&mut out, "Manifest-Version", "1.0");
    for (name, value) in params {
        if name.eq_ignore_ascii_case("Manifest-Version") {
            continue;
        }
        push_attribute(&mut out, name, value);
    }
    out.push_str("\r\n");
    out
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    let line = format!("{name}: {value}");
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        // Continuation lines spend one byte on the leading space.
        limit = MAX_LINE_BYTES - 1;
    }
}
