use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::invalid_destination;
use crate::contract::{Protocol, Transmission};
use crate::error::ProtocolError;

/// Writes the archive to the local path named by a `file:` URI.
///
/// The parent directory must already exist. An existing file is replaced.
#[derive(Debug, Clone, Default)]
pub struct FileProtocol;

impl FileProtocol {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Protocol for FileProtocol {
    async fn submit(&self, transmission: Transmission<'_>) -> Result<Option<String>, ProtocolError> {
        let uri = transmission.uri;
        let path = uri
            .to_file_path()
            .map_err(|_| invalid_destination(uri, "not a local file path"))?;
        let bytes = transmission.archive.package()?;

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        info!(path = %path.display(), bytes = bytes.len(), "archive_written");
        Ok(None)
    }
}
