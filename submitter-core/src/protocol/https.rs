use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::contract::{Protocol, Transmission};
use crate::error::ProtocolError;
use crate::target::FILE_PARAM_PREFIX;

/// POSTs a `multipart/form-data` request.
///
/// Each transport param becomes one form field, in declaration order.
/// `$file.<field>` params carry the archive as a file part named `<field>`
/// whose file name is the param value; every other param is a text field.
/// The whole response body is the submission response, even when empty.
#[derive(Debug, Clone)]
pub struct HttpsProtocol {
    client: reqwest::Client,
}

impl HttpsProtocol {
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.http_client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Protocol for HttpsProtocol {
    async fn submit(&self, transmission: Transmission<'_>) -> Result<Option<String>, ProtocolError> {
        let mut form = Form::new();
        let mut archive: Option<Vec<u8>> = None;

        for (name, value) in transmission.params {
            match name.strip_prefix(FILE_PARAM_PREFIX) {
                Some(field) => {
                    let bytes = match &archive {
                        Some(bytes) => bytes.clone(),
                        None => {
                            let bytes = transmission.archive.package()?;
                            archive = Some(bytes.clone());
                            bytes
                        }
                    };
                    debug!(field, file_name = %value, bytes = bytes.len(), "multipart_file_part");
                    let part = Part::bytes(bytes)
                        .file_name(value.clone())
                        .mime_str("application/octet-stream")?;
                    form = form.part(field.to_owned(), part);
                }
                None => {
                    debug!(field = %name, "multipart_text_part");
                    form = form.text(name.clone(), value.clone());
                }
            }
        }

        let response = self
            .client
            .post(transmission.uri.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProtocolError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!(status = status.as_u16(), bytes = body.len(), "multipart_submitted");
        Ok(Some(body))
    }
}
