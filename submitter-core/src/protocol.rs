//! Reference protocols, one per URI scheme.
//!
//! | scheme  | type              | response            |
//! |---------|-------------------|---------------------|
//! | `file`  | [`FileProtocol`]  | none                |
//! | `ftp`   | [`FtpProtocol`]   | none                |
//! | `https` | [`HttpsProtocol`] | the response body   |
//!
//! None of them can undo a transfer that was interrupted part way.

pub mod file;
pub mod ftp;
pub mod https;

pub use file::FileProtocol;
pub use ftp::FtpProtocol;
pub use https::HttpsProtocol;

use std::borrow::Cow;

use url::Url;

use crate::error::ProtocolError;

pub(crate) fn invalid_destination(uri: &Url, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidDestination {
        uri: uri.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn decode<'a>(uri: &Url, text: &'a str) -> Result<Cow<'a, str>, ProtocolError> {
    urlencoding::decode(text).map_err(|e| invalid_destination(uri, e.to_string()))
}
