//! Minimal passive-mode FTP upload (`STOR`).
//!
//! Credentials come from the URI user-info; without them the client logs in
//! as `anonymous`. The URI path, without its leading `/`, is the remote file
//! name relative to the login directory.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};
use url::Url;

use super::{decode, invalid_destination};
use crate::config::TransportConfig;
use crate::contract::{Protocol, Transmission};
use crate::error::ProtocolError;

const DEFAULT_PORT: u16 = 21;

#[derive(Debug, Clone)]
pub struct FtpProtocol {
    config: TransportConfig,
}

impl FtpProtocol {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Protocol for FtpProtocol {
    async fn submit(&self, transmission: Transmission<'_>) -> Result<Option<String>, ProtocolError> {
        let uri = transmission.uri;
        let target = FtpTarget::from_url(uri)?;
        let bytes = transmission.archive.package()?;

        let upload = upload(&target, &bytes);
        match tokio::time::timeout(self.config.timeout(), upload).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("FTP transfer to {} timed out", target.host),
                )))
            }
        }
        info!(host = %target.host, path = %target.path, bytes = bytes.len(), "ftp_stored");
        Ok(None)
    }
}

struct FtpTarget {
    host: String,
    port: u16,
    user: String,
    password: String,
    path: String,
}

impl FtpTarget {
    fn from_url(uri: &Url) -> Result<Self, ProtocolError> {
        let host = uri
            .host_str()
            .ok_or_else(|| invalid_destination(uri, "missing host"))?
            .to_owned();
        let path = decode(uri, uri.path().trim_start_matches('/'))?.into_owned();
        if path.is_empty() {
            return Err(invalid_destination(uri, "missing remote file name"));
        }
        let (user, password) = if uri.username().is_empty() {
            ("anonymous".to_owned(), "anonymous@".to_owned())
        } else {
            (
                decode(uri, uri.username())?.into_owned(),
                decode(uri, uri.password().unwrap_or_default())?.into_owned(),
            )
        };
        for (field, value) in [("path", &path), ("user name", &user), ("password", &password)] {
            if value.contains(['\r', '\n']) {
                return Err(invalid_destination(uri, format!("control characters in the {field}")));
            }
        }
        Ok(Self {
            host,
            port: uri.port().unwrap_or(DEFAULT_PORT),
            user,
            password,
            path,
        })
    }
}

struct Reply {
    code: u16,
    text: String,
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Control {
    async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(ftp_error(0, "connection closed by server"));
        }
        let code = parse_code(&line)?;
        let mut text = line.trim_end().to_owned();
        // Multi-line replies look like `123-...` and end with `123 ...`.
        if line.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                line.clear();
                if self.reader.read_line(&mut line).await? == 0 {
                    return Err(ftp_error(code, "connection closed inside a multi-line reply"));
                }
                text.push('\n');
                text.push_str(line.trim_end());
                if line.starts_with(&terminator) {
                    break;
                }
            }
        }
        debug!(code, reply = %text, "ftp_reply");
        Ok(Reply { code, text })
    }

    async fn command(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        let shown = if command.starts_with("PASS ") {
            "PASS ****"
        } else {
            command
        };
        debug!(command = shown, "ftp_command");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        self.read_reply().await
    }

    async fn expect(&mut self, command: &str, accepted: &[u16]) -> Result<Reply, ProtocolError> {
        let reply = self.command(command).await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(ftp_error(reply.code, reply.text))
        }
    }
}

fn ftp_error(code: u16, message: impl Into<String>) -> ProtocolError {
    ProtocolError::Ftp {
        code,
        message: message.into(),
    }
}

fn parse_code(line: &str) -> Result<u16, ProtocolError> {
    line.get(..3)
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| ftp_error(0, format!("malformed reply '{}'", line.trim_end())))
}

/// Extracts the data address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
fn parse_pasv(reply: &Reply) -> Result<SocketAddr, ProtocolError> {
    let malformed = || ftp_error(reply.code, format!("malformed PASV reply '{}'", reply.text));
    let open = reply.text.find('(').ok_or_else(malformed)?;
    let close = reply.text[open..].find(')').ok_or_else(malformed)? + open;
    let numbers = reply.text[open + 1..close]
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;
    let [a, b, c, d, hi, lo] = numbers[..] else {
        return Err(malformed());
    };
    let port = u16::from(hi) << 8 | u16::from(lo);
    Ok(SocketAddr::from((Ipv4Addr::new(a, b, c, d), port)))
}

async fn upload(target: &FtpTarget, bytes: &[u8]) -> Result<(), ProtocolError> {
    let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    let (read, write) = stream.into_split();
    let mut control = Control {
        reader: BufReader::new(read),
        writer: write,
    };

    let greeting = control.read_reply().await?;
    if greeting.code != 220 {
        return Err(ftp_error(greeting.code, greeting.text));
    }

    let login = control
        .expect(&format!("USER {}", target.user), &[230, 331])
        .await?;
    if login.code == 331 {
        control
            .expect(&format!("PASS {}", target.password), &[230, 202])
            .await?;
    }
    control.expect("TYPE I", &[200]).await?;
    let pasv = control.expect("PASV", &[227]).await?;
    let data_addr = parse_pasv(&pasv)?;

    let mut data = TcpStream::connect(data_addr).await?;
    control
        .expect(&format!("STOR {}", target.path), &[125, 150])
        .await?;
    data.write_all(bytes).await?;
    data.shutdown().await?;
    drop(data);

    let done = control.read_reply().await?;
    if !matches!(done.code, 226 | 250) {
        return Err(ftp_error(done.code, done.text));
    }
    // The upload is complete; a failing QUIT does not change that.
    if let Err(e) = control.command("QUIT").await {
        debug!(error = %e, "ftp_quit_failed");
    }
    Ok(())
}
