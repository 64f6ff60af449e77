//! Name-indexed lookup of packagers and protocols.
//!
//! Registries are plain values built at startup and handed to the
//! [`crate::submission::Submitter`]; there is no global instance. A lookup
//! miss is an explicit error, since it means a plugin is missing or the
//! definitions contain a typo.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::TransportConfig;
use crate::contract::{Packager, Protocol};
use crate::error::SubmissionError;
use crate::packager::{JarPackager, ZipPackager, JAR_PACKAGER, ZIP_PACKAGER};
use crate::protocol::{FileProtocol, FtpProtocol, HttpsProtocol};

#[derive(Default, Clone)]
pub struct PackagerRegistry {
    packagers: HashMap<String, Arc<dyn Packager>>,
}

impl PackagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `packager` under `id`, replacing any previous entry.
    pub fn register(&mut self, id: impl Into<String>, packager: Arc<dyn Packager>) {
        let id = id.into();
        debug!(%id, "packager_registered");
        self.packagers.insert(id, packager);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Packager>, SubmissionError> {
        self.packagers
            .get(id)
            .cloned()
            .ok_or_else(|| SubmissionError::UnregisteredPackager(id.to_owned()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.packagers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.packagers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for PackagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagerRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Protocols keyed by URI scheme, compared case-insensitively.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: &str, protocol: Arc<dyn Protocol>) {
        let scheme = scheme.to_ascii_lowercase();
        debug!(%scheme, "protocol_registered");
        self.protocols.insert(scheme, protocol);
    }

    pub fn get(&self, scheme: &str) -> Result<Arc<dyn Protocol>, SubmissionError> {
        self.protocols
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SubmissionError::UnregisteredProtocol(scheme.to_owned()))
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.protocols.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.protocols.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Registries {
    pub packagers: PackagerRegistry,
    pub protocols: ProtocolRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference packagers and protocols. The zip and jar packagers are
    /// also reachable as `zip` and `jar`.
    pub fn with_defaults(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let mut registries = Self::new();

        let zip: Arc<dyn Packager> = Arc::new(ZipPackager::new());
        let jar: Arc<dyn Packager> = Arc::new(JarPackager::new());
        registries.packagers.register(ZIP_PACKAGER, zip.clone());
        registries.packagers.register("zip", zip);
        registries.packagers.register(JAR_PACKAGER, jar.clone());
        registries.packagers.register("jar", jar);

        registries
            .protocols
            .register("file", Arc::new(FileProtocol::new()));
        registries
            .protocols
            .register("ftp", Arc::new(FtpProtocol::new(config)));
        registries
            .protocols
            .register("https", Arc::new(HttpsProtocol::new(config)?));

        Ok(registries)
    }
}
