//! Submission orchestration: verify, resolve, package, transmit, report.
//!
//! [`Submitter`] owns the target tree, the registries and the listeners. A
//! call to [`Submitter::submit`] runs one attempt through these states:
//!
//! ```text
//! Idle -> VerifyingRequiredFiles -> ResolvingTransport -> PackagingAndTransmitting -> Completed
//!                  |                        |                        |
//!                  +------------------------+------------------------+--> Failed / Canceled
//! ```
//!
//! # Listener notification
//! Required files are checked before anything observable happens, so a
//! missing file is reported to the caller only. From then on listeners hear
//! `on_started` followed by exactly one of `on_succeeded`, `on_failed` or
//! `on_canceled`. A panicking listener is logged and skipped.
//!
//! # Cancellation
//! The token is checked before transport resolution, before packaging and
//! raced against the transfer itself. A canceled attempt returns
//! [`SubmissionOutcome::Canceled`]; it is not an error. Nothing is rolled
//! back: a protocol may have left a partial archive at the destination.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

use crate::contract::{
    ArchiveSource, DefinitionsFetcher, PackRequest, SubmissionListener, Transmission,
};
use crate::definitions::parse_definitions;
use crate::error::{PackageError, ProtocolError, SubmissionError, TargetError};
use crate::file_pattern::FilePattern;
use crate::import::LoadOutcome;
use crate::manifest::SubmissionManifest;
use crate::registry::Registries;
use crate::target::TargetTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionState {
    Idle,
    VerifyingRequiredFiles,
    ResolvingTransport,
    PackagingAndTransmitting,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed { response: Option<String> },
    Canceled,
}

impl SubmissionOutcome {
    pub const CANCELED_NOTICE: &'static str = "The submission was canceled. Part of it may already have been recorded at the destination; check before submitting again.";

    pub fn is_canceled(&self) -> bool {
        matches!(self, SubmissionOutcome::Canceled)
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            SubmissionOutcome::Completed { response } => response.as_deref(),
            SubmissionOutcome::Canceled => None,
        }
    }
}

pub struct Submitter {
    registries: Arc<Registries>,
    fetcher: Arc<dyn DefinitionsFetcher>,
    tree: TargetTree,
    listeners: Vec<Arc<dyn SubmissionListener>>,
    progress: Option<UnboundedSender<SubmissionState>>,
    state: SubmissionState,
    response: Option<String>,
}

impl Submitter {
    pub fn new(registries: Arc<Registries>, fetcher: Arc<dyn DefinitionsFetcher>) -> Self {
        let tree = TargetTree::new().with_fetcher(fetcher.clone());
        Self {
            registries,
            fetcher,
            tree,
            listeners: Vec::new(),
            progress: None,
            state: SubmissionState::Idle,
            response: None,
        }
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn tree(&self) -> &TargetTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TargetTree {
        &mut self.tree
    }

    // ---- definitions -------------------------------------------------------

    /// Fetches and parses the definitions at `url`, replacing the current
    /// tree. On failure the current tree is left untouched.
    pub async fn open_definitions(&mut self, url: &Url) -> Result<(), TargetError> {
        info!(%url, "opening submission definitions");
        let text = self.fetcher.fetch(url).await?;
        let tree = parse_definitions(&text, Some(url))?;
        self.install(tree);
        Ok(())
    }

    /// Parses definitions held in memory. `source` is used to resolve
    /// relative import hrefs.
    pub fn open_definitions_str(&mut self, xml: &str, source: Option<&Url>) -> Result<(), TargetError> {
        let tree = parse_definitions(xml, source)?;
        self.install(tree);
        Ok(())
    }

    /// Opens `url` and resolves every import group as one cancellable unit.
    pub async fn load_definitions(
        &mut self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome, TargetError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(LoadOutcome::Canceled),
            opened = self.open_definitions(url) => opened?,
        }
        self.tree.load_all(cancel).await
    }

    fn install(&mut self, mut tree: TargetTree) {
        tree.set_fetcher(self.fetcher.clone());
        self.tree.replace_with(tree);
        info!(
            source = self.tree.source().map(Url::as_str).unwrap_or("<memory>"),
            "submission_definitions_opened"
        );
    }

    // ---- listeners and progress ---------------------------------------------

    /// Adds `listener` unless this exact instance is already registered.
    pub fn add_listener(&mut self, listener: Arc<dyn SubmissionListener>) -> bool {
        if self.listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn SubmissionListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !same_listener(l, listener));
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Every later state transition is also sent to `sender`.
    pub fn report_progress(&mut self, sender: UnboundedSender<SubmissionState>) {
        self.progress = Some(sender);
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Response of the last completed submission, if its protocol gave one.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    fn set_state(&mut self, state: SubmissionState) {
        debug!(?state, "submission_state");
        self.state = state;
        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is watching.
            let _ = progress.send(state);
        }
    }

    fn notify<F>(&self, event: &'static str, call: F)
    where
        F: Fn(&dyn SubmissionListener),
    {
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| call(listener.as_ref())));
            if outcome.is_err() {
                warn!(event, "submission listener panicked");
            }
        }
    }

    // ---- submission ----------------------------------------------------------

    /// Required patterns (as written) that match no file of the project.
    pub fn verify_required_files(&self, manifest: &SubmissionManifest) -> Result<Vec<String>, SubmissionError> {
        let required = self.tree.all_required(manifest.assignment)?;
        let mut found: IndexMap<String, (FilePattern, bool)> = required
            .into_iter()
            .map(|p| (p.clone(), (FilePattern::new(p), false)))
            .collect();

        let files = manifest
            .project
            .files()
            .map_err(|e| SubmissionError::Packaging(PackageError::Io(e)))?;
        for file in &files {
            for (pattern, matched) in found.values_mut() {
                if !*matched && pattern.matches(&file.path) {
                    *matched = true;
                }
            }
        }

        let missing: Vec<String> = found
            .into_iter()
            .filter(|(_, (_, matched))| !matched)
            .map(|(pattern, _)| pattern)
            .collect();
        debug!(files = files.len(), missing = missing.len(), "required_files_verified");
        Ok(missing)
    }

    pub async fn submit(
        &mut self,
        manifest: &SubmissionManifest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let span = info_span!(
            "submission",
            id = %manifest.id,
            assignment = tracing::field::Empty
        );
        self.run(manifest, cancel).instrument(span).await
    }

    async fn run(
        &mut self,
        manifest: &SubmissionManifest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        self.response = None;
        self.set_state(SubmissionState::VerifyingRequiredFiles);

        let assignment = match manifest.assignment_name(&self.tree) {
            Ok(name) => name,
            Err(e) => return Err(self.fail_quietly(e)),
        };
        tracing::Span::current().record("assignment", assignment.as_str());
        info!(project = %manifest.project.describe(), user = %manifest.username, "submission_started");

        let missing = match self.verify_required_files(manifest) {
            Ok(missing) => missing,
            Err(e) => return Err(self.fail_quietly(e)),
        };
        if !missing.is_empty() {
            warn!(?missing, "required_files_missing");
            return Err(self.fail_quietly(SubmissionError::RequiredFilesMissing(missing)));
        }
        if cancel.is_cancelled() {
            info!("submission_canceled_before_start");
            self.set_state(SubmissionState::Canceled);
            return Ok(SubmissionOutcome::Canceled);
        }

        self.notify("started", |l| l.on_started(manifest));

        match self.deliver(manifest, cancel).await {
            Ok(Some(response)) => {
                info!(has_response = response.is_some(), "submission_completed");
                self.response = response.clone();
                self.set_state(SubmissionState::Completed);
                self.notify("succeeded", |l| l.on_succeeded(manifest, response.as_deref()));
                Ok(SubmissionOutcome::Completed { response })
            }
            Ok(None) => {
                info!("submission_canceled");
                self.set_state(SubmissionState::Canceled);
                self.notify("canceled", |l| l.on_canceled(manifest));
                Ok(SubmissionOutcome::Canceled)
            }
            Err(e) => {
                error!(error = %e, "submission_failed");
                self.set_state(SubmissionState::Failed);
                self.notify("failed", |l| l.on_failed(manifest, &e));
                Err(e)
            }
        }
    }

    /// Failure before listeners were told about the attempt.
    fn fail_quietly(&mut self, error: SubmissionError) -> SubmissionError {
        error!(error = %error, "submission_rejected");
        self.set_state(SubmissionState::Failed);
        error
    }

    /// Resolves, packages and transmits. `Ok(None)` means canceled.
    async fn deliver(
        &mut self,
        manifest: &SubmissionManifest,
        cancel: &CancellationToken,
    ) -> Result<Option<Option<String>>, SubmissionError> {
        self.set_state(SubmissionState::ResolvingTransport);
        let target = manifest.assignment;
        let resolver = manifest.resolver(&self.tree)?;

        let template = self
            .tree
            .transport(target)?
            .ok_or_else(|| SubmissionError::MalformedTransport {
                transport: String::new(),
                reason: "no transport is configured for this assignment".to_owned(),
            })?;
        let uri = Url::parse(&resolver.resolve(&template)).map_err(|e| {
            // Report the template so resolved credentials stay out of messages.
            SubmissionError::MalformedTransport {
                transport: template.clone(),
                reason: e.to_string(),
            }
        })?;
        let scheme = uri.scheme().to_owned();
        let protocol = self.registries.protocols.get(&scheme)?;
        let packager_id = self.tree.packager(target)?;
        let packager = self.registries.packagers.get(&packager_id)?;
        let params = resolver.resolve_params(&self.tree.transport_params(target)?);
        info!(%scheme, host = uri.host_str().unwrap_or(""), packager = %packager_id, "transport_resolved");

        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.set_state(SubmissionState::PackagingAndTransmitting);

        let archive = ArchiveSource {
            packager: packager.as_ref(),
            request: PackRequest {
                tree: &self.tree,
                target,
                project: manifest.project.as_ref(),
                resolver: &resolver,
            },
        };
        let transmission = Transmission {
            uri: &uri,
            params: &params,
            manifest,
            archive: &archive,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            result = protocol.submit(transmission) => match result {
                Ok(response) => Ok(Some(response)),
                Err(source) => Err(categorize(scheme, source)),
            },
        }
    }
}

fn categorize(scheme: String, error: ProtocolError) -> SubmissionError {
    match error {
        ProtocolError::Packaging(e) => SubmissionError::Packaging(e),
        ProtocolError::Target(e) => SubmissionError::Target(e),
        source => SubmissionError::Transport { scheme, source },
    }
}

fn same_listener(a: &Arc<dyn SubmissionListener>, b: &Arc<dyn SubmissionListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
