//! Lazy loading of import groups.
//!
//! An import group is parsed with only its name, href and hidden flag. The
//! first time its content is needed the referenced document is fetched,
//! parsed on its own, and spliced into the group: the imported root's
//! patterns, transport, packager and children become the group's own. This
//! happens at most once per tree instance; a failure is remembered and
//! returned again on later accesses.
//!
//! Loading needs `&mut TargetTree`, so a given tree can never run two
//! loads of the same group at once.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use crate::config::TransportConfig;
use crate::contract::DefinitionsFetcher;
use crate::definitions::parse_definitions;
use crate::error::TargetError;
use crate::target::{ImportGroup, ImportState, TargetId, TargetKind, TargetTree};

/// Fetches definitions over `http`/`https` and from `file` URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.http_client()?,
        })
    }
}

fn fetch_error(url: &Url, message: impl ToString) -> TargetError {
    TargetError::Fetch {
        href: url.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl DefinitionsFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, TargetError> {
        debug!(%url, "fetching submission definitions");
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| fetch_error(url, "not a local file path"))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| fetch_error(url, e))
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| fetch_error(url, e))?;
                response.text().await.map_err(|e| fetch_error(url, e))
            }
            other => Err(fetch_error(url, format!("unsupported scheme '{other}'"))),
        }
    }
}

/// Result of resolving every import group in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// All import groups are loaded; `fetched` of them were fetched now.
    Complete { fetched: usize },
    Canceled,
}

impl TargetTree {
    /// Makes sure `id` has its content. A no-op for anything but an import
    /// group that has not been loaded yet.
    pub async fn load(&mut self, id: TargetId) -> Result<(), TargetError> {
        let import = match self.kind(id)? {
            TargetKind::ImportGroup(import) => import.clone(),
            _ => return Ok(()),
        };
        match &import.state {
            ImportState::Loaded => return Ok(()),
            ImportState::Failed(e) => return Err(e.clone()),
            ImportState::Unloaded => {}
        }

        match self.fetch_import(&import).await {
            Ok(imported) => {
                self.splice_import(id, imported)?;
                info!(name = %import.name, href = %import.href, "import_group_loaded");
                Ok(())
            }
            Err(e) => {
                error!(name = %import.name, href = %import.href, error = %e, "import_group_failed");
                self.set_import_state(id, ImportState::Failed(e.clone()))?;
                Err(e)
            }
        }
    }

    async fn fetch_import(&self, import: &ImportGroup) -> Result<TargetTree, TargetError> {
        let url = import.resolved_href()?;
        let Some(fetcher) = self.fetcher.clone() else {
            return Err(fetch_error(&url, "no definitions fetcher is configured"));
        };
        let text = fetcher.fetch(&url).await?;
        Ok(parse_definitions(&text, Some(&url))?)
    }

    /// Children of `id`, loading it first if it is an import group.
    pub async fn children(&mut self, id: TargetId) -> Result<Vec<TargetId>, TargetError> {
        self.load(id).await?;
        Ok(self.local_children(id)?.to_vec())
    }

    /// Loads every import group reachable from the root, including groups
    /// that only appear inside imported documents.
    pub async fn load_all(&mut self, cancel: &CancellationToken) -> Result<LoadOutcome, TargetError> {
        let mut fetched = 0;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if cancel.is_cancelled() {
                info!(fetched, "load_all_canceled");
                return Ok(LoadOutcome::Canceled);
            }
            if !self.kind(id)?.is_loaded() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(fetched, "load_all_canceled");
                        return Ok(LoadOutcome::Canceled);
                    }
                    result = self.load(id) => {
                        result?;
                        fetched += 1;
                    }
                }
            }
            stack.extend(self.local_children(id)?.iter().rev().copied());
        }
        Ok(LoadOutcome::Complete { fetched })
    }

    /// Looks up a target by its `/`-separated name path.
    ///
    /// Unnamed groups do not contribute a path segment; their children are
    /// addressed as if they belonged to the enclosing node. Import groups
    /// along the way are loaded on demand.
    pub async fn find(&mut self, path: &str) -> Result<Option<TargetId>, TargetError> {
        let mut frontier = vec![self.root()];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut next = Vec::new();
            for container in frontier {
                self.named_children(container, segment, &mut next).await?;
            }
            if next.is_empty() {
                return Ok(None);
            }
            frontier = next;
        }
        Ok(frontier.first().copied())
    }

    /// Like [`TargetTree::find`] but only returns assignments.
    pub async fn find_assignment(&mut self, path: &str) -> Result<Option<TargetId>, TargetError> {
        Ok(match self.find(path).await? {
            Some(id) if self.kind(id)?.is_actionable() => Some(id),
            _ => None,
        })
    }

    async fn named_children(
        &mut self,
        container: TargetId,
        segment: &str,
        out: &mut Vec<TargetId>,
    ) -> Result<(), TargetError> {
        // Depth-first in child order, so matches come out in document order.
        let mut stack = vec![self.children(container).await?.into_iter()];
        loop {
            let Some(siblings) = stack.last_mut() else {
                break;
            };
            let Some(child) = siblings.next() else {
                stack.pop();
                continue;
            };
            let kind = self.kind(child)?;
            if kind.is_nested() {
                if kind.name() == Some(segment) {
                    out.push(child);
                }
            } else if kind.is_container() {
                stack.push(self.children(child).await?.into_iter());
            }
        }
        Ok(())
    }
}
