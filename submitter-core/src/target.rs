//! # target: the submission target tree
//!
//! A definitions document describes a tree of targets. The root holds
//! defaults for the whole document, groups organize assignments, assignments
//! are what a student actually submits to, and import groups stand in for a
//! subtree hosted in another document.
//!
//! ## Ownership
//! Nodes live in an arena owned by [`TargetTree`] and are addressed by
//! [`TargetId`]. Children are id lists; the parent link is a plain id.
//! Removing a child detaches it but leaves its slot in the arena.
//!
//! ## Inheritance
//! Every node carries *local* values. The *effective* value of a property
//! is derived by walking from a node to the root:
//! - transport and packager: the nearest node that sets one wins, and the
//!   params come from that same node;
//! - required files: every node's local list, concatenated leaf to root;
//! - include/exclude: see [`TargetTree::is_file_excluded`].
//!
//! The effective accessors are synchronous. An import group that has not
//! been loaded yet makes them fail with [`TargetError::NotLoaded`]; the
//! async entry points in [`crate::import`] load it first.
//!
//! ## Editing
//! Setters apply the change and then publish a [`TargetEvent`] on the tree's
//! [`ChangeBus`]. The tree is single-writer: `&mut self` on every setter
//! enforces that for a given instance.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::contract::DefinitionsFetcher;
use crate::error::TargetError;
use crate::events::{ChangeBus, ListenerId, PropertyValue, TargetEvent, TargetProperty};
use crate::file_pattern::FilePattern;

/// Identifier of the builtin zip packager, used when no node sets one.
pub const DEFAULT_PACKAGER: &str = "net.sf.webcat.eclipse.submitter.packagers.zip";

/// Transport parameter keys with this prefix are bound to the packaged
/// archive; the remainder of the key is the form field name.
pub const FILE_PARAM_PREFIX: &str = "$file.";

/// Ordered string to string mapping used for transport and packager params.
pub type Params = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What to do when a file matches both an include and an exclude pattern
/// declared on the same node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterAmbiguity {
    PreferInclude,
    #[default]
    PreferExclude,
}

#[derive(Debug, Clone)]
pub enum ImportState {
    Unloaded,
    Loaded,
    /// The last load attempt failed; the error is returned again on every
    /// access until the definitions are reopened.
    Failed(TargetError),
}

#[derive(Debug, Clone)]
pub struct ImportGroup {
    pub name: String,
    pub href: String,
    pub hidden: bool,
    /// URL of the document this import group was declared in.
    pub base: Option<Url>,
    pub state: ImportState,
}

impl ImportGroup {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
            hidden: false,
            base: None,
            state: ImportState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ImportState::Loaded)
    }

    /// `href` made absolute against the declaring document, when known.
    pub fn resolved_href(&self) -> Result<Url, TargetError> {
        let parsed = match &self.base {
            Some(base) => base.join(&self.href),
            None => Url::parse(&self.href),
        };
        parsed.map_err(|e| TargetError::InvalidHref {
            href: self.href.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum TargetKind {
    Root,
    Group { name: Option<String>, hidden: bool },
    Assignment { name: String, hidden: bool },
    ImportGroup(ImportGroup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetVariant {
    Root,
    Group,
    Assignment,
    ImportGroup,
}

impl TargetKind {
    pub fn group(name: Option<&str>) -> Self {
        TargetKind::Group {
            name: name.map(str::to_owned),
            hidden: false,
        }
    }

    pub fn assignment(name: impl Into<String>) -> Self {
        TargetKind::Assignment {
            name: name.into(),
            hidden: false,
        }
    }

    pub fn import_group(name: impl Into<String>, href: impl Into<String>) -> Self {
        TargetKind::ImportGroup(ImportGroup::new(name, href))
    }

    pub fn variant(&self) -> TargetVariant {
        match self {
            TargetKind::Root => TargetVariant::Root,
            TargetKind::Group { .. } => TargetVariant::Group,
            TargetKind::Assignment { .. } => TargetVariant::Assignment,
            TargetKind::ImportGroup(_) => TargetVariant::ImportGroup,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TargetKind::Root => None,
            TargetKind::Group { name, .. } => name.as_deref(),
            TargetKind::Assignment { name, .. } => Some(name),
            TargetKind::ImportGroup(import) => Some(&import.name),
        }
    }

    pub fn hidden(&self) -> bool {
        match self {
            TargetKind::Root => false,
            TargetKind::Group { hidden, .. } | TargetKind::Assignment { hidden, .. } => *hidden,
            TargetKind::ImportGroup(import) => import.hidden,
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, TargetKind::Assignment { .. })
    }

    /// Only assignments can be chosen as a submission destination.
    pub fn is_actionable(&self) -> bool {
        matches!(self, TargetKind::Assignment { .. })
    }

    /// Nested nodes show up as their own level in a selection UI; an
    /// unnamed group is flattened into its parent.
    pub fn is_nested(&self) -> bool {
        match self {
            TargetKind::Root => false,
            TargetKind::Group { name, .. } => name.is_some(),
            TargetKind::Assignment { .. } | TargetKind::ImportGroup(_) => true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            TargetKind::ImportGroup(import) => import.is_loaded(),
            _ => true,
        }
    }
}

/// One node of the tree with its local (non-inherited) values.
#[derive(Debug, Clone)]
pub struct TargetNode {
    kind: TargetKind,
    parent: Option<TargetId>,
    children: Vec<TargetId>,
    ambiguity: FilterAmbiguity,
    includes: Vec<FilePattern>,
    excludes: Vec<FilePattern>,
    required: Vec<FilePattern>,
    transport: Option<String>,
    transport_params: Params,
    packager: Option<String>,
    packager_params: Params,
}

impl TargetNode {
    fn new(kind: TargetKind, parent: Option<TargetId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            ambiguity: FilterAmbiguity::default(),
            includes: Vec::new(),
            excludes: Vec::new(),
            required: Vec::new(),
            transport: None,
            transport_params: Params::new(),
            packager: None,
            packager_params: Params::new(),
        }
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<TargetId> {
        self.parent
    }

    pub fn children(&self) -> &[TargetId] {
        &self.children
    }

    pub fn filter_ambiguity(&self) -> FilterAmbiguity {
        self.ambiguity
    }

    pub fn includes(&self) -> &[FilePattern] {
        &self.includes
    }

    pub fn excludes(&self) -> &[FilePattern] {
        &self.excludes
    }

    pub fn required(&self) -> &[FilePattern] {
        &self.required
    }

    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    pub fn transport_params(&self) -> &Params {
        &self.transport_params
    }

    pub fn packager(&self) -> Option<&str> {
        self.packager.as_deref()
    }

    pub fn packager_params(&self) -> &Params {
        &self.packager_params
    }

    pub fn name(&self) -> Option<&str> {
        self.kind.name()
    }
}

/// Serializable summary of a tree for display.
#[derive(Debug, Clone, Serialize)]
pub struct OutlineNode {
    pub id: TargetId,
    pub kind: TargetVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub hidden: bool,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

pub struct TargetTree {
    nodes: Vec<TargetNode>,
    root: TargetId,
    source: Option<Url>,
    pub(crate) fetcher: Option<Arc<dyn DefinitionsFetcher>>,
    bus: ChangeBus,
}

impl Default for TargetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TargetTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetTree")
            .field("nodes", &self.nodes)
            .field("root", &self.root)
            .field("source", &self.source)
            .field("has_fetcher", &self.fetcher.is_some())
            .field("bus", &self.bus)
            .finish()
    }
}

impl TargetTree {
    /// An empty tree consisting only of a root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![TargetNode::new(TargetKind::Root, None)],
            root: TargetId(0),
            source: None,
            fetcher: None,
            bus: ChangeBus::new(),
        }
    }

    /// Sets the fetcher used to load import groups on demand.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn DefinitionsFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn set_fetcher(&mut self, fetcher: Arc<dyn DefinitionsFetcher>) {
        self.fetcher = Some(fetcher);
    }

    /// URL of the document this tree was parsed from, if any.
    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    pub(crate) fn set_source(&mut self, source: Option<Url>) {
        self.source = source;
    }

    pub fn root(&self) -> TargetId {
        self.root
    }

    pub fn node(&self, id: TargetId) -> Result<&TargetNode, TargetError> {
        self.nodes.get(id.0).ok_or(TargetError::UnknownTarget(id.0))
    }

    fn node_mut(&mut self, id: TargetId) -> Result<&mut TargetNode, TargetError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(TargetError::UnknownTarget(id.0))
    }

    pub fn kind(&self, id: TargetId) -> Result<&TargetKind, TargetError> {
        Ok(&self.node(id)?.kind)
    }

    pub fn parent(&self, id: TargetId) -> Result<Option<TargetId>, TargetError> {
        Ok(self.node(id)?.parent)
    }

    /// Children as currently materialized. An unloaded import group reports
    /// none; use [`TargetTree::children`] to load it first.
    pub fn local_children(&self, id: TargetId) -> Result<&[TargetId], TargetError> {
        Ok(&self.node(id)?.children)
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: TargetId) -> Result<Vec<TargetId>, TargetError> {
        let mut out = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent)?.parent;
        }
        Ok(out)
    }

    /// `/`-joined names of the nested nodes from the root down to `id`.
    pub fn path(&self, id: TargetId) -> Result<String, TargetError> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.node(cur)?;
            if node.kind.is_nested() {
                if let Some(name) = node.kind.name() {
                    names.push(name.to_owned());
                }
            }
            current = node.parent;
        }
        names.reverse();
        Ok(names.join("/"))
    }

    pub fn outline(&self) -> Result<OutlineNode, TargetError> {
        self.outline_from(self.root)
    }

    fn outline_from(&self, id: TargetId) -> Result<OutlineNode, TargetError> {
        let node = self.node(id)?;
        let children = node
            .children
            .iter()
            .map(|child| self.outline_from(*child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OutlineNode {
            id,
            kind: node.kind.variant(),
            name: node.kind.name().map(str::to_owned),
            hidden: node.kind.hidden(),
            loaded: node.kind.is_loaded(),
            children,
        })
    }

    /// Depth-first ids reachable from the root, root first.
    pub fn descendants(&self, id: TargetId) -> Result<Vec<TargetId>, TargetError> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.node(cur)?.children.iter().rev().copied());
        }
        Ok(out)
    }

    // ---- effective (inherited) values ------------------------------------

    /// Fails if `id` is an import group whose content has not been loaded.
    fn loaded_node(&self, id: TargetId) -> Result<&TargetNode, TargetError> {
        let node = self.node(id)?;
        if let TargetKind::ImportGroup(import) = &node.kind {
            match &import.state {
                ImportState::Loaded => {}
                ImportState::Unloaded => {
                    return Err(TargetError::NotLoaded {
                        name: import.name.clone(),
                    })
                }
                ImportState::Failed(e) => return Err(e.clone()),
            }
        }
        Ok(node)
    }

    /// Every required pattern that applies to `id`: its own first, then each
    /// ancestor's, up to the root. Duplicates are kept.
    pub fn all_required(&self, id: TargetId) -> Result<Vec<String>, TargetError> {
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.loaded_node(cur)?;
            out.extend(node.required.iter().map(|p| p.as_str().to_owned()));
            current = node.parent;
        }
        Ok(out)
    }

    /// Nearest node, starting at `id`, that sets a transport.
    pub fn transport_source(&self, id: TargetId) -> Result<Option<TargetId>, TargetError> {
        self.nearest(id, |node| node.transport.is_some())
    }

    pub fn transport(&self, id: TargetId) -> Result<Option<String>, TargetError> {
        Ok(match self.transport_source(id)? {
            Some(source) => self.node(source)?.transport.clone(),
            None => None,
        })
    }

    /// Params declared alongside the effective transport.
    pub fn transport_params(&self, id: TargetId) -> Result<Params, TargetError> {
        Ok(match self.transport_source(id)? {
            Some(source) => self.node(source)?.transport_params.clone(),
            None => Params::new(),
        })
    }

    pub fn packager_source(&self, id: TargetId) -> Result<Option<TargetId>, TargetError> {
        self.nearest(id, |node| node.packager.is_some())
    }

    /// Effective packager identifier, [`DEFAULT_PACKAGER`] when none is set.
    pub fn packager(&self, id: TargetId) -> Result<String, TargetError> {
        Ok(match self.packager_source(id)? {
            Some(source) => self
                .node(source)?
                .packager
                .clone()
                .unwrap_or_else(|| DEFAULT_PACKAGER.to_owned()),
            None => DEFAULT_PACKAGER.to_owned(),
        })
    }

    pub fn packager_params(&self, id: TargetId) -> Result<Params, TargetError> {
        Ok(match self.packager_source(id)? {
            Some(source) => self.node(source)?.packager_params.clone(),
            None => Params::new(),
        })
    }

    fn nearest<F>(&self, id: TargetId, pred: F) -> Result<Option<TargetId>, TargetError>
    where
        F: Fn(&TargetNode) -> bool,
    {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.loaded_node(cur)?;
            if pred(node) {
                return Ok(Some(cur));
            }
            current = node.parent;
        }
        Ok(None)
    }

    /// Decides whether the project-relative `path` stays out of a submission
    /// to `id`.
    ///
    /// Starting at `id` and moving up, the first node with a local include or
    /// exclude match decides. If both match on the same node, that node's
    /// [`FilterAmbiguity`] decides. When no node matches at all the file is
    /// included, unless the topmost node (the root) declares at least one
    /// include pattern, in which case it is excluded.
    pub fn is_file_excluded(&self, id: TargetId, path: &str) -> Result<bool, TargetError> {
        let mut current = id;
        loop {
            let node = self.loaded_node(current)?;
            let excluded = node.excludes.iter().any(|p| p.matches(path));
            let included = node.includes.iter().any(|p| p.matches(path));
            match (excluded, included) {
                (true, true) => return Ok(node.ambiguity == FilterAmbiguity::PreferExclude),
                (true, false) => return Ok(true),
                (false, true) => return Ok(false),
                (false, false) => {}
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return Ok(!node.includes.is_empty()),
            }
        }
    }

    // ---- structure ---------------------------------------------------------

    /// Appends a new node under `parent` and returns its id.
    pub fn add_child(&mut self, parent: TargetId, kind: TargetKind) -> Result<TargetId, TargetError> {
        if matches!(kind, TargetKind::Root) {
            return Err(TargetError::Unsupported {
                target: parent.0,
                operation: "adding a root as a child",
            });
        }
        let parent_node = self.loaded_node(parent)?;
        if !parent_node.kind.is_container() {
            return Err(TargetError::Unsupported {
                target: parent.0,
                operation: "children",
            });
        }
        let old = parent_node.children.clone();

        let id = TargetId(self.nodes.len());
        self.nodes.push(TargetNode::new(kind, Some(parent)));
        self.node_mut(parent)?.children.push(id);
        let new = self.node(parent)?.children.clone();
        self.fire(
            parent,
            TargetProperty::Children,
            PropertyValue::Children(old),
            PropertyValue::Children(new),
        );
        Ok(id)
    }

    pub fn add_group(&mut self, parent: TargetId, name: Option<&str>) -> Result<TargetId, TargetError> {
        self.add_child(parent, TargetKind::group(name))
    }

    pub fn add_assignment(&mut self, parent: TargetId, name: &str) -> Result<TargetId, TargetError> {
        self.add_child(parent, TargetKind::assignment(name))
    }

    pub fn add_import_group(
        &mut self,
        parent: TargetId,
        name: &str,
        href: &str,
    ) -> Result<TargetId, TargetError> {
        self.add_child(parent, TargetKind::import_group(name, href))
    }

    /// Detaches `child` from `parent`. Returns false if it was not a child.
    pub fn remove_child(&mut self, parent: TargetId, child: TargetId) -> Result<bool, TargetError> {
        let old = self.node(parent)?.children.clone();
        let Some(pos) = old.iter().position(|c| *c == child) else {
            return Ok(false);
        };
        self.node_mut(parent)?.children.remove(pos);
        self.node_mut(child)?.parent = None;
        let new = self.node(parent)?.children.clone();
        self.fire(
            parent,
            TargetProperty::Children,
            PropertyValue::Children(old),
            PropertyValue::Children(new),
        );
        Ok(true)
    }

    /// Swaps in the content of `other`, keeping this tree's listeners and
    /// fetcher (unless `other` brings its own fetcher).
    pub fn replace_with(&mut self, other: TargetTree) {
        let TargetTree {
            nodes,
            root,
            source,
            fetcher,
            bus: _,
        } = other;
        self.nodes = nodes;
        self.root = root;
        self.source = source;
        if fetcher.is_some() {
            self.fetcher = fetcher;
        }
        self.bus.publish(&TargetEvent::TreeReplaced);
    }

    /// Copies the content of a separately parsed tree into the import group
    /// `id`: the imported root's fields become the group's own and its
    /// descendants are appended to this arena.
    pub(crate) fn splice_import(&mut self, id: TargetId, imported: TargetTree) -> Result<(), TargetError> {
        let offset = self.nodes.len();
        let imported_root = imported.root;
        // Every non-root imported node gets a fresh slot; the root maps onto `id`.
        let mut remap = Vec::with_capacity(imported.nodes.len());
        let mut next = offset;
        for index in 0..imported.nodes.len() {
            if index == imported_root.0 {
                remap.push(id);
            } else {
                remap.push(TargetId(next));
                next += 1;
            }
        }
        let map = |old: TargetId| remap[old.0];

        let mut root_node = None;
        for (index, mut node) in imported.nodes.into_iter().enumerate() {
            node.children = node.children.iter().map(|c| map(*c)).collect();
            if index == imported_root.0 {
                root_node = Some(node);
                continue;
            }
            node.parent = node.parent.map(map);
            self.nodes.push(node);
        }
        let Some(root_node) = root_node else {
            return Err(TargetError::UnknownTarget(imported_root.0));
        };

        let target = self.node_mut(id)?;
        let old_children = std::mem::replace(&mut target.children, root_node.children);
        target.ambiguity = root_node.ambiguity;
        target.includes = root_node.includes;
        target.excludes = root_node.excludes;
        target.required = root_node.required;
        target.transport = root_node.transport;
        target.transport_params = root_node.transport_params;
        target.packager = root_node.packager;
        target.packager_params = root_node.packager_params;
        let new_children = target.children.clone();
        if let TargetKind::ImportGroup(import) = &mut target.kind {
            import.state = ImportState::Loaded;
        }

        self.fire(
            id,
            TargetProperty::Children,
            PropertyValue::Children(old_children),
            PropertyValue::Children(new_children),
        );
        self.fire(
            id,
            TargetProperty::Loaded,
            PropertyValue::Bool(false),
            PropertyValue::Bool(true),
        );
        Ok(())
    }

    pub(crate) fn set_import_state(&mut self, id: TargetId, state: ImportState) -> Result<(), TargetError> {
        match &mut self.node_mut(id)?.kind {
            TargetKind::ImportGroup(import) => {
                import.state = state;
                Ok(())
            }
            _ => Err(TargetError::Unsupported {
                target: id.0,
                operation: "import loading",
            }),
        }
    }

    // ---- setters -----------------------------------------------------------

    pub fn set_name(&mut self, id: TargetId, name: Option<String>) -> Result<(), TargetError> {
        let old = {
            let kind = &mut self.node_mut(id)?.kind;
            match (kind, name.clone()) {
                (TargetKind::Group { name: slot, .. }, value) => std::mem::replace(slot, value),
                (TargetKind::Assignment { name: slot, .. }, Some(value)) => {
                    Some(std::mem::replace(slot, value))
                }
                (TargetKind::ImportGroup(import), Some(value)) => {
                    Some(std::mem::replace(&mut import.name, value))
                }
                _ => {
                    return Err(TargetError::Unsupported {
                        target: id.0,
                        operation: "this name change",
                    })
                }
            }
        };
        self.fire(id, TargetProperty::Name, old.into(), name.into());
        Ok(())
    }

    pub fn set_hidden(&mut self, id: TargetId, hidden: bool) -> Result<(), TargetError> {
        let old = match &mut self.node_mut(id)?.kind {
            TargetKind::Group { hidden: slot, .. } | TargetKind::Assignment { hidden: slot, .. } => {
                std::mem::replace(slot, hidden)
            }
            TargetKind::ImportGroup(import) => std::mem::replace(&mut import.hidden, hidden),
            TargetKind::Root => {
                return Err(TargetError::Unsupported {
                    target: id.0,
                    operation: "hidden",
                })
            }
        };
        self.fire(
            id,
            TargetProperty::Hidden,
            PropertyValue::Bool(old),
            PropertyValue::Bool(hidden),
        );
        Ok(())
    }

    pub fn set_href(&mut self, id: TargetId, href: impl Into<String>) -> Result<(), TargetError> {
        let href = href.into();
        let old = match &mut self.node_mut(id)?.kind {
            TargetKind::ImportGroup(import) => std::mem::replace(&mut import.href, href.clone()),
            _ => {
                return Err(TargetError::Unsupported {
                    target: id.0,
                    operation: "href",
                })
            }
        };
        self.fire(
            id,
            TargetProperty::Href,
            PropertyValue::Text(old),
            PropertyValue::Text(href),
        );
        Ok(())
    }

    pub fn set_filter_ambiguity(&mut self, id: TargetId, value: FilterAmbiguity) -> Result<(), TargetError> {
        let old = std::mem::replace(&mut self.node_mut(id)?.ambiguity, value);
        self.fire(
            id,
            TargetProperty::FilterAmbiguity,
            PropertyValue::Ambiguity(old),
            PropertyValue::Ambiguity(value),
        );
        Ok(())
    }

    pub fn set_includes<I, S>(&mut self, id: TargetId, patterns: I) -> Result<(), TargetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_patterns(id, TargetProperty::Includes, patterns)
    }

    pub fn set_excludes<I, S>(&mut self, id: TargetId, patterns: I) -> Result<(), TargetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_patterns(id, TargetProperty::Excludes, patterns)
    }

    pub fn set_required<I, S>(&mut self, id: TargetId, patterns: I) -> Result<(), TargetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_patterns(id, TargetProperty::Required, patterns)
    }

    fn set_patterns<I, S>(
        &mut self,
        id: TargetId,
        property: TargetProperty,
        patterns: I,
    ) -> Result<(), TargetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let compiled: Vec<FilePattern> = patterns.into_iter().map(|p| FilePattern::new(p)).collect();
        let new = pattern_strings(&compiled);
        let node = self.node_mut(id)?;
        let slot = match property {
            TargetProperty::Includes => &mut node.includes,
            TargetProperty::Excludes => &mut node.excludes,
            _ => &mut node.required,
        };
        let old = pattern_strings(&std::mem::replace(slot, compiled));
        self.fire(
            id,
            property,
            PropertyValue::Patterns(old),
            PropertyValue::Patterns(new),
        );
        Ok(())
    }

    pub fn set_transport(&mut self, id: TargetId, uri: Option<String>) -> Result<(), TargetError> {
        let old = std::mem::replace(&mut self.node_mut(id)?.transport, uri.clone());
        self.fire(id, TargetProperty::Transport, old.into(), uri.into());
        Ok(())
    }

    pub fn set_transport_params(&mut self, id: TargetId, params: Params) -> Result<(), TargetError> {
        let old = std::mem::replace(&mut self.node_mut(id)?.transport_params, params.clone());
        self.fire(
            id,
            TargetProperty::TransportParams,
            PropertyValue::Params(old),
            PropertyValue::Params(params),
        );
        Ok(())
    }

    pub fn set_packager(&mut self, id: TargetId, packager: Option<String>) -> Result<(), TargetError> {
        let old = std::mem::replace(&mut self.node_mut(id)?.packager, packager.clone());
        self.fire(id, TargetProperty::Packager, old.into(), packager.into());
        Ok(())
    }

    pub fn set_packager_params(&mut self, id: TargetId, params: Params) -> Result<(), TargetError> {
        let old = std::mem::replace(&mut self.node_mut(id)?.packager_params, params.clone());
        self.fire(
            id,
            TargetProperty::PackagerParams,
            PropertyValue::Params(old),
            PropertyValue::Params(params),
        );
        Ok(())
    }

    // ---- change notification ----------------------------------------------

    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&TargetEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn fire(&self, target: TargetId, property: TargetProperty, old: PropertyValue, new: PropertyValue) {
        if self.bus.is_empty() {
            return;
        }
        self.bus.publish(&TargetEvent::Changed {
            target,
            property,
            old,
            new,
        });
    }
}

fn pattern_strings(patterns: &[FilePattern]) -> Vec<String> {
    patterns.iter().map(|p| p.as_str().to_owned()).collect()
}

/// Builds a [`Params`] map from `(name, value)` pairs, keeping their order.
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
