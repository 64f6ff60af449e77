//! Reading and writing the submission definitions XML format.
//!
//! ```xml
//! <submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
//!    <include pattern="*.java"/>
//!    <transport uri="https://example.edu/submit">
//!       <param name="user" value="${user}"/>
//!       <file-param name="file1" value="${assignment.name}.zip"/>
//!    </transport>
//!    <assignment-group name="CS 1114">
//!       <assignment name="Project 1">
//!          <required pattern="src/Main.java"/>
//!       </assignment>
//!       <import-group name="Labs" href="labs.xml"/>
//!    </assignment-group>
//! </submission-targets>
//! ```
//!
//! Parsing first builds a small element tree, then walks it against the
//! vocabulary above. Schema problems are collected rather than returned one
//! at a time; if any were found the whole parse fails with the full list.
//! Elements outside the vocabulary (or outside the namespace) are ignored.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ParseError, ParseErrors, TargetError};
use crate::target::{
    FilterAmbiguity, Params, TargetId, TargetKind, TargetTree, DEFAULT_PACKAGER, FILE_PARAM_PREFIX,
};

pub const NAMESPACE: &str = "http://web-cat.cs.vt.edu/submissionTargets";

const INDENT: &str = "   ";

#[derive(Debug)]
struct Element {
    name: String,
    in_namespace: bool,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    line: usize,
    column: usize,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column, message)
    }
}

/// 1-based line and column of byte `offset` in `input`.
fn position(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    // Skip the whitespace trimmed in front of a tag so the column points at `<`.
    let offset = offset
        + input[offset..]
            .bytes()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
    let before = &input.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
    (line, column)
}

fn in_namespace(ns: &ResolveResult<'_>) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == NAMESPACE.as_bytes(),
        _ => false,
    }
}

fn read_element(
    input: &str,
    offset: usize,
    in_namespace: bool,
    start: &BytesStart<'_>,
) -> Result<Element, ParseError> {
    let (line, column) = position(input, offset);
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::new(line, column, e.to_string()))?;
        let key = attr.key.as_ref();
        // Namespace declarations are handled by the reader.
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::new(line, column, e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        in_namespace,
        attrs,
        children: Vec::new(),
        line,
        column,
    })
}

/// Well-formedness pass: builds the element tree or reports the first
/// syntax error, which ends the parse.
fn read_document(input: &str) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        let offset = reader.buffer_position() as usize;
        let (ours, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (in_namespace(&ns), event),
            Err(e) => {
                let (line, column) = position(input, reader.error_position() as usize);
                return Err(ParseError::new(line, column, e.to_string()));
            }
        };
        match event {
            Event::Start(start) => {
                let element = read_element(input, offset, ours, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = read_element(input, offset, ours, &start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    let (line, column) = position(input, offset);
                    return Err(ParseError::new(line, column, "unexpected closing tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(open.error(format!("element '{}' is never closed", open.name)));
    }
    root.ok_or_else(|| {
        let (line, column) = position(input, input.len());
        ParseError::new(line, column, "document has no root element")
    })
}

/// Parses a definitions document into a fresh tree.
///
/// `source` is the URL the document was read from; relative import hrefs
/// are resolved against it.
pub fn parse_definitions(input: &str, source: Option<&Url>) -> Result<TargetTree, ParseErrors> {
    let document = read_document(input).map_err(|e| ParseErrors(vec![e]))?;

    let mut errors = Vec::new();
    let mut tree = TargetTree::new();
    tree.set_source(source.cloned());

    if document.name != "submission-targets" || !document.in_namespace {
        errors.push(document.error(format!(
            "root element must be 'submission-targets' in namespace '{NAMESPACE}', found '{}'",
            document.name
        )));
    } else {
        let root = tree.root();
        let mut builder = Builder {
            tree: &mut tree,
            errors: &mut errors,
            source,
        };
        builder.container(root, &document, ContainerRules::ROOT);
    }

    if errors.is_empty() {
        debug!(nodes = tree.descendants(tree.root()).map_or(0, |d| d.len()), "definitions_parsed");
        Ok(tree)
    } else {
        warn!(errors = errors.len(), "definitions_parse_failed");
        Err(ParseErrors(errors))
    }
}

#[derive(Clone, Copy)]
struct ContainerRules {
    kind: &'static str,
    children_allowed: bool,
    properties_allowed: bool,
}

impl ContainerRules {
    const ROOT: Self = Self {
        kind: "submission-targets",
        children_allowed: true,
        properties_allowed: true,
    };
    const GROUP: Self = Self {
        kind: "assignment-group",
        children_allowed: true,
        properties_allowed: true,
    };
    const ASSIGNMENT: Self = Self {
        kind: "assignment",
        children_allowed: false,
        properties_allowed: true,
    };
    const IMPORT: Self = Self {
        kind: "import-group",
        children_allowed: false,
        properties_allowed: false,
    };
}

struct Builder<'a> {
    tree: &'a mut TargetTree,
    errors: &'a mut Vec<ParseError>,
    source: Option<&'a Url>,
}

impl Builder<'_> {
    fn fail(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    fn record(&mut self, element: &Element, result: Result<(), TargetError>) {
        if let Err(e) = result {
            self.fail(element.error(e.to_string()));
        }
    }

    fn required_attr<'e>(&mut self, element: &'e Element, name: &str) -> Option<&'e str> {
        let value = element.attr(name);
        if value.is_none() {
            self.fail(element.error(format!(
                "element '{}' requires attribute '{name}'",
                element.name
            )));
        }
        value
    }

    fn hidden_attr(&mut self, element: &Element) -> bool {
        match element.attr("hidden") {
            None => false,
            Some(value) => match value.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    self.fail(element.error(format!(
                        "attribute 'hidden' must be 'true' or 'false', found '{other}'"
                    )));
                    false
                }
            },
        }
    }

    fn container(&mut self, id: TargetId, element: &Element, rules: ContainerRules) {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        let mut required = Vec::new();
        let mut seen_transport = false;
        let mut seen_packager = false;

        for child in &element.children {
            if !child.in_namespace {
                debug!(element = %child.name, "ignoring foreign element");
                continue;
            }
            let name = child.name.as_str();
            let is_property = matches!(
                name,
                "include" | "exclude" | "required" | "filter-ambiguity" | "transport" | "packager"
            );
            let is_target = matches!(name, "assignment-group" | "assignment" | "import-group");
            if (is_property && !rules.properties_allowed) || (is_target && !rules.children_allowed) {
                self.fail(child.error(format!(
                    "element '{name}' is not allowed inside '{}'",
                    rules.kind
                )));
                continue;
            }

            match name {
                "include" | "exclude" | "required" => {
                    if let Some(pattern) = self.required_attr(child, "pattern") {
                        let list = match name {
                            "include" => &mut includes,
                            "exclude" => &mut excludes,
                            _ => &mut required,
                        };
                        list.push(pattern.to_owned());
                    }
                }
                "filter-ambiguity" => {
                    let value = match self.required_attr(child, "choice") {
                        Some("include") => Some(FilterAmbiguity::PreferInclude),
                        Some("exclude") => Some(FilterAmbiguity::PreferExclude),
                        Some(other) => {
                            self.fail(child.error(format!(
                                "attribute 'choice' must be 'include' or 'exclude', found '{other}'"
                            )));
                            None
                        }
                        None => None,
                    };
                    if let Some(value) = value {
                        let result = self.tree.set_filter_ambiguity(id, value);
                        self.record(child, result);
                    }
                }
                "transport" => {
                    if seen_transport {
                        self.fail(child.error("only one 'transport' element is allowed here"));
                        continue;
                    }
                    seen_transport = true;
                    self.transport(id, child);
                }
                "packager" => {
                    if seen_packager {
                        self.fail(child.error("only one 'packager' element is allowed here"));
                        continue;
                    }
                    seen_packager = true;
                    self.packager(id, child);
                }
                "assignment-group" => {
                    let hidden = self.hidden_attr(child);
                    let kind = TargetKind::Group {
                        name: child.attr("name").map(str::to_owned),
                        hidden,
                    };
                    if let Some(group) = self.add(id, child, kind) {
                        self.container(group, child, ContainerRules::GROUP);
                    }
                }
                "assignment" => {
                    let name = self.required_attr(child, "name");
                    let hidden = self.hidden_attr(child);
                    let kind = TargetKind::Assignment {
                        name: name.unwrap_or_default().to_owned(),
                        hidden,
                    };
                    if let Some(assignment) = self.add(id, child, kind) {
                        self.container(assignment, child, ContainerRules::ASSIGNMENT);
                    }
                }
                "import-group" => {
                    let name = self.required_attr(child, "name");
                    let href = self.required_attr(child, "href");
                    let hidden = self.hidden_attr(child);
                    let mut kind = TargetKind::import_group(
                        name.unwrap_or_default(),
                        href.unwrap_or_default(),
                    );
                    if let TargetKind::ImportGroup(import) = &mut kind {
                        import.hidden = hidden;
                        import.base = self.source.cloned();
                    }
                    if let Some(import) = self.add(id, child, kind) {
                        self.container(import, child, ContainerRules::IMPORT);
                    }
                }
                other => debug!(element = %other, "ignoring unknown element"),
            }
        }

        let result = self
            .tree
            .set_includes(id, includes)
            .and_then(|_| self.tree.set_excludes(id, excludes))
            .and_then(|_| self.tree.set_required(id, required));
        self.record(element, result);
    }

    fn add(&mut self, parent: TargetId, element: &Element, kind: TargetKind) -> Option<TargetId> {
        match self.tree.add_child(parent, kind) {
            Ok(id) => Some(id),
            Err(e) => {
                self.fail(element.error(e.to_string()));
                None
            }
        }
    }

    fn params(&mut self, element: &Element, allow_file_params: bool) -> Params {
        let mut params = Params::new();
        for child in element.children.iter().filter(|c| c.in_namespace) {
            let prefix = match child.name.as_str() {
                "param" => "",
                "file-param" if allow_file_params => FILE_PARAM_PREFIX,
                "file-param" => {
                    self.fail(child.error(format!(
                        "element 'file-param' is not allowed inside '{}'",
                        element.name
                    )));
                    continue;
                }
                other => {
                    debug!(element = %other, "ignoring unknown element");
                    continue;
                }
            };
            let name = self.required_attr(child, "name");
            let value = self.required_attr(child, "value");
            if let (Some(name), Some(value)) = (name, value) {
                params.insert(format!("{prefix}{name}"), value.to_owned());
            }
        }
        params
    }

    fn transport(&mut self, id: TargetId, element: &Element) {
        let uri = self.required_attr(element, "uri").map(str::to_owned);
        let params = self.params(element, true);
        let result = self
            .tree
            .set_transport(id, uri)
            .and_then(|_| self.tree.set_transport_params(id, params));
        self.record(element, result);
    }

    fn packager(&mut self, id: TargetId, element: &Element) {
        let packager = self.required_attr(element, "id").map(str::to_owned);
        let params = self.params(element, false);
        let result = self
            .tree
            .set_packager(id, packager)
            .and_then(|_| self.tree.set_packager_params(id, params));
        self.record(element, result);
    }
}

// ---- serialization ---------------------------------------------------------

/// Serializes `tree` to the definitions format.
///
/// Import groups are written as references only; content fetched into them
/// is never inlined.
pub fn write_definitions(tree: &TargetTree) -> Result<String, TargetError> {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<submission-targets xmlns=\"{NAMESPACE}\">\n"));
    write_properties(tree, tree.root(), 1, &mut out)?;
    write_children(tree, tree.root(), 1, &mut out)?;
    out.push_str("</submission-targets>\n");
    Ok(out)
}

fn pad(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn has_properties(tree: &TargetTree, id: TargetId) -> Result<bool, TargetError> {
    let node = tree.node(id)?;
    Ok(node.filter_ambiguity() == FilterAmbiguity::PreferInclude
        || !node.includes().is_empty()
        || !node.excludes().is_empty()
        || !node.required().is_empty()
        || writes_packager(node.packager(), node.packager_params())
        || node.transport().is_some())
}

fn writes_packager(packager: Option<&str>, params: &Params) -> bool {
    match packager {
        None => false,
        Some(id) => id != DEFAULT_PACKAGER || !params.is_empty(),
    }
}

fn write_properties(tree: &TargetTree, id: TargetId, level: usize, out: &mut String) -> Result<(), TargetError> {
    let node = tree.node(id)?;

    if node.filter_ambiguity() == FilterAmbiguity::PreferInclude {
        pad(level, out);
        out.push_str("<filter-ambiguity choice=\"include\"/>\n");
    }

    let patterns = [
        ("include", node.includes()),
        ("exclude", node.excludes()),
        ("required", node.required()),
    ];
    for (tag, list) in patterns {
        for pattern in list {
            pad(level, out);
            out.push_str(&format!("<{tag} pattern=\"{}\"/>\n", escape(pattern.as_str())));
        }
    }

    if writes_packager(node.packager(), node.packager_params()) {
        let packager = node.packager().unwrap_or(DEFAULT_PACKAGER);
        pad(level, out);
        out.push_str(&format!("<packager id=\"{}\"", escape(packager)));
        write_params(node.packager_params(), level, "packager", out);
    }

    if let Some(uri) = node.transport() {
        pad(level, out);
        out.push_str(&format!("<transport uri=\"{}\"", escape(uri)));
        write_params(node.transport_params(), level, "transport", out);
    }
    Ok(())
}

/// Finishes an opened tag: self-closing when `params` is empty.
fn write_params(params: &Params, level: usize, tag: &str, out: &mut String) {
    if params.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    for (name, value) in params {
        pad(level + 1, out);
        match name.strip_prefix(FILE_PARAM_PREFIX) {
            Some(field) => out.push_str(&format!(
                "<file-param name=\"{}\" value=\"{}\"/>\n",
                escape(field),
                escape(value)
            )),
            None => out.push_str(&format!(
                "<param name=\"{}\" value=\"{}\"/>\n",
                escape(name),
                escape(value)
            )),
        }
    }
    pad(level, out);
    out.push_str(&format!("</{tag}>\n"));
}

fn write_children(tree: &TargetTree, id: TargetId, level: usize, out: &mut String) -> Result<(), TargetError> {
    for child in tree.local_children(id)? {
        write_target(tree, *child, level, out)?;
    }
    Ok(())
}

fn write_target(tree: &TargetTree, id: TargetId, level: usize, out: &mut String) -> Result<(), TargetError> {
    let node = tree.node(id)?;
    let hidden = if node.kind().hidden() {
        " hidden=\"true\""
    } else {
        ""
    };
    pad(level, out);
    let tag = match node.kind() {
        TargetKind::ImportGroup(import) => {
            out.push_str(&format!(
                "<import-group name=\"{}\"{hidden} href=\"{}\"/>\n",
                escape(&import.name),
                escape(&import.href)
            ));
            return Ok(());
        }
        TargetKind::Root => {
            return Err(TargetError::Unsupported {
                target: id.index(),
                operation: "nesting a root",
            })
        }
        TargetKind::Group { name, .. } => {
            out.push_str("<assignment-group");
            if let Some(name) = name {
                out.push_str(&format!(" name=\"{}\"", escape(name)));
            }
            "assignment-group"
        }
        TargetKind::Assignment { name, .. } => {
            out.push_str(&format!("<assignment name=\"{}\"", escape(name)));
            "assignment"
        }
    };
    out.push_str(hidden);

    if !has_properties(tree, id)? && node.children().is_empty() {
        out.push_str("/>\n");
        return Ok(());
    }
    out.push_str(">\n");
    write_properties(tree, id, level + 1, out)?;
    write_children(tree, id, level + 1, out)?;
    pad(level, out);
    out.push_str(&format!("</{tag}>\n"));
    Ok(())
}
