//! Terminal output for the CLI: the tree outline and the submission listener.

use std::fmt::Write as _;

use submitter_core::contract::SubmissionListener;
use submitter_core::manifest::SubmissionManifest;
use submitter_core::target::{OutlineNode, TargetVariant};
use submitter_core::SubmissionError;

/// Renders the outline as an indented listing, one node per line.
pub fn render_outline(root: &OutlineNode) -> String {
    let mut out = String::new();
    for child in &root.children {
        render_node(child, 0, &mut out);
    }
    out
}

fn render_node(node: &OutlineNode, depth: usize, out: &mut String) {
    let label = match node.kind {
        TargetVariant::Root => "root",
        TargetVariant::Group => "group",
        TargetVariant::Assignment => "assignment",
        TargetVariant::ImportGroup => "import",
    };
    let name = node.name.as_deref().unwrap_or("(unnamed)");
    let _ = write!(out, "{}[{label}] {name}", "  ".repeat(depth));
    if node.hidden {
        out.push_str(" (hidden)");
    }
    if !node.loaded {
        out.push_str(" (not loaded)");
    }
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

/// Reports submission progress on stdout and failures on stderr.
#[derive(Debug, Default)]
pub struct ConsoleListener;

impl SubmissionListener for ConsoleListener {
    fn on_started(&self, manifest: &SubmissionManifest) {
        println!("Submitting {} ...", manifest.project.describe());
    }

    fn on_succeeded(&self, _manifest: &SubmissionManifest, response: Option<&str>) {
        println!("Submission succeeded.");
        if let Some(response) = response.filter(|r| !r.trim().is_empty()) {
            println!("Response from the destination:\n{response}");
        }
    }

    fn on_failed(&self, _manifest: &SubmissionManifest, error: &SubmissionError) {
        eprintln!("[ERROR] {}", error.user_message());
    }

    fn on_canceled(&self, _manifest: &SubmissionManifest) {
        eprintln!("Submission canceled.");
    }
}
