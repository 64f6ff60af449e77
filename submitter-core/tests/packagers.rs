use std::io::{Cursor, Read};

use submitter_core::contract::{ArchiveSource, PackRequest, Packager, ProjectFile, ProjectFiles};
use submitter_core::manifest::ParameterResolver;
use submitter_core::packager::jar::manifest_text;
use submitter_core::packager::{JarPackager, ZipPackager};
use submitter_core::project::MemoryProject;
use submitter_core::target::params;
use submitter_core::{TargetId, TargetTree};
use zip::ZipArchive;

fn project() -> MemoryProject {
    MemoryProject::new("lab")
        .with_file("README.txt", "read me")
        .with_file("bin/Main.class", vec![0xCA, 0xFE, 0xBA, 0xBE])
        .with_file("src/Main.java", "class Main {}")
        .with_file("src/Util.java", "class Util {}")
}

fn tree() -> (TargetTree, TargetId) {
    let mut tree = TargetTree::new();
    let root = tree.root();
    tree.set_excludes(root, ["*.class"]).unwrap();
    let lab = tree.add_assignment(root, "Lab 1").unwrap();
    (tree, lab)
}

fn pack(packager: &dyn Packager, tree: &TargetTree, target: TargetId, project: &MemoryProject) -> Vec<u8> {
    let resolver = ParameterResolver::new("alice", "s3cret", "Lab 1");
    let source = ArchiveSource {
        packager,
        request: PackRequest {
            tree,
            target,
            project,
            resolver: &resolver,
        },
    };
    source.to_bytes().expect("packaging should succeed")
}

fn entry_names(bytes: Vec<u8>) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_owned())
        .collect()
}

fn read_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}

#[test]
fn test_zip_contains_only_included_files() {
    let (tree, lab) = tree();
    let bytes = pack(&ZipPackager::new(), &tree, lab, &project());

    assert_eq!(read_entry(&bytes, "src/Main.java"), "class Main {}");
    assert_eq!(
        entry_names(bytes),
        vec!["README.txt", "src/Main.java", "src/Util.java"]
    );
}

#[test]
fn test_zip_of_fully_excluded_project_is_empty_but_valid() {
    let (mut tree, lab) = tree();
    tree.set_includes(tree.root(), ["*.py"]).unwrap();
    let bytes = pack(&ZipPackager::new(), &tree, lab, &project());
    assert!(entry_names(bytes).is_empty());
}

#[test]
fn test_jar_writes_manifest_first_with_resolved_attributes() {
    let (mut tree, lab) = tree();
    tree.set_packager(lab, Some("jar".into())).unwrap();
    tree.set_packager_params(
        lab,
        params([("Built-By", "${user}"), ("Assignment", "${assignment.name}")]),
    )
    .unwrap();

    let project = project().with_file("META-INF/MANIFEST.MF", "Manifest-Version: 9.9\r\n");
    let bytes = pack(&JarPackager::new(), &tree, lab, &project);

    let manifest = read_entry(&bytes, "META-INF/MANIFEST.MF");
    assert_eq!(
        manifest,
        "Manifest-Version: 1.0\r\nBuilt-By: alice\r\nAssignment: Lab%201\r\n\r\n"
    );
    let names = entry_names(bytes);
    assert_eq!(names[0], "META-INF/MANIFEST.MF");
    assert_eq!(
        names.iter().filter(|n| *n == "META-INF/MANIFEST.MF").count(),
        1,
        "the project's own manifest must not be duplicated"
    );
    assert!(names.contains(&"src/Util.java".to_owned()));
    assert!(!names.contains(&"bin/Main.class".to_owned()));
}

#[test]
fn test_manifest_lines_wrap_at_72_bytes() {
    let value = "x".repeat(150);
    let text = manifest_text(&params([("Class-Path", value.as_str())]));

    for line in text.split("\r\n") {
        assert!(line.len() <= 72, "line too long: {} bytes", line.len());
    }
    let unfolded = text.replace("\r\n ", "");
    assert!(unfolded.contains(&format!("Class-Path: {value}\r\n")));
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_manifest_version_param_is_not_repeated() {
    let text = manifest_text(&params([("Manifest-Version", "2.0"), ("Main-Class", "Main")]));
    assert_eq!(text, "Manifest-Version: 1.0\r\nMain-Class: Main\r\n\r\n");
}

/// A project whose only file cannot be read until another task opens the gate.
struct GatedProject {
    gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl ProjectFiles for GatedProject {
    fn describe(&self) -> String {
        "gated".to_owned()
    }

    fn files(&self) -> std::io::Result<Vec<ProjectFile>> {
        Ok(vec![ProjectFile {
            path: "src/Main.java".to_owned(),
            len: 13,
        }])
    }

    fn open(&self, _path: &str) -> std::io::Result<Box<dyn Read + Send + '_>> {
        let gate = self.gate.lock().unwrap();
        gate.recv_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::TimedOut, e))?;
        Ok(Box::new(Cursor::new("class Main {}")))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_packaging_does_not_starve_other_tasks() {
    let packed = tokio::spawn(async move {
        let (open_gate, gate) = std::sync::mpsc::channel();
        let project = GatedProject {
            gate: std::sync::Mutex::new(gate),
        };
        // Queued on this worker; it only runs if packaging yields the worker.
        tokio::spawn(async move {
            open_gate.send(()).unwrap();
        });

        let (tree, lab) = tree();
        let resolver = ParameterResolver::new("alice", "", "Lab 1");
        let packager = ZipPackager::new();
        let source = ArchiveSource {
            packager: &packager,
            request: PackRequest {
                tree: &tree,
                target: lab,
                project: &project,
                resolver: &resolver,
            },
        };
        source.package()
    })
    .await
    .unwrap();

    let bytes = packed.expect("packaging should finish once the gate opens");
    assert_eq!(entry_names(bytes), vec!["src/Main.java"]);
}
