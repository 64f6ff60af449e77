use std::sync::Arc;

use submitter_core::config::TransportConfig;
use submitter_core::contract::{DefinitionsFetcher, MockDefinitionsFetcher};
use submitter_core::definitions::parse_definitions;
use submitter_core::import::{HttpFetcher, LoadOutcome};
use submitter_core::target::TargetKind;
use submitter_core::{TargetError, TargetTree};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use url::Url;

const MAIN: &str = r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
   <required pattern="src/Main.java"/>
   <transport uri="https://example.edu/submit"/>
   <import-group name="Labs" href="labs.xml"/>
   <assignment-group>
      <assignment name="Project 1"/>
   </assignment-group>
</submission-targets>"#;

const LABS: &str = r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
   <required pattern="README.txt"/>
   <assignment name="Lab 1"/>
   <assignment name="Lab 2"/>
</submission-targets>"#;

const LABS_WITH_NESTED_IMPORT: &str = r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
   <assignment name="Lab 1"/>
   <import-group name="Extra" href="more/extra.xml"/>
</submission-targets>"#;

const EXTRA: &str = r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
   <assignment name="Bonus"/>
</submission-targets>"#;

const MAIN_URL: &str = "https://example.edu/defs/main.xml";
const LABS_URL: &str = "https://example.edu/defs/labs.xml";
const EXTRA_URL: &str = "https://example.edu/defs/more/extra.xml";

fn open(fetcher: MockDefinitionsFetcher) -> TargetTree {
    let source = Url::parse(MAIN_URL).unwrap();
    parse_definitions(MAIN, Some(&source))
        .unwrap()
        .with_fetcher(Arc::new(fetcher))
}

fn expect_document(fetcher: &mut MockDefinitionsFetcher, url: &'static str, body: &'static str) {
    fetcher
        .expect_fetch()
        .withf(move |requested: &Url| requested.as_str() == url)
        .times(1)
        .returning(move |_| Ok(body.to_owned()));
}

fn labs(tree: &TargetTree) -> submitter_core::TargetId {
    tree.local_children(tree.root()).unwrap()[0]
}

#[tokio::test]
async fn test_import_is_fetched_once_and_spliced() {
    let mut fetcher = MockDefinitionsFetcher::new();
    expect_document(&mut fetcher, LABS_URL, LABS);
    let mut tree = open(fetcher);
    let import = labs(&tree);

    assert!(!tree.kind(import).unwrap().is_loaded());
    assert!(tree.local_children(import).unwrap().is_empty());

    let first = tree.children(import).await.unwrap();
    let second = tree.children(import).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert!(tree.kind(import).unwrap().is_loaded());

    let lab1 = first[0];
    assert_eq!(tree.kind(lab1).unwrap().name(), Some("Lab 1"));
    assert_eq!(tree.parent(lab1).unwrap(), Some(import));
    assert_eq!(tree.path(lab1).unwrap(), "Labs/Lab 1");
    // The imported root's values now belong to the import group.
    assert_eq!(
        tree.all_required(lab1).unwrap(),
        vec!["README.txt", "src/Main.java"]
    );
    assert_eq!(
        tree.transport(lab1).unwrap().as_deref(),
        Some("https://example.edu/submit")
    );
}

#[tokio::test]
async fn test_failed_import_stays_failed() {
    let mut fetcher = MockDefinitionsFetcher::new();
    fetcher.expect_fetch().times(1).returning(|url| {
        Err(TargetError::Fetch {
            href: url.to_string(),
            message: "404 Not Found".into(),
        })
    });
    let mut tree = open(fetcher);
    let import = labs(&tree);

    let first = tree.load(import).await.unwrap_err();
    assert!(matches!(first, TargetError::Fetch { ref href, .. } if href == LABS_URL));

    // Neither a second load nor a read accessor fetches again.
    assert!(matches!(
        tree.children(import).await,
        Err(TargetError::Fetch { .. })
    ));
    assert!(matches!(
        tree.transport(import),
        Err(TargetError::Fetch { .. })
    ));
    assert!(!tree.kind(import).unwrap().is_loaded());
}

#[tokio::test]
async fn test_import_with_invalid_document_reports_parse_errors() {
    let mut fetcher = MockDefinitionsFetcher::new();
    expect_document(
        &mut fetcher,
        LABS_URL,
        r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets"><include/></submission-targets>"#,
    );
    let mut tree = open(fetcher);
    let import = labs(&tree);

    match tree.load(import).await {
        Err(TargetError::Parse(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected parse errors, got {other:?}"),
    }
}

#[tokio::test]
async fn test_load_all_follows_nested_relative_imports() {
    let mut fetcher = MockDefinitionsFetcher::new();
    expect_document(&mut fetcher, LABS_URL, LABS_WITH_NESTED_IMPORT);
    expect_document(&mut fetcher, EXTRA_URL, EXTRA);
    let mut tree = open(fetcher);

    let outcome = tree.load_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Complete { fetched: 2 });

    let bonus = tree.find_assignment("Labs/Extra/Bonus").await.unwrap();
    let bonus = bonus.expect("Bonus should be reachable after loading");
    assert_eq!(tree.path(bonus).unwrap(), "Labs/Extra/Bonus");

    // Everything is loaded now; a second pass fetches nothing.
    let outcome = tree.load_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Complete { fetched: 0 });
}

#[tokio::test]
async fn test_load_all_canceled_before_start_fetches_nothing() {
    let mut fetcher = MockDefinitionsFetcher::new();
    fetcher.expect_fetch().never();
    let mut tree = open(fetcher);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = tree.load_all(&cancel).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Canceled);
    assert!(!tree.kind(labs(&tree)).unwrap().is_loaded());
}

#[tokio::test]
async fn test_find_skips_unnamed_groups_without_touching_imports() {
    let mut fetcher = MockDefinitionsFetcher::new();
    fetcher.expect_fetch().never();
    let mut tree = open(fetcher);

    let project = tree.find_assignment("Project 1").await.unwrap().unwrap();
    assert_eq!(tree.kind(project).unwrap().name(), Some("Project 1"));
    assert_eq!(tree.find("Labs").await.unwrap(), Some(labs(&tree)));
    assert_eq!(tree.find_assignment("Labs").await.unwrap(), None);
}

#[tokio::test]
async fn test_find_returns_first_match_in_document_order() {
    let xml = r#"<submission-targets xmlns="http://web-cat.cs.vt.edu/submissionTargets">
   <assignment-group>
      <assignment-group>
         <assignment name="Quiz"/>
      </assignment-group>
   </assignment-group>
   <assignment name="Quiz"/>
   <assignment-group>
      <assignment name="Quiz"/>
   </assignment-group>
</submission-targets>"#;
    let mut tree = parse_definitions(xml, None).unwrap();
    let root = tree.root();
    let outer = tree.local_children(root).unwrap()[0];
    let inner = tree.local_children(outer).unwrap()[0];
    let first = tree.local_children(inner).unwrap()[0];

    assert_eq!(tree.find_assignment("Quiz").await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_find_assignment_loads_imports_on_the_path() {
    let mut fetcher = MockDefinitionsFetcher::new();
    expect_document(&mut fetcher, LABS_URL, LABS);
    let mut tree = open(fetcher);

    let lab2 = tree.find_assignment("Labs/Lab 2").await.unwrap().unwrap();
    assert!(matches!(
        tree.kind(lab2).unwrap(),
        TargetKind::Assignment { name, .. } if name == "Lab 2"
    ));
    assert_eq!(tree.find_assignment("Labs/Lab 9").await.unwrap(), None);
}

#[tokio::test]
async fn test_import_without_fetcher_fails() {
    let source = Url::parse(MAIN_URL).unwrap();
    let mut tree = parse_definitions(MAIN, Some(&source)).unwrap();
    let import = labs(&tree);
    assert!(matches!(
        tree.load(import).await,
        Err(TargetError::Fetch { .. })
    ));
}

#[tokio::test]
async fn test_http_fetcher_reads_file_urls() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("main.xml"), MAIN).unwrap();
    std::fs::write(dir.path().join("labs.xml"), LABS).unwrap();

    let fetcher = HttpFetcher::new(&TransportConfig::default()).unwrap();
    let source = Url::from_file_path(dir.path().join("main.xml")).unwrap();
    let mut tree = parse_definitions(MAIN, Some(&source))
        .unwrap()
        .with_fetcher(Arc::new(fetcher));

    let lab1 = tree.find_assignment("Labs/Lab 1").await.unwrap();
    assert!(lab1.is_some());

    let missing = Url::from_file_path(dir.path().join("missing.xml")).unwrap();
    let fetcher = HttpFetcher::new(&TransportConfig::default()).unwrap();
    assert!(matches!(
        fetcher.fetch(&missing).await,
        Err(TargetError::Fetch { .. })
    ));
}
