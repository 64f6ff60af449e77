use submitter_core::file_pattern::FilePattern;

#[test]
fn test_literal_pattern_matches_only_identical_path() {
    let pattern = FilePattern::new("src/Main.java");
    assert!(pattern.matches("src/Main.java"));
    assert!(!pattern.matches("src/Main.javax"));
    assert!(!pattern.matches("xsrc/Main.java"));
    assert!(!pattern.matches("src/main.java"), "matching is case-sensitive");
    assert!(!pattern.matches(""));
}

#[test]
fn test_star_matches_empty_and_any_run() {
    let everything = FilePattern::new("*");
    assert!(everything.matches(""));
    assert!(everything.matches("a/b/c.txt"));

    let java = FilePattern::new("*.java");
    assert!(java.matches(".java"));
    assert!(java.matches("Main.java"));
    assert!(java.matches("src/pkg/Main.java"));
    assert!(!java.matches("Main.java.bak"), "the whole path must match");

    let middle = FilePattern::new("src/*/Main.java");
    assert!(middle.matches("src//Main.java"));
    assert!(middle.matches("src/a/b/Main.java"));
}

#[test]
fn test_question_mark_matches_exactly_one_character() {
    let pattern = FilePattern::new("?.txt");
    assert!(pattern.matches("a.txt"));
    assert!(pattern.matches("/.txt"));
    assert!(!pattern.matches(".txt"), "zero characters");
    assert!(!pattern.matches("ab.txt"), "two characters");

    let pair = FilePattern::new("lab??");
    assert!(pair.matches("lab01"));
    assert!(!pair.matches("lab1"));
    assert!(!pair.matches("lab001"));
}

#[test]
fn test_regex_metacharacters_are_literal() {
    let pattern = FilePattern::new("a+b(1)[x]{2}|^$.txt");
    assert!(pattern.matches("a+b(1)[x]{2}|^$.txt"));
    assert!(!pattern.matches("aab(1)[x]{2}|^$.txt"));

    let dot = FilePattern::new("file.txt");
    assert!(!dot.matches("fileXtxt"));

    let backslash = FilePattern::new(r"dir\*.txt");
    assert!(backslash.matches(r"dir\notes.txt"));
    assert!(!backslash.matches("dir/notes.txt"));
}

#[test]
fn test_unbalanced_pattern_still_compiles() {
    let pattern = FilePattern::new("([unclosed");
    assert!(pattern.matches("([unclosed"));
    assert_eq!(pattern.as_str(), "([unclosed");
    assert_eq!(pattern.to_string(), "([unclosed");
}
