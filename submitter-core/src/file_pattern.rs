//! DOS-style wildcard patterns matched against project-relative paths.
//!
//! `?` matches exactly one character and `*` matches any run of characters,
//! including none. Every other character is literal, so patterns such as
//! `src\(old)[1].java` never change meaning because of regex syntax. The
//! whole candidate must match; `*.java` does not match `Main.java.bak`.
//!
//! Construction never fails. Any string compiles into some matcher.

use std::fmt;

use regex::Regex;

#[derive(Clone)]
pub struct FilePattern {
    source: String,
    regex: Option<Regex>,
}

impl FilePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let regex = compile(&source);
        Self { source, regex }
    }

    /// True iff the entire `path` matches this pattern. Case-sensitive.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(path))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 8);
    // (?s) lets `?` and `*` cover newlines too; file names may contain them.
    expr.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '?' => expr.push('.'),
            '*' => expr.push_str(".*"),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');

    // Only `.`/`.*` and escaped literals are emitted, so this can only fail
    // on the compiled size limit. Such a pattern matches nothing.
    match Regex::new(&expr) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "file_pattern_compile_failed");
            None
        }
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.source).finish()
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for FilePattern {}

impl From<&str> for FilePattern {
    fn from(pattern: &str) -> Self {
        FilePattern::new(pattern)
    }
}

impl From<String> for FilePattern {
    fn from(pattern: String) -> Self {
        FilePattern::new(pattern)
    }
}
