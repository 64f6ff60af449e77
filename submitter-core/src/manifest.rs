//! Per-attempt submission context and `${...}` placeholder resolution.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::contract::ProjectFiles;
use crate::error::SubmissionError;
use crate::target::{Params, TargetId, TargetTree};

/// Transient context for one submission attempt. Never persisted.
#[derive(Clone)]
pub struct SubmissionManifest {
    /// Correlates log records and listener callbacks for this attempt.
    pub id: Uuid,
    pub assignment: TargetId,
    pub project: Arc<dyn ProjectFiles>,
    pub username: String,
    pub password: String,
}

impl SubmissionManifest {
    pub fn new(
        assignment: TargetId,
        project: Arc<dyn ProjectFiles>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment,
            project,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Name of the chosen assignment as recorded in `tree`.
    pub fn assignment_name(&self, tree: &TargetTree) -> Result<String, SubmissionError> {
        let kind = tree.kind(self.assignment)?;
        if !kind.is_actionable() {
            return Err(SubmissionError::NotActionable(
                kind.name().unwrap_or("(unnamed)").to_owned(),
            ));
        }
        Ok(kind.name().unwrap_or_default().to_owned())
    }

    pub fn resolver(&self, tree: &TargetTree) -> Result<ParameterResolver, SubmissionError> {
        Ok(ParameterResolver {
            username: self.username.clone(),
            password: self.password.clone(),
            assignment_name: self.assignment_name(tree)?,
        })
    }
}

impl fmt::Debug for SubmissionManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionManifest")
            .field("id", &self.id)
            .field("assignment", &self.assignment)
            .field("project", &self.project.describe())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Substitutes `${user}`, `${pw}` and `${assignment.name}` in parameter
/// values.
///
/// Substitution is a single literal pass: placeholders it does not know are
/// left as they are, and text produced by a substitution is never scanned
/// again. The assignment name has its spaces encoded as `%20`.
#[derive(Clone)]
pub struct ParameterResolver {
    username: String,
    password: String,
    assignment_name: String,
}

impl ParameterResolver {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        assignment_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            assignment_name: assignment_name.into(),
        }
    }

    pub fn resolve(&self, template: &str) -> String {
        let encoded_name = self.assignment_name.replace(' ', "%20");
        let replacements = [
            ("${user}", self.username.as_str()),
            ("${pw}", self.password.as_str()),
            ("${assignment.name}", encoded_name.as_str()),
        ];

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        'scan: while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];
            for (placeholder, value) in replacements {
                if candidate.starts_with(placeholder) {
                    out.push_str(value);
                    rest = &candidate[placeholder.len()..];
                    continue 'scan;
                }
            }
            out.push_str("${");
            rest = &candidate[2..];
        }
        out.push_str(rest);
        out
    }

    pub fn resolve_params(&self, params: &Params) -> Params {
        params
            .iter()
            .map(|(name, value)| (name.clone(), self.resolve(value)))
            .collect()
    }
}

impl fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterResolver")
            .field("username", &self.username)
            .field("assignment_name", &self.assignment_name)
            .finish_non_exhaustive()
    }
}
