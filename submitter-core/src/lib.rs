#![doc = "submitter-core: engine library for the submitter."]

//! Resolves a tree of submission targets, decides which project files
//! belong in a submission, packages them and hands the archive to a
//! protocol for the destination URI.
//!
//! # Usage
//! Open definitions with a [`submission::Submitter`], pick an assignment
//! (for example with [`target::TargetTree::find_assignment`]), build a
//! [`manifest::SubmissionManifest`] for the project and call
//! [`submission::Submitter::submit`].

pub mod config;
pub mod contract;
pub mod definitions;
pub mod error;
pub mod events;
pub mod file_pattern;
pub mod import;
pub mod manifest;
pub mod packager;
pub mod project;
pub mod protocol;
pub mod registry;
pub mod submission;
pub mod target;

pub use error::{PackageError, ParseError, ParseErrors, ProtocolError, SubmissionError, TargetError};
pub use submission::{SubmissionOutcome, SubmissionState, Submitter};
pub use target::{TargetId, TargetTree};
