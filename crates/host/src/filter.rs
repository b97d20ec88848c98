//! Post-processing of the errors reported for a rejected package.
//!
//! A [`Filter`] runs a chain of [`Processor`]s over the [`ValidationErrors`] of a rejected
//! package. Each processor splits the errors it is given into the ones that are kept and the ones
//! that are filtered out; the kept errors are passed on to the next processor.
//!
//! Filters are usually built from a [`FilterConfig`], which is read from a YAML document such as:
//!
//! ```yaml
//! errors:
//!   exclude_checks:
//!     - SVR00002
//!     - SVR00004
//! ```

use crate::{ValidationError, ValidationErrors};
use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;

/// A step in a [`Filter`].
pub trait Processor: Send + Sync {
    /// A short name identifying the kind of processor.
    fn name(&self) -> &str;

    /// Splits `errors` into the errors that are kept and the errors that are filtered out.
    fn process(&self, errors: ValidationErrors) -> (ValidationErrors, ValidationErrors);
}

/// A [`Processor`] that filters out the errors produced by a check with a particular code.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExcludeCheck {
    code: String,
}

impl ExcludeCheck {
    /// Excludes errors with the given `code`. An empty `code` excludes nothing.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// The code of the errors that are excluded.
    pub fn code(&self) -> &str {
        &self.code
    }

    fn keeps(&self, error: &ValidationError) -> bool {
        error.code() != Some(self.code.as_str())
    }
}

impl Processor for ExcludeCheck {
    fn name(&self) -> &str {
        "exclude-checks"
    }

    fn process(&self, errors: ValidationErrors) -> (ValidationErrors, ValidationErrors) {
        if self.code.is_empty() {
            return (errors, ValidationErrors::new());
        }

        errors.partition(|error| self.keeps(error))
    }
}

/// A chain of [`Processor`]s applied to validation errors.
#[derive(Clone, Default)]
pub struct Filter {
    processors: Vec<Arc<dyn Processor>>,
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|processor| processor.name()))
            .finish()
    }
}

impl Filter {
    /// Creates a filter that keeps every error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter with one [`ExcludeCheck`] for each code in the configuration.
    pub fn from_config(config: &FilterConfig) -> Self {
        config
            .errors
            .exclude_checks
            .iter()
            .fold(Self::new(), |filter, code| filter.exclude_check(code.as_str()))
    }

    /// Appends a [`Processor`] to the end of the chain.
    pub fn add_processor(&mut self, processor: impl Processor + 'static) {
        self.processors.push(Arc::new(processor));
    }

    /// Appends an [`ExcludeCheck`] for the given `code`.
    pub fn exclude_check(mut self, code: impl Into<String>) -> Self {
        self.add_processor(ExcludeCheck::new(code));
        self
    }

    /// Returns `true` if the filter has no processors.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Runs every processor in order, returning the remaining errors and all of the errors that
    /// were filtered out. Empty collections are returned as [`None`].
    pub fn run(
        &self,
        errors: ValidationErrors,
    ) -> (Option<ValidationErrors>, Option<ValidationErrors>) {
        let mut remaining = errors;
        let mut all_filtered = ValidationErrors::new();

        for processor in self.processors.iter() {
            let (kept, mut filtered) = processor.process(remaining);
            if !filtered.is_empty() {
                log::debug!(
                    "processor {:?} filtered out {} errors",
                    processor.name(),
                    filtered.len()
                );
            }

            all_filtered.append(&mut filtered);
            remaining = kept;
        }

        (remaining.non_empty(), all_filtered.non_empty())
    }
}

/// The processors listed in a [`FilterConfig`].
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize)]
#[non_exhaustive]
pub struct Processors {
    /// The codes of the checks whose errors are excluded.
    #[serde(default)]
    pub exclude_checks: Vec<String>,
}

/// Configuration for building a [`Filter`].
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize)]
#[non_exhaustive]
pub struct FilterConfig {
    /// Processors applied to validation errors.
    #[serde(default)]
    pub errors: Processors,
}

impl FilterConfig {
    /// Parses a configuration from a YAML document.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str::<Option<Self>>(text)?.unwrap_or_default())
    }

    /// Reads a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Adds the given codes to the list of excluded checks.
    pub fn exclude_checks<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.errors
            .exclude_checks
            .extend(codes.into_iter().map(Into::into));
        self
    }
}
