use crate::ValidationErrors;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Describes what went wrong while loading or instantiating a validation module.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LoadErrorKind {
    /// The module file could not be read.
    Read,
    /// The module could not be downloaded.
    Fetch,
    /// The bytes are not a valid WebAssembly module.
    Malformed,
    /// The module imports a function that the host does not provide.
    UnknownImport {
        /// The namespace of the import.
        module: String,
        /// The name of the import within its namespace.
        name: String,
    },
    /// A required export is missing or has the wrong kind.
    MissingExport(&'static str),
    /// The module exports none of the validate entry points.
    NoEntryPoints,
    /// Compilation or instantiation failed.
    Instantiate,
}

impl std::fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => f.write_str("unable to read module"),
            Self::Fetch => f.write_str("unable to fetch module"),
            Self::Malformed => f.write_str("not a valid WebAssembly module"),
            Self::UnknownImport { module, name } => {
                write!(f, "unknown import {module:?} {name:?}")
            }
            Self::MissingExport(name) => write!(f, "missing export {name:?}"),
            Self::NoEntryPoints => f.write_str("module exports no validate entry points"),
            Self::Instantiate => f.write_str("instantiation failed"),
        }
    }
}

/// Error type used when a validation module could not be made ready to run.
#[derive(Debug)]
pub struct LoadError {
    location: String,
    kind: LoadErrorKind,
    cause: Option<anyhow::Error>,
}

impl LoadError {
    pub(crate) fn new(location: impl Into<String>, kind: LoadErrorKind) -> Self {
        Self {
            location: location.into(),
            kind,
            cause: None,
        }
    }

    pub(crate) fn with_cause(
        location: impl Into<String>,
        kind: LoadErrorKind,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            location: location.into(),
            kind,
            cause: Some(cause.into()),
        }
    }

    /// Where the module was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// What went wrong.
    pub fn kind(&self) -> &LoadErrorKind {
        &self.kind
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not load validation module {}: {}",
            self.location, self.kind
        )?;

        if let Some(cause) = &self.cause {
            write!(f, ": {cause:#}")?;
        }

        Ok(())
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// The failure side of a validation outcome.
///
/// Every variant prints as a diagnostic suitable for showing directly to a user.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The validation module could not be loaded, so the package was never looked at.
    Load(LoadError),
    /// The validation module ran and rejected the package.
    Rejected(ValidationErrors),
    /// The arguments passed to the entry point were unusable.
    InvalidInput(String),
    /// The validation module does not export the requested entry point.
    Unsupported(&'static str),
    /// The validation module trapped or broke the [`abi`](crate::abi) contract.
    Aborted(anyhow::Error),
}

impl Error {
    /// Returns `true` if the package itself was found not to conform, as opposed to the
    /// validation not running to completion.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The reported validation errors, if the package was rejected.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Rejected(errors) => Some(errors),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(error) => std::fmt::Display::fmt(error, f),
            Self::Rejected(errors) => std::fmt::Display::fmt(errors, f),
            Self::InvalidInput(message) => f.write_str(message),
            Self::Unsupported(name) => {
                write!(f, "validation module does not export {name:?}")
            }
            Self::Aborted(cause) => write!(f, "validation aborted: {cause:#}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(error) => Some(error),
            Self::Rejected(errors) => Some(errors),
            Self::Aborted(cause) => Some(cause.as_ref()),
            Self::InvalidInput(_) | Self::Unsupported(_) => None,
        }
    }
}

impl From<LoadError> for Error {
    fn from(error: LoadError) -> Self {
        Self::Load(error)
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Self::Rejected(errors)
    }
}
