/// A single reason a validation module gave for rejecting a package.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ValidationError {
    message: String,
    code: Option<String>,
}

impl ValidationError {
    /// Creates an error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates an error identified by the given code. An empty code is treated as no code.
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            message: message.into(),
            code: if code.is_empty() { None } else { Some(code) },
        }
    }

    /// The human readable description of the problem.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// A unique identifier for the check that failed, if the module assigned one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The ordered collection of [`ValidationError`]s produced by one call into a validation module.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Creates an empty collection.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds an error to the end of the collection.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Moves all errors from `other` to the end of this collection.
    pub fn append(&mut self, other: &mut Self) {
        self.0.append(&mut other.0);
    }

    /// The number of errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no errors.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the errors in the order they were reported.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Splits the collection in two: the errors for which `keep` returns `true`, and the rest.
    pub fn partition(self, mut keep: impl FnMut(&ValidationError) -> bool) -> (Self, Self) {
        let (kept, filtered) = self.0.into_iter().partition(|error| keep(error));
        (Self(kept), Self(filtered))
    }

    /// Returns `None` if the collection is empty.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.len() {
            0 => return f.write_str("found 0 validation errors"),
            1 => writeln!(f, "found 1 validation error:")?,
            count => writeln!(f, "found {count} validation errors:")?,
        }

        for (index, error) in self.0.iter().enumerate() {
            writeln!(f, "{:4}. {error}", index + 1)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<T: IntoIterator<Item = ValidationError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<T: IntoIterator<Item = ValidationError>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
