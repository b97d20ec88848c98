//! Reporting the outcome of a validation.

use crate::{Artifact, Capabilities, Error, Result, Session};
use std::io::Write;

/// Delivers the outcome of a validation to whoever asked for it.
///
/// [`Relay::relay()`] consumes the relay, so an outcome is reported exactly once.
pub trait Relay {
    /// Reports the `outcome`.
    fn relay(self, outcome: Result<()>);
}

/// A [`Relay`] that prints `OK` on success and the error on failure.
#[derive(Debug)]
pub struct Console<O: Write, E: Write> {
    out: O,
    err: E,
}

impl Console<std::io::Stdout, std::io::Stderr> {
    /// Prints to the standard output and error streams.
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> Console<O, E> {
    /// Prints successes to `out` and failures to `err`.
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }
}

impl<O: Write, E: Write> Relay for Console<O, E> {
    fn relay(mut self, outcome: Result<()>) {
        let written = match outcome {
            Ok(()) => writeln!(self.out, "OK").and_then(|()| self.out.flush()),
            Err(error) => {
                let message = error.to_string();
                writeln!(self.err, "{}", message.trim_end()).and_then(|()| self.err.flush())
            }
        };

        if let Err(e) = written {
            log::warn!("could not print validation outcome: {e}");
        }
    }
}

/// A [`Relay`] that invokes exactly one of two callbacks.
pub struct Callbacks<S, F> {
    on_success: S,
    on_error: F,
}

impl<S, F> std::fmt::Debug for Callbacks<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

impl<S, F> Callbacks<S, F>
where
    S: FnOnce(),
    F: FnOnce(Error),
{
    /// Calls `on_success` with no arguments if validation succeeds, or `on_error` with the
    /// [`Error`] if it fails.
    pub fn new(on_success: S, on_error: F) -> Self {
        Self {
            on_success,
            on_error,
        }
    }
}

impl<S, F> Relay for Callbacks<S, F>
where
    S: FnOnce(),
    F: FnOnce(Error),
{
    fn relay(self, outcome: Result<()>) {
        match outcome {
            Ok(()) => (self.on_success)(),
            Err(error) => (self.on_error)(error),
        }
    }
}

/// Validates a package archive held in memory, reporting the outcome through a callback pair.
///
/// A new instance of the `artifact` is created for every call, and is always released before one
/// of the callbacks is invoked. The instance reads the archive lazily through
/// [`abi::VALIDATE_READER`](crate::abi::VALIDATE_READER) and is not given filesystem access.
///
/// If the declared `size` does not match the length of the `buffer`, `on_error` is called with
/// [`Error::InvalidInput`] without instantiating the module.
pub fn validate_buffer<S, F>(
    artifact: &Artifact,
    name: &str,
    size: u64,
    buffer: &[u8],
    on_success: S,
    on_error: F,
) where
    S: FnOnce(),
    F: FnOnce(Error),
{
    let callbacks = Callbacks::new(on_success, on_error);

    if usize::try_from(size).ok() != Some(buffer.len()) {
        callbacks.relay(Err(Error::InvalidInput(format!(
            "declared size {size} does not match the {} bytes of {name}",
            buffer.len()
        ))));
        return;
    }

    let archive = std::io::Cursor::new(buffer.to_vec());
    Session::new(artifact)
        .capabilities(Capabilities::sandboxed())
        .relay(
            |validator| validator.validate_from_reader(name, size, archive),
            callbacks,
        );
}
