use crate::imports::{self, HostState};
use crate::{
    abi, Artifact, Capabilities, Error, Exports, Filter, LoadError, LoadErrorKind, Result,
    ValidationError,
};
use std::io::{Read, Seek};
use std::path::Path;

/// A running instance of a validation module.
///
/// A [`Validator`] is created by [`Validator::instantiate()`], used for exactly one call to one of
/// the `validate_*` entry points, and then released with [`Validator::stop()`]. If a [`Validator`]
/// is dropped without being stopped, it is stopped automatically, so the instance is released on
/// every path.
///
/// To have the whole sequence handled automatically, use a [`Session`](crate::Session).
pub struct Validator {
    store: wasmtime::Store<HostState>,
    instance: wasmtime::Instance,
    memory: wasmtime::Memory,
    exports: Exports,
    location: String,
    filter: Filter,
    used: bool,
    stopped: bool,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("location", &self.location)
            .field("exports", &self.exports)
            .field("filter", &self.filter)
            .field("used", &self.used)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Creates a new instance of the validation module, linked against the host functions
    /// described in [`abi`]. Only the host services allowed by the `capabilities` are usable.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] if instantiation fails, for example because the module's start
    /// function trapped. No instance is left running in that case.
    pub fn instantiate(artifact: &Artifact, capabilities: Capabilities) -> Result<Self> {
        let location = artifact.location();
        let instantiate_error =
            |e: anyhow::Error| LoadError::with_cause(location, LoadErrorKind::Instantiate, e);

        let linker = imports::linker(artifact.engine()).map_err(instantiate_error)?;
        let mut store = wasmtime::Store::new(artifact.engine(), HostState::new(capabilities));
        let instance = linker
            .instantiate(&mut store, artifact.module())
            .map_err(instantiate_error)?;

        let memory = instance
            .get_memory(&mut store, abi::MEMORY)
            .ok_or_else(|| LoadError::new(location, LoadErrorKind::MissingExport(abi::MEMORY)))?;

        log::debug!("instantiated validation module {location}");

        Ok(Self {
            store,
            instance,
            memory,
            exports: artifact.exports(),
            location: location.to_string(),
            filter: Filter::new(),
            used: false,
            stopped: false,
        })
    }

    /// Sets the [`Filter`] applied to the errors of a rejected package.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// The entry points the module provides.
    pub fn exports(&self) -> Exports {
        self.exports
    }

    /// Validates a package archive at the given path. The module reads the file through the
    /// filesystem imports, so the validator must have been created with
    /// [`Capabilities::command_line()`] for this to succeed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if the path is empty or not valid UTF-8, or if the instance was
    ///   already used to validate a package.
    /// - [`Error::Unsupported`] if the module does not export [`abi::VALIDATE_PATH`].
    /// - [`Error::Rejected`] if the package does not conform.
    /// - [`Error::Aborted`] if the module trapped.
    pub fn validate_from_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let path = path.to_str().ok_or_else(|| {
            Error::InvalidInput(format!("package path {} is not valid UTF-8", path.display()))
        })?;

        if path.is_empty() {
            return Err(Error::InvalidInput("package path expected".to_string()));
        }

        let entry =
            self.entry::<(i32, i32)>(abi::VALIDATE_PATH, self.exports.validate_path())?;
        let (path_ptr, path_len) = self.copy_in(path.as_bytes())?;

        log::debug!("validating {path} with {}", self.location);
        let result = entry.call(&mut self.store, (path_ptr, path_len));
        self.settle(result)
    }

    /// Validates a package archive whose whole contents are in `archive`. The `name` identifies
    /// the package in diagnostics.
    pub fn validate_from_archive(&mut self, name: &str, archive: &[u8]) -> Result<()> {
        let entry = self.entry::<(i32, i32, i32, i32)>(
            abi::VALIDATE_ARCHIVE,
            self.exports.validate_archive(),
        )?;
        let (name_ptr, name_len) = self.copy_in(name.as_bytes())?;
        let (data_ptr, data_len) = self.copy_in(archive)?;

        log::debug!("validating {name} ({data_len} bytes) with {}", self.location);
        let result = entry.call(&mut self.store, (name_ptr, name_len, data_ptr, data_len));
        self.settle(result)
    }

    /// Validates a package archive of `size` bytes, which the module reads lazily from `reader`
    /// instead of requiring it to be copied into linear memory up front.
    ///
    /// The `reader` is released when this method returns.
    pub fn validate_from_reader<R>(&mut self, name: &str, size: u64, reader: R) -> Result<()>
    where
        R: Read + Seek + Send + 'static,
    {
        let declared_size = i64::try_from(size)
            .map_err(|_| Error::InvalidInput(format!("archive size {size} is too large")))?;
        let entry = self.entry::<(i32, i32, i64)>(
            abi::VALIDATE_READER,
            self.exports.validate_reader(),
        )?;
        let (name_ptr, name_len) = self.copy_in(name.as_bytes())?;

        log::debug!("validating {name} ({size} bytes, lazily) with {}", self.location);
        self.store.data_mut().attach_reader(Box::new(reader));
        let result = entry.call(&mut self.store, (name_ptr, name_len, declared_size));
        self.store.data_mut().detach_reader();

        self.settle(result)
    }

    /// Releases the instance, first calling [`abi::STOP`] if the module exports it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if the module trapped while stopping. The instance is released
    /// regardless.
    pub fn stop(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.stopped, true) {
            return Ok(());
        }

        if self.exports.stop() {
            let stop = self
                .instance
                .get_typed_func::<(), ()>(&mut self.store, abi::STOP)
                .map_err(Error::Aborted)?;
            stop.call(&mut self.store, ()).map_err(Error::Aborted)?;
        }

        log::debug!("stopped validation module {}", self.location);
        Ok(())
    }

    /// Looks up a validate entry point, marking the instance as used.
    fn entry<P: wasmtime::WasmParams>(
        &mut self,
        name: &'static str,
        exported: bool,
    ) -> Result<wasmtime::TypedFunc<P, i32>> {
        if self.used {
            return Err(Error::InvalidInput(format!(
                "validation module instance {} was already used",
                self.location
            )));
        }

        if !exported {
            return Err(Error::Unsupported(name));
        }

        self.used = true;
        // Diagnostics only ever belong to the call about to be made.
        self.store.data_mut().take_diagnostics();
        self.instance
            .get_typed_func::<P, i32>(&mut self.store, name)
            .map_err(Error::Aborted)
    }

    /// Allocates space in linear memory and copies `bytes` into it.
    fn copy_in(&mut self, bytes: &[u8]) -> Result<(i32, i32)> {
        let len = i32::try_from(bytes.len()).map_err(|_| {
            Error::InvalidInput(format!("input of {} bytes is too large", bytes.len()))
        })?;

        let alloc = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, abi::ALLOC)
            .map_err(Error::Aborted)?;
        let ptr = alloc.call(&mut self.store, len).map_err(Error::Aborted)?;

        if ptr == 0 && len > 0 {
            return Err(Error::Aborted(anyhow::anyhow!(
                "module could not allocate {len} bytes"
            )));
        }

        self.memory
            .write(&mut self.store, ptr as u32 as usize, bytes)
            .map_err(|e| {
                Error::Aborted(anyhow::Error::new(e).context(format!(
                    "could not copy {len} bytes to {ptr:#X}"
                )))
            })?;

        Ok((ptr, len))
    }

    /// Converts the result of calling a validate entry point into an outcome.
    fn settle(&mut self, result: anyhow::Result<i32>) -> Result<()> {
        let diagnostics = self.store.data_mut().take_diagnostics();

        let status = match result {
            Ok(status) => status,
            Err(trap) => {
                if !diagnostics.is_empty() {
                    log::debug!(
                        "discarding {} errors reported before {} trapped",
                        diagnostics.len(),
                        self.location
                    );
                }

                return Err(Error::Aborted(trap));
            }
        };

        match status {
            abi::STATUS_ACCEPTED => {
                if !diagnostics.is_empty() {
                    log::warn!(
                        "{} accepted the package but reported {} errors, ignoring them",
                        self.location,
                        diagnostics.len()
                    );
                }

                Ok(())
            }
            abi::STATUS_REJECTED => {
                let diagnostics = diagnostics.non_empty().unwrap_or_else(|| {
                    [ValidationError::new("package rejected without a reason")]
                        .into_iter()
                        .collect()
                });

                let (remaining, filtered) = self.filter.run(diagnostics);
                if let Some(filtered) = filtered {
                    log::info!("{} validation errors were excluded", filtered.len());
                }

                match remaining {
                    Some(errors) => Err(Error::Rejected(errors)),
                    None => Ok(()),
                }
            }
            unknown => Err(Error::Aborted(anyhow::anyhow!(
                "validate entry point returned unknown status {unknown}"
            ))),
        }
    }
}

impl Drop for Validator {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("error while stopping validation module: {e}");
        }
    }
}
