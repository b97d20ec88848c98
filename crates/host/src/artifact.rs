use crate::{abi, LoadError, LoadErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on the size of a module downloaded by [`ArtifactSource::Url`].
#[cfg(feature = "fetch")]
const MAX_FETCH_SIZE: u64 = 256 * 1024 * 1024;

/// Specifies where the bytes of a validation module come from.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ArtifactSource {
    /// A module file on the local filesystem.
    Path(PathBuf),
    /// A module that was already read into memory. The `name` is only used in error messages.
    Bytes {
        /// Describes where the bytes came from.
        name: String,
        /// The binary module.
        bytes: Arc<[u8]>,
    },
    /// A module downloaded over HTTP.
    #[cfg(feature = "fetch")]
    Url(String),
}

impl ArtifactSource {
    /// A description of the source suitable for error messages.
    pub fn location(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name, .. } => name.clone(),
            #[cfg(feature = "fetch")]
            Self::Url(url) => url.clone(),
        }
    }

    fn read(&self) -> Result<Arc<[u8]>, LoadError> {
        match self {
            Self::Path(path) => std::fs::read(path)
                .map(Arc::from)
                .map_err(|e| LoadError::with_cause(self.location(), LoadErrorKind::Read, e)),
            Self::Bytes { bytes, .. } => Ok(bytes.clone()),
            #[cfg(feature = "fetch")]
            Self::Url(url) => fetch(url)
                .map(Arc::from)
                .map_err(|e| LoadError::with_cause(url.as_str(), LoadErrorKind::Fetch, e)),
        }
    }
}

impl From<PathBuf> for ArtifactSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ArtifactSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

#[cfg(feature = "fetch")]
fn fetch(url: &str) -> anyhow::Result<Vec<u8>> {
    let response = ureq::get(url).call()?;
    let mut body = response.into_body();
    Ok(body.with_config().limit(MAX_FETCH_SIZE).read_to_vec()?)
}

/// Indicates which optional [`abi`] entry points a validation module exports.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Exports {
    path: bool,
    archive: bool,
    reader: bool,
    stop: bool,
}

impl Exports {
    /// Whether [`abi::VALIDATE_PATH`] is exported.
    pub fn validate_path(&self) -> bool {
        self.path
    }

    /// Whether [`abi::VALIDATE_ARCHIVE`] is exported.
    pub fn validate_archive(&self) -> bool {
        self.archive
    }

    /// Whether [`abi::VALIDATE_READER`] is exported.
    pub fn validate_reader(&self) -> bool {
        self.reader
    }

    /// Whether [`abi::STOP`] is exported.
    pub fn stop(&self) -> bool {
        self.stop
    }

    fn any_entry_point(&self) -> bool {
        self.path || self.archive || self.reader
    }
}

/// A compiled validation module, ready to be instantiated any number of times.
///
/// Cloning an [`Artifact`] is cheap, and clones share the same compiled code. The artifact is
/// never modified after it is created, so it may be freely shared between threads.
#[derive(Clone)]
pub struct Artifact {
    engine: wasmtime::Engine,
    module: wasmtime::Module,
    exports: Exports,
    location: Arc<str>,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("location", &self.location)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

impl Artifact {
    /// Reads, checks and compiles a validation module using a default [`wasmtime::Engine`].
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] if the module could not be obtained, is not a valid WebAssembly
    /// module, imports functions the host does not provide, or lacks required exports.
    pub fn load(source: &ArtifactSource) -> Result<Self, LoadError> {
        Self::load_with_engine(&wasmtime::Engine::default(), source)
    }

    /// Like [`Artifact::load()`], but compiles the module with the given [`wasmtime::Engine`].
    pub fn load_with_engine(
        engine: &wasmtime::Engine,
        source: &ArtifactSource,
    ) -> Result<Self, LoadError> {
        let location = source.location();
        log::info!("loading validation module from {location}");
        let bytes = source.read()?;
        Self::compile(engine, location, &bytes)
    }

    /// Reads a validation module from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::load(&ArtifactSource::Path(path.as_ref().to_path_buf()))
    }

    /// Compiles a validation module from a buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, LoadError> {
        Self::compile(&wasmtime::Engine::default(), name.into(), bytes)
    }

    fn compile(
        engine: &wasmtime::Engine,
        location: String,
        wasm: &[u8],
    ) -> Result<Self, LoadError> {
        let exports = inspect(&location, wasm)?;
        let module = wasmtime::Module::new(engine, wasm)
            .map_err(|e| LoadError::with_cause(location.as_str(), LoadErrorKind::Instantiate, e))?;

        log::debug!("compiled validation module {location} ({} bytes)", wasm.len());

        Ok(Self {
            engine: engine.clone(),
            module,
            exports,
            location: location.into(),
        })
    }

    /// The optional entry points provided by the module.
    pub fn exports(&self) -> Exports {
        self.exports
    }

    /// Where the module was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub(crate) fn engine(&self) -> &wasmtime::Engine {
        &self.engine
    }

    pub(crate) fn module(&self) -> &wasmtime::Module {
        &self.module
    }
}

/// Checks that `wasm` is a valid module that only imports functions the host provides, and finds
/// out which entry points it exports.
fn inspect(location: &str, wasm: &[u8]) -> Result<Exports, LoadError> {
    use wasmparser::{ExternalKind, Payload, TypeRef};

    let malformed = |e: wasmparser::BinaryReaderError| {
        LoadError::with_cause(location, LoadErrorKind::Malformed, e)
    };

    wasmparser::Validator::new()
        .validate_all(wasm)
        .map_err(malformed)?;

    let mut exports = Exports::default();
    let mut has_memory = false;
    let mut has_alloc = false;

    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        match payload.map_err(malformed)? {
            Payload::ImportSection(section) => {
                for import in section {
                    let import = import.map_err(malformed)?;
                    let known = import.module == abi::IMPORT_MODULE
                        && abi::IMPORTS.contains(&import.name)
                        && matches!(import.ty, TypeRef::Func(_));

                    if !known {
                        return Err(LoadError::new(
                            location,
                            LoadErrorKind::UnknownImport {
                                module: import.module.to_string(),
                                name: import.name.to_string(),
                            },
                        ));
                    }
                }
            }
            Payload::ExportSection(section) => {
                for export in section {
                    let export = export.map_err(malformed)?;
                    match (export.name, export.kind) {
                        (abi::MEMORY, ExternalKind::Memory) => has_memory = true,
                        (abi::ALLOC, ExternalKind::Func) => has_alloc = true,
                        (abi::VALIDATE_PATH, ExternalKind::Func) => exports.path = true,
                        (abi::VALIDATE_ARCHIVE, ExternalKind::Func) => exports.archive = true,
                        (abi::VALIDATE_READER, ExternalKind::Func) => exports.reader = true,
                        (abi::STOP, ExternalKind::Func) => exports.stop = true,
                        _ => (),
                    }
                }
            }
            _ => (),
        }
    }

    if !has_memory {
        return Err(LoadError::new(location, LoadErrorKind::MissingExport(abi::MEMORY)));
    }

    if !has_alloc {
        return Err(LoadError::new(location, LoadErrorKind::MissingExport(abi::ALLOC)));
    }

    if !exports.any_entry_point() {
        return Err(LoadError::new(location, LoadErrorKind::NoEntryPoints));
    }

    Ok(exports)
}
