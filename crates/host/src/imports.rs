//! The host functions linked into every validation module instance.

use crate::{abi, ValidationError, ValidationErrors};
use anyhow::Context as _;
use std::io::{Read, Seek, SeekFrom};
use wasmtime::{Caller, Extern, Linker};

/// Host services granted to a validation module instance.
///
/// The timing, randomness, logging and reporting imports are always available. Filesystem access
/// is only granted when requested, which is the case for command-line use; instances created to
/// validate in-memory buffers are sandboxed by default.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Capabilities {
    filesystem: bool,
}

impl Capabilities {
    /// Capabilities for validating packages on the local filesystem.
    pub const fn command_line() -> Self {
        Self { filesystem: true }
    }

    /// No filesystem access.
    pub const fn sandboxed() -> Self {
        Self { filesystem: false }
    }

    /// Grants or revokes access to the filesystem through [`abi::FILE_SIZE`] and
    /// [`abi::FILE_READ`].
    pub const fn with_filesystem(self, allowed: bool) -> Self {
        Self {
            filesystem: allowed,
        }
    }

    /// Whether filesystem access is granted.
    pub const fn filesystem(&self) -> bool {
        self.filesystem
    }
}

/// A package archive that can be read at arbitrary offsets.
pub(crate) trait ArchiveSource: Read + Seek + Send {}

impl<R: Read + Seek + Send> ArchiveSource for R {}

/// State owned by the [`wasmtime::Store`] of a single instance.
pub(crate) struct HostState {
    capabilities: Capabilities,
    started: std::time::Instant,
    diagnostics: ValidationErrors,
    reader: Option<Box<dyn ArchiveSource>>,
}

impl HostState {
    pub(crate) fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            started: std::time::Instant::now(),
            diagnostics: ValidationErrors::new(),
            reader: None,
        }
    }

    pub(crate) fn take_diagnostics(&mut self) -> ValidationErrors {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn attach_reader(&mut self, reader: Box<dyn ArchiveSource>) {
        self.reader = Some(reader);
    }

    pub(crate) fn detach_reader(&mut self) {
        self.reader = None;
    }
}

fn guest_range(ptr: i32, len: i32) -> anyhow::Result<std::ops::Range<usize>> {
    let start = ptr as u32 as usize;
    let end = start
        .checked_add(len as u32 as usize)
        .with_context(|| format!("region at {start:#X} with length {len} overflows"))?;
    Ok(start..end)
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> anyhow::Result<wasmtime::Memory> {
    match caller.get_export(abi::MEMORY) {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => anyhow::bail!("module does not export {:?}", abi::MEMORY),
    }
}

/// Borrows a region of linear memory, failing if any part of it is out of bounds.
fn guest_bytes_mut<'a>(
    caller: &'a mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> anyhow::Result<&'a mut [u8]> {
    let memory = guest_memory(caller)?;
    let range = guest_range(ptr, len)?;
    let size = memory.data_size(&*caller);
    memory.data_mut(caller).get_mut(range.clone()).with_context(|| {
        format!(
            "region {:#X}..{:#X} is outside of the {size} bytes of linear memory",
            range.start, range.end
        )
    })
}

fn read_string(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> anyhow::Result<String> {
    let memory = guest_memory(caller)?;
    let range = guest_range(ptr, len)?;
    let bytes = memory
        .data(&*caller)
        .get(range.clone())
        .with_context(|| {
            format!(
                "string at {:#X}..{:#X} is out of bounds",
                range.start, range.end
            )
        })?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn write_bytes(caller: &mut Caller<'_, HostState>, ptr: i32, bytes: &[u8]) -> anyhow::Result<()> {
    let memory = guest_memory(caller)?;
    memory
        .write(&mut *caller, ptr as u32 as usize, bytes)
        .with_context(|| format!("could not write {} bytes at {ptr:#X}", bytes.len()))
}

/// Reads up to `len` bytes starting at `offset`, stopping early only at the end of the source.
///
/// Callers check that `len` bytes fit in linear memory first, which bounds the allocation.
pub(crate) fn read_range<R: Read + Seek + ?Sized>(
    source: &mut R,
    offset: u64,
    len: usize,
) -> std::io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut buffer = Vec::with_capacity(len);
    Read::take(&mut *source, len as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn log_level(level: i32) -> log::Level {
    match level {
        1 => log::Level::Error,
        2 => log::Level::Warn,
        4 => log::Level::Debug,
        5 => log::Level::Trace,
        _ => log::Level::Info,
    }
}

/// Returns the number of bytes written to `dst`, or `-1` if the read failed.
fn copy_read_result(
    caller: &mut Caller<'_, HostState>,
    dst: i32,
    what: &str,
    result: std::io::Result<Vec<u8>>,
) -> anyhow::Result<i32> {
    match result {
        Ok(bytes) => {
            write_bytes(caller, dst, &bytes)?;
            Ok(i32::try_from(bytes.len())?)
        }
        Err(e) => {
            log::debug!("could not read {what}: {e}");
            Ok(-1)
        }
    }
}

/// Creates a [`Linker`] providing every function listed in [`abi::IMPORTS`].
pub(crate) fn linker(engine: &wasmtime::Engine) -> anyhow::Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::NOW_MS,
        |caller: Caller<'_, HostState>| -> f64 {
            caller.data().started.elapsed().as_secs_f64() * 1000.0
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::RANDOM_FILL,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> anyhow::Result<i32> {
            let region = guest_bytes_mut(&mut caller, ptr, len)?;
            if let Err(e) = getrandom::fill(region) {
                log::warn!("could not obtain random bytes: {e}");
                return Ok(-1);
            }

            Ok(0)
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::LOG,
        |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| -> anyhow::Result<()> {
            let message = read_string(&mut caller, ptr, len)?;
            log::log!(target: "pkgspec::guest", log_level(level), "{message}");
            Ok(())
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::REPORT,
        |mut caller: Caller<'_, HostState>,
         code_ptr: i32,
         code_len: i32,
         msg_ptr: i32,
         msg_len: i32|
         -> anyhow::Result<()> {
            let code = read_string(&mut caller, code_ptr, code_len)?;
            let message = read_string(&mut caller, msg_ptr, msg_len)?;
            caller
                .data_mut()
                .diagnostics
                .push(ValidationError::with_code(message, code));
            Ok(())
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::FILE_SIZE,
        |mut caller: Caller<'_, HostState>, path_ptr: i32, path_len: i32| -> anyhow::Result<i64> {
            let path = read_string(&mut caller, path_ptr, path_len)?;
            if !caller.data().capabilities.filesystem() {
                log::debug!("denied filesystem access to {path:?}");
                return Ok(-1);
            }

            match std::fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => {
                    Ok(i64::try_from(metadata.len()).unwrap_or(i64::MAX))
                }
                Ok(_) => {
                    log::debug!("{path:?} is not a file");
                    Ok(-1)
                }
                Err(e) => {
                    log::debug!("could not access {path:?}: {e}");
                    Ok(-1)
                }
            }
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::FILE_READ,
        |mut caller: Caller<'_, HostState>,
         path_ptr: i32,
         path_len: i32,
         offset: i64,
         dst: i32,
         len: i32|
         -> anyhow::Result<i32> {
            let path = read_string(&mut caller, path_ptr, path_len)?;
            guest_bytes_mut(&mut caller, dst, len)?;
            if !caller.data().capabilities.filesystem() {
                log::debug!("denied filesystem access to {path:?}");
                return Ok(-1);
            }

            let Ok(offset) = u64::try_from(offset) else {
                return Ok(-1);
            };

            let result = std::fs::File::open(&path)
                .and_then(|mut file| read_range(&mut file, offset, len as u32 as usize));
            copy_read_result(&mut caller, dst, &path, result)
        },
    )?;

    linker.func_wrap(
        abi::IMPORT_MODULE,
        abi::READER_READ,
        |mut caller: Caller<'_, HostState>,
         offset: i64,
         dst: i32,
         len: i32|
         -> anyhow::Result<i32> {
            guest_bytes_mut(&mut caller, dst, len)?;
            let Ok(offset) = u64::try_from(offset) else {
                return Ok(-1);
            };

            let result = match caller.data_mut().reader.as_mut() {
                Some(reader) => read_range(reader.as_mut(), offset, len as u32 as usize),
                None => {
                    log::debug!("no archive is attached to the instance");
                    return Ok(-1);
                }
            };

            copy_read_result(&mut caller, dst, "archive", result)
        },
    )?;

    Ok(linker)
}
