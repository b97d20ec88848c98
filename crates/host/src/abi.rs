//! Names and constants making up the interface between the host and a validation module.
//!
//! # Exports
//!
//! A validation module must export its linear [`MEMORY`] and an allocator, [`ALLOC`], which the
//! host uses to copy strings and buffers into the module. It must also export at least one of
//! the validate entry points:
//!
//! - [`VALIDATE_PATH`], for packages read through the filesystem imports.
//! - [`VALIDATE_ARCHIVE`], for packages copied whole into linear memory.
//! - [`VALIDATE_READER`], for packages read lazily through [`READER_READ`].
//!
//! Every validate entry point returns one of the [`STATUS_ACCEPTED`] or [`STATUS_REJECTED`]
//! codes. A module may also export [`STOP`], which is called exactly once before the instance is
//! released.
//!
//! # Imports
//!
//! All imports provided by the host live in the [`IMPORT_MODULE`] namespace. Modules are free to
//! import only the ones they use.
//!
//! Strings are exchanged as UTF-8 encoded bytes, identified by a pointer into linear memory and a
//! length in bytes.

/// The namespace of every function provided by the host.
pub const IMPORT_MODULE: &str = "pkgspec";

/// The exported linear memory.
pub const MEMORY: &str = "memory";

/// Allocates memory that the host will write input into.
///
/// # Signature
///
/// ```wat
/// (func (export "pkgspec_alloc") (param $len i32) (result i32))
/// ```
///
/// A returned pointer of `0` indicates that the allocation failed.
pub const ALLOC: &str = "pkgspec_alloc";

/// Validates a package located at a path, read through [`FILE_SIZE`] and [`FILE_READ`].
///
/// # Signature
///
/// ```wat
/// (func (export "pkgspec_validate_path")
///     (param $path_ptr i32)
///     (param $path_len i32)
///     (result i32))
/// ```
pub const VALIDATE_PATH: &str = "pkgspec_validate_path";

/// Validates a package archive whose contents were copied into linear memory.
///
/// # Signature
///
/// ```wat
/// (func (export "pkgspec_validate_archive")
///     (param $name_ptr i32)
///     (param $name_len i32)
///     (param $data_ptr i32)
///     (param $data_len i32)
///     (result i32))
/// ```
pub const VALIDATE_ARCHIVE: &str = "pkgspec_validate_archive";

/// Validates a package archive of a declared size, pulling byte ranges through [`READER_READ`].
///
/// # Signature
///
/// ```wat
/// (func (export "pkgspec_validate_reader")
///     (param $name_ptr i32)
///     (param $name_len i32)
///     (param $size i64)
///     (result i32))
/// ```
pub const VALIDATE_READER: &str = "pkgspec_validate_reader";

/// Called once when the instance is released.
///
/// # Signature
///
/// ```wat
/// (func (export "pkgspec_stop"))
/// ```
pub const STOP: &str = "pkgspec_stop";

/// Returned by a validate entry point when the package conforms to the specification.
pub const STATUS_ACCEPTED: i32 = 0;

/// Returned by a validate entry point when the package was rejected. The reasons are expected to
/// have been passed to [`REPORT`] beforehand.
pub const STATUS_REJECTED: i32 = 1;

/// Returns the number of milliseconds elapsed since the instance was created.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "now_ms" (func (result f64)))
/// ```
pub const NOW_MS: &str = "now_ms";

/// Fills a region of linear memory with random bytes. Returns `0` on success and `-1` on failure.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "random_fill" (func (param $ptr i32) (param $len i32) (result i32)))
/// ```
pub const RANDOM_FILL: &str = "random_fill";

/// Writes a message to the host's log.
///
/// The `level` is one of `1` (error), `2` (warn), `3` (info), `4` (debug) or `5` (trace). Other
/// values are logged at the info level.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "log" (func (param $level i32) (param $ptr i32) (param $len i32)))
/// ```
pub const LOG: &str = "log";

/// Reports a single validation error for the current call. A `code_len` of `0` means the error
/// has no code.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "report" (func
///     (param $code_ptr i32)
///     (param $code_len i32)
///     (param $msg_ptr i32)
///     (param $msg_len i32)))
/// ```
pub const REPORT: &str = "report";

/// Returns the size of a file in bytes, or `-1` if it could not be accessed or if filesystem
/// access was not granted to the instance.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "file_size" (func (param $path_ptr i32) (param $path_len i32) (result i64)))
/// ```
pub const FILE_SIZE: &str = "file_size";

/// Reads up to `len` bytes of a file starting at `offset`, returning the number of bytes read or
/// `-1` on failure.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "file_read" (func
///     (param $path_ptr i32)
///     (param $path_len i32)
///     (param $offset i64)
///     (param $dst i32)
///     (param $len i32)
///     (result i32)))
/// ```
pub const FILE_READ: &str = "file_read";

/// Reads up to `len` bytes of the archive passed to [`VALIDATE_READER`], starting at `offset`.
/// Returns the number of bytes read, or `-1` if no archive is attached or the read failed.
///
/// # Signature
///
/// ```wat
/// (import "pkgspec" "reader_read" (func
///     (param $offset i64)
///     (param $dst i32)
///     (param $len i32)
///     (result i32)))
/// ```
pub const READER_READ: &str = "reader_read";

/// The functions the host knows how to provide.
pub const IMPORTS: &[&str] = &[
    NOW_MS,
    RANDOM_FILL,
    LOG,
    REPORT,
    FILE_SIZE,
    FILE_READ,
    READER_READ,
];
