use pkgspec_host::{abi, Capabilities, Error, Filter, Validator};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn sandboxed() -> Validator {
    Validator::instantiate(&crate::guest(), Capabilities::sandboxed()).unwrap()
}

fn codes(error: &Error) -> Vec<Option<&str>> {
    error
        .validation_errors()
        .unwrap_or_else(|| panic!("expected a rejection, got {error:?}"))
        .iter()
        .map(|error| error.code())
        .collect()
}

#[test]
fn archive_accepted() {
    let mut validator = sandboxed();
    assert!(validator.validate_from_archive("pkg.zip", crate::VALID).is_ok());
    validator.stop().unwrap();
}

#[test]
fn archive_rejected() {
    let mut validator = sandboxed();
    let error = validator
        .validate_from_archive("pkg.zip", crate::NOT_ZIP)
        .unwrap_err();

    assert!(error.is_rejection());
    assert_eq!(codes(&error), [Some("PKG00001")]);
    assert_eq!(
        error.to_string(),
        "found 1 validation error:\n   1. not a zip archive (PKG00001)\n"
    );
    validator.stop().unwrap();
}

#[test]
fn empty_archive_rejected() {
    let mut validator = sandboxed();
    let error = validator.validate_from_archive("", &[]).unwrap_err();
    assert_eq!(codes(&error), [Some("PKG00001")]);
}

#[test]
fn single_use_instance() {
    let mut validator = sandboxed();
    validator
        .validate_from_archive("first.zip", crate::VALID)
        .unwrap();

    let error = validator
        .validate_from_archive("second.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)), "{error:?}");

    let error = validator
        .validate_from_reader("third.zip", 0, std::io::Cursor::new(Vec::new()))
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)), "{error:?}");
    validator.stop().unwrap();
}

#[test]
fn rejected_instance_is_not_reused() {
    let mut validator = sandboxed();
    assert!(validator
        .validate_from_archive("first.zip", crate::NOT_ZIP)
        .unwrap_err()
        .is_rejection());

    let error = validator
        .validate_from_archive("second.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)), "{error:?}");
}

#[test]
fn path_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("package.zip");
    std::fs::write(&path, crate::VALID).unwrap();

    let mut validator =
        Validator::instantiate(&crate::guest(), Capabilities::command_line()).unwrap();
    validator.validate_from_path(&path).unwrap();
    validator.stop().unwrap();
}

#[test]
fn path_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut validator =
        Validator::instantiate(&crate::guest(), Capabilities::command_line()).unwrap();

    let error = validator
        .validate_from_path(dir.path().join("missing.zip"))
        .unwrap_err();
    assert_eq!(codes(&error), [None]);
    assert_eq!(
        error.to_string(),
        "found 1 validation error:\n   1. failed to open zip file\n"
    );
}

#[test]
fn path_requires_filesystem_access() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("package.zip");
    std::fs::write(&path, crate::VALID).unwrap();

    let error = sandboxed().validate_from_path(&path).unwrap_err();
    assert!(error.is_rejection(), "{error:?}");
}

#[test]
fn empty_path() {
    let error = Validator::instantiate(&crate::guest(), Capabilities::command_line())
        .unwrap()
        .validate_from_path("")
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)), "{error:?}");
}

/// Counts the number of bytes read from the wrapped source.
struct CountingReader<R> {
    inner: R,
    read: Arc<AtomicUsize>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.read.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn reader_is_read_lazily() {
    let mut archive = crate::VALID.to_vec();
    archive.resize(1024 * 1024, 0);
    let size = archive.len() as u64;

    let read = Arc::new(AtomicUsize::new(0));
    let reader = CountingReader {
        inner: std::io::Cursor::new(archive),
        read: read.clone(),
    };

    let mut validator = sandboxed();
    validator
        .validate_from_reader("large.zip", size, reader)
        .unwrap();
    assert_eq!(read.load(Ordering::Relaxed), 8);
}

#[test]
fn reader_rejected() {
    let error = sandboxed()
        .validate_from_reader(
            "dashboard.zip",
            crate::DASHBOARD.len() as u64,
            std::io::Cursor::new(crate::DASHBOARD),
        )
        .unwrap_err();
    assert_eq!(codes(&error), [Some("SVR00002")]);
}

#[test]
fn filtered_rejection_is_success() {
    let mut validator = sandboxed().with_filter(Filter::new().exclude_check("SVR00002"));
    validator
        .validate_from_archive("dashboard.zip", crate::DASHBOARD)
        .unwrap();
}

#[test]
fn filter_keeps_other_codes() {
    let mut validator = sandboxed().with_filter(Filter::new().exclude_check("SVR00002"));
    let error = validator
        .validate_from_archive("pkg.zip", crate::NOT_ZIP)
        .unwrap_err();
    assert_eq!(codes(&error), [Some("PKG00001")]);
}

const ARCHIVE_ONLY: &str = r#"(module
    (memory (export "memory") 1)
    (func (export "pkgspec_alloc") (param i32) (result i32) i32.const 64)
    (func (export "pkgspec_validate_archive") (param i32 i32 i32 i32) (result i32)
        local.get 3))
"#;

#[test]
fn unsupported_entry_point() {
    let artifact = crate::compile("archive_only", ARCHIVE_ONLY).unwrap();
    let mut validator = Validator::instantiate(&artifact, Capabilities::command_line()).unwrap();

    let error = validator.validate_from_path("package.zip").unwrap_err();
    assert!(matches!(error, Error::Unsupported(abi::VALIDATE_PATH)), "{error:?}");

    // The instance is still unused.
    validator.validate_from_archive("empty.zip", &[]).unwrap();
}

#[test]
fn unknown_status() {
    // Returns the length of the archive as the status.
    let artifact = crate::compile("archive_only", ARCHIVE_ONLY).unwrap();
    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();

    let error = validator
        .validate_from_archive("seven.zip", b"1234567")
        .unwrap_err();
    assert!(matches!(error, Error::Aborted(_)), "{error:?}");
}

#[test]
fn rejection_without_reason() {
    let artifact = crate::compile("archive_only", ARCHIVE_ONLY).unwrap();
    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();

    let error = validator.validate_from_archive("one.zip", b"1").unwrap_err();
    assert_eq!(codes(&error), [None]);
}

#[test]
fn trap_is_aborted() {
    let artifact = crate::compile(
        "trap",
        r#"(module
    (memory (export "memory") 1)
    (func (export "pkgspec_alloc") (param i32) (result i32) i32.const 64)
    (func (export "pkgspec_validate_archive") (param i32 i32 i32 i32) (result i32)
        unreachable))
"#,
    )
    .unwrap();

    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();
    let error = validator
        .validate_from_archive("pkg.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::Aborted(_)), "{error:?}");
    assert!(!error.is_rejection());
    validator.stop().unwrap();
}

#[test]
fn errors_reported_before_trap_are_discarded() {
    // Reports an error on the first call and then traps. Later calls reject without reporting.
    let artifact = crate::compile(
        "report_then_trap",
        r#"(module
    (import "pkgspec" "report" (func $report (param i32 i32 i32 i32)))
    (memory (export "memory") 1)
    (data (i32.const 0) "stale")
    (global $calls (mut i32) (i32.const 0))
    (func (export "pkgspec_alloc") (param i32) (result i32) i32.const 64)
    (func (export "pkgspec_validate_archive") (param i32 i32 i32 i32) (result i32)
        (global.set $calls (i32.add (global.get $calls) (i32.const 1)))
        (if (i32.eq (global.get $calls) (i32.const 1))
            (then
                (call $report (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 5))
                unreachable))
        i32.const 1))
"#,
    )
    .unwrap();

    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();
    let error = validator
        .validate_from_archive("first.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::Aborted(_)), "{error:?}");
    assert!(error.validation_errors().is_none());

    let error = validator
        .validate_from_archive("second.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)), "{error:?}");
    assert!(!error.to_string().contains("stale"), "{error}");
}

#[test]
fn out_of_bounds_report_is_aborted() {
    let artifact = crate::compile(
        "out_of_bounds",
        r#"(module
    (import "pkgspec" "report" (func $report (param i32 i32 i32 i32)))
    (memory (export "memory") 1)
    (func (export "pkgspec_alloc") (param i32) (result i32) i32.const 64)
    (func (export "pkgspec_validate_archive") (param i32 i32 i32 i32) (result i32)
        (call $report (i32.const 0) (i32.const 0) (i32.const 65530) (i32.const 100))
        i32.const 1))
"#,
    )
    .unwrap();

    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();
    let error = validator
        .validate_from_archive("pkg.zip", crate::VALID)
        .unwrap_err();
    assert!(matches!(error, Error::Aborted(_)), "{error:?}");
}
