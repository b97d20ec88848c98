use pkgspec_host::filter::{ExcludeCheck, Processor};
use pkgspec_host::{Filter, FilterConfig, ValidationError, ValidationErrors};

fn errors() -> ValidationErrors {
    [
        ValidationError::new("field name: Invalid type"),
        ValidationError::with_code("dashboard without filter", "SVR00002"),
        ValidationError::with_code("legacy visualization", "SVR00004"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn display() {
    insta::with_settings!({ prepend_module_to_snapshot => false }, {
        insta::assert_snapshot!("validation_errors", errors().to_string());
    });
}

#[test]
fn display_empty() {
    assert_eq!(ValidationErrors::new().to_string(), "found 0 validation errors");
}

#[test]
fn empty_code_is_no_code() {
    let error = ValidationError::with_code("message", "");
    assert_eq!(error.code(), None);
    assert_eq!(error.to_string(), "message");
}

#[test]
fn exclude_check() {
    let (kept, filtered) = ExcludeCheck::new("SVR00002").process(errors());
    assert_eq!(kept.len(), 2);
    assert_eq!(filtered.iter().next().unwrap().code(), Some("SVR00002"));
}

#[test]
fn exclude_nothing() {
    let (kept, filtered) = ExcludeCheck::new("").process(errors());
    assert_eq!(kept, errors());
    assert!(filtered.is_empty());
}

#[test]
fn chain() {
    let filter = Filter::new()
        .exclude_check("SVR00002")
        .exclude_check("SVR00004");

    let (remaining, filtered) = filter.run(errors());
    let remaining = remaining.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.iter().next().unwrap().code(), None);
    assert_eq!(filtered.unwrap().len(), 2);
}

#[test]
fn everything_filtered() {
    let filter = Filter::new().exclude_check("SVR00002");
    let errors: ValidationErrors = [ValidationError::with_code("a", "SVR00002")]
        .into_iter()
        .collect();

    let (remaining, filtered) = filter.run(errors);
    assert!(remaining.is_none());
    assert_eq!(filtered.unwrap().len(), 1);
}

#[test]
fn config_from_yaml() {
    let config = FilterConfig::from_yaml(
        "errors:
  exclude_checks:
    - SVR00002
    - SVR00004
",
    )
    .unwrap();

    assert_eq!(config.errors.exclude_checks, ["SVR00002", "SVR00004"]);

    let (remaining, _) = Filter::from_config(&config).run(errors());
    assert_eq!(remaining.unwrap().len(), 1);
}

#[test]
fn config_without_processors() {
    let config = FilterConfig::from_yaml("errors: {}").unwrap();
    assert!(Filter::from_config(&config).is_empty());
}

#[test]
fn config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("validation.yml");

    let error = FilterConfig::load(&path).unwrap_err();
    assert!(error.to_string().starts_with("failed to read config file"), "{error}");

    std::fs::write(&path, "errors: [not, a, map]").unwrap();
    let error = FilterConfig::load(&path).unwrap_err();
    assert!(error.to_string().starts_with("failed to parse config file"), "{error}");

    std::fs::write(&path, "errors:\n  exclude_checks: [SVR00001]\n").unwrap();
    let config = FilterConfig::load(&path).unwrap().exclude_checks(["SVR00003"]);
    assert_eq!(config.errors.exclude_checks, ["SVR00001", "SVR00003"]);
}
