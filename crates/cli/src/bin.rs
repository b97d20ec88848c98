//! The `pkgspec-validate` command line interface.

use pkgspec_host::{
    ArtifactSource, Capabilities, Console, Error, Filter, FilterConfig, Relay, Session,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Returned when the arguments or the filter configuration are invalid.
const USAGE: u8 = 1;

/// Returned when the package was rejected.
const REJECTED: u8 = 1;

/// Returned when the validation module could not be loaded or run, or could not read the package.
const FAILED: u8 = 2;

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Arguments {
    /// Path to the WebAssembly validation module.
    #[arg(long, env = "PKGSPEC_VALIDATOR_MODULE", default_value = "validator.wasm")]
    module: PathBuf,
    /// Downloads the validation module from the given URL instead of reading `--module`.
    #[arg(long)]
    #[cfg(feature = "fetch")]
    module_url: Option<String>,
    /// Reads the whole package into memory, so the validation module is not given access to the
    /// filesystem.
    #[arg(long)]
    from_buffer: bool,
    /// Path to a YAML file configuring which validation errors are excluded.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Codes of the checks whose errors are excluded, separated by commas.
    #[arg(long, value_delimiter = ',')]
    exclude_checks: Vec<String>,
    /// Path to the package archive.
    package: Option<PathBuf>,
}

impl Arguments {
    fn module_source(&self) -> ArtifactSource {
        #[cfg(feature = "fetch")]
        if let Some(url) = &self.module_url {
            return ArtifactSource::Url(url.clone());
        }

        ArtifactSource::Path(self.module.clone())
    }

    fn filter(&self) -> anyhow::Result<Filter> {
        let config = match &self.config {
            Some(path) => FilterConfig::load(path)?,
            None => FilterConfig::default(),
        };

        Ok(Filter::from_config(
            &config.exclude_checks(self.exclude_checks.iter().cloned()),
        ))
    }
}

fn exit_code(outcome: &pkgspec_host::Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_rejection() => ExitCode::from(REJECTED),
        Err(_) => ExitCode::from(FAILED),
    }
}

fn validate(arguments: &Arguments, package: PathBuf, filter: Filter) -> pkgspec_host::Result<()> {
    let session = Session::from_source(arguments.module_source())
        .filter(filter)
        .on_transition(|phase| log::trace!("validation {phase}"));

    if !arguments.from_buffer {
        return session
            .capabilities(Capabilities::command_line())
            .run(|validator| validator.validate_from_path(&package));
    }

    let buffer = std::fs::read(&package).map_err(|e| {
        Error::InvalidInput(format!("could not read package {}: {e}", package.display()))
    })?;
    let name = package.display().to_string();
    let size = buffer.len() as u64;

    session.capabilities(Capabilities::sandboxed()).run(|validator| {
        validator.validate_from_reader(&name, size, std::io::Cursor::new(buffer))
    })
}

pub fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let arguments = match <Arguments as clap::Parser>::try_parse() {
        Ok(arguments) => arguments,
        Err(e) if e.use_stderr() => {
            if let Err(print_error) = e.print() {
                log::error!("could not print usage error: {print_error}");
            }

            return ExitCode::from(USAGE);
        }
        Err(e) => e.exit(),
    };

    let Some(package) = arguments.package.clone() else {
        let program = std::env::args().next();
        eprintln!(
            "usage: {} [package path]",
            program.as_deref().unwrap_or("pkgspec-validate")
        );
        return ExitCode::from(USAGE);
    };

    let filter = match arguments.filter() {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(USAGE);
        }
    };

    let outcome = validate(&arguments, package, filter);
    let code = exit_code(&outcome);
    Console::stdio().relay(outcome);
    code
}
