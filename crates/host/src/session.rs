use crate::{Artifact, ArtifactSource, Capabilities, Filter, Relay, Result, Validator};

/// The stages a [`Session`] goes through.
///
/// Every session starts in [`Phase::Idle`] and ends in [`Phase::Stopped`], reached from either
/// [`Phase::Succeeded`] or [`Phase::Failed`]. A module that fails to load goes directly from
/// [`Phase::Loading`] to [`Phase::Failed`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// The module is being read, compiled, and instantiated.
    Loading,
    /// An instance is running.
    Instantiated,
    /// An entry point of the instance was called.
    Validating,
    /// The package was accepted.
    Succeeded,
    /// The package was rejected, or the module could not be loaded or run.
    Failed,
    /// The instance was released.
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Instantiated => "instantiated",
            Self::Validating => "validating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        })
    }
}

enum Module<'a> {
    Compiled(&'a Artifact),
    Source(ArtifactSource),
}

/// Drives a single validation from loading the module to releasing the instance.
///
/// # Example
///
/// ```no_run
/// use pkgspec_host::{ArtifactSource, Capabilities, Console, Session};
///
/// Session::from_source(ArtifactSource::Path("validator.wasm".into()))
///     .capabilities(Capabilities::command_line())
///     .relay(|validator| validator.validate_from_path("package.zip"), Console::stdio());
/// ```
pub struct Session<'a> {
    module: Module<'a>,
    capabilities: Capabilities,
    filter: Filter,
    observer: Option<Box<dyn FnMut(Phase) + 'a>>,
    phase: Phase,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("location", &self.location())
            .field("capabilities", &self.capabilities)
            .field("filter", &self.filter)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'a> Session<'a> {
    fn with_module(module: Module<'a>) -> Self {
        Self {
            module,
            capabilities: Capabilities::default(),
            filter: Filter::new(),
            observer: None,
            phase: Phase::Idle,
        }
    }

    /// Creates a session that instantiates an already compiled [`Artifact`].
    pub fn new(artifact: &'a Artifact) -> Self {
        Self::with_module(Module::Compiled(artifact))
    }

    /// Creates a session that loads the module from the given source when it is run.
    pub fn from_source(source: ArtifactSource) -> Self {
        Self::with_module(Module::Source(source))
    }

    /// Sets the host services available to the instance. Defaults to
    /// [`Capabilities::sandboxed()`].
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the [`Filter`] applied to the errors of a rejected package.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Registers a closure called on every [`Phase`] transition.
    pub fn on_transition(mut self, observer: impl FnMut(Phase) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn location(&self) -> String {
        match &self.module {
            Module::Compiled(artifact) => artifact.location().to_string(),
            Module::Source(source) => source.location(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("session {} -> {}", self.phase, phase);
        self.phase = phase;
        if let Some(observer) = self.observer.as_mut() {
            observer(phase);
        }
    }

    fn instantiate(&self) -> Result<Validator> {
        let validator = match &self.module {
            Module::Compiled(artifact) => Validator::instantiate(artifact, self.capabilities)?,
            Module::Source(source) => {
                Validator::instantiate(&Artifact::load(source)?, self.capabilities)?
            }
        };

        Ok(validator.with_filter(self.filter.clone()))
    }

    /// Instantiates the module, passes the instance to `validate`, and stops the instance.
    ///
    /// The returned outcome is available only once the instance was released. If `validate`
    /// succeeds but stopping the instance fails, the stop error is returned. If both fail, the
    /// stop error is logged and the validation error is returned.
    pub fn run<F>(mut self, validate: F) -> Result<()>
    where
        F: FnOnce(&mut Validator) -> Result<()>,
    {
        self.enter(Phase::Loading);
        let mut validator = match self.instantiate() {
            Ok(validator) => validator,
            Err(error) => {
                self.enter(Phase::Failed);
                self.enter(Phase::Stopped);
                return Err(error);
            }
        };

        self.enter(Phase::Instantiated);
        self.enter(Phase::Validating);
        let outcome = validate(&mut validator);
        self.enter(if outcome.is_ok() {
            Phase::Succeeded
        } else {
            Phase::Failed
        });

        let stopped = validator.stop();
        self.enter(Phase::Stopped);
        match (outcome, stopped) {
            (Err(error), Err(stop_error)) => {
                log::warn!("error while stopping validation module: {stop_error}");
                Err(error)
            }
            (outcome, stopped) => outcome.and(stopped),
        }
    }

    /// Like [`Session::run()`], but hands the outcome to a [`Relay`].
    pub fn relay<F, R>(self, validate: F, relay: R)
    where
        F: FnOnce(&mut Validator) -> Result<()>,
        R: Relay,
    {
        relay.relay(self.run(validate))
    }
}
