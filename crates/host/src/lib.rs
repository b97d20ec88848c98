//! Host runtime for WebAssembly package validation modules.
//!
//! A *validation module* is a precompiled WebAssembly binary that checks package archives against
//! the package specification. This crate does not know the validation rules; it only knows how to
//! load such a module, hand it a package, and report what it said. The contract between the two
//! sides is described in the [`abi`] module.
//!
//! The lifecycle of a single invocation is:
//!
//! 1. Obtain an [`Artifact`], the compiled form of the module, from a file, a buffer, or (with
//!    the [`fetch`](crate#fetch) feature) a URL. An [`Artifact`] can be shared by any number of
//!    invocations.
//! 2. Instantiate a [`Validator`] from the [`Artifact`]. Each invocation gets its own instance.
//! 3. Call exactly one of the facade entry points, such as [`Validator::validate_from_path()`].
//! 4. Hand the outcome to a [`Relay`], which prints it or invokes a callback.
//! 5. [`stop`](Validator::stop()) the [`Validator`].
//!
//! [`Session`] drives these steps and guarantees that step 5 happens on every path.
//!
//! # Feature Flags
//!
//! ## `fetch`
//!
//! Allows [`ArtifactSource::Url`], which downloads the module over HTTP using [`ureq`].
//!
//! - Enabled by: `default`
//!
//! [`ureq`]: https://docs.rs/ureq

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::exhaustive_enums)]

pub mod abi;
pub mod filter;
pub mod relay;

mod artifact;
mod diagnostic;
mod error;
mod imports;
mod session;
mod validator;

pub use artifact::{Artifact, ArtifactSource, Exports};
pub use diagnostic::{ValidationError, ValidationErrors};
pub use error::{Error, LoadError, LoadErrorKind, Result};
pub use filter::{Filter, FilterConfig};
pub use imports::Capabilities;
pub use relay::{validate_buffer, Callbacks, Console, Relay};
pub use session::{Phase, Session};
pub use validator::Validator;
