//! Deferred-capability loader for the shim dynamic library (component A).

mod combinator;
mod error;
mod installer;
mod loader;

pub use combinator::with_shim_ready;
pub use error::ShimError;
pub use installer::{FailingInstaller, FixedPathInstaller, ShimInstaller};
pub use loader::ShimLoader;
