//! Typed façade over the shim's opaque handles and entry points (component B).

mod error;
mod fake;
mod handles;
mod library;
mod params;
pub mod performance;
mod shim_abi;
mod shim_library;
mod worker;

pub use error::BindingError;
pub use fake::{FakeInferenceLibrary, SharedFakeInferenceLibrary};
pub use handles::{AdaptationId, CancelToken, HandleAllocator, ModelHandle, SessionHandle};
pub use library::InferenceLibrary;
pub use params::{BenchmarkSample, CreateModelParams, ExecuteOptions, LibraryStreamEvent, SafetyTriple};
pub use shim_library::ShimInferenceLibrary;
