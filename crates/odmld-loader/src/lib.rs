mod error;
mod installer;
mod loader;
mod record;

pub use error::LoaderError;
pub use installer::{DlcInstaller, DlcState, DlcStateQuery, FixedRootInstaller};
pub use loader::{load_model_result_of, PlatformModelLoader};
pub use record::PlatformModelRecord;
