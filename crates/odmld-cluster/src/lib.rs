mod clustering;
mod error;
mod linkage;
mod tree;
mod types;

pub use clustering::AgglomerativeClustering;
pub use error::ClusterError;
pub use types::{Distance, Groups, LinkageType, Matrix};
