pub mod queries;
pub mod semver;
pub mod types;

pub use semver::{SemVer, VersionBump};
pub use types::*;
