pub mod payload;
pub mod runtime;
pub mod unzip;

pub use payload::{install_payload, mirror_dir, prune_versions, read_version_file, write_version_file};
pub use runtime::{RuntimeAction, RuntimeCheck, RuntimeProvisioner};
pub use unzip::{extract_fresh, extract_package_subtree};
