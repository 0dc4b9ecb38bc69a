pub mod env;
pub mod loader;

pub use env::substitute_env_vars;
pub use loader::{MANIFEST_FILE, load_config, load_config_with, load_or_scan, scan_directory};
