//! # Framelink Configuration
//!
//! Settings for the server and client roles plus process logging setup.
//!
//! Two file formats are accepted:
//!
//! - `*.toml`, loaded through the `config` crate with `FRAMELINK_*`
//!   environment overrides
//! - anything else is read as line-oriented `key=value` input
//!   (`server_input.txt`, `client_input.txt`)
//!
//! ```no_run
//! use framelink_config::{load_settings, ServerSettings};
//! use std::path::Path;
//!
//! let settings: ServerSettings = load_settings(Path::new("server_input.txt"))?;
//! let (settings, tls_corrected) = settings.normalized();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod input_file;
pub mod logging;
pub mod settings;

pub use logging::init_logging;
pub use settings::{
    default_address, load_settings, ClientSettings, ServerSettings, Settings, ENV_PREFIX,
};
