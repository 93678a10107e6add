//! Role Settings
//!
//! [`ServerSettings`] and [`ClientSettings`] with the defaults the binaries
//! start from. [`load_settings`] picks the file format by extension.

use crate::input_file::{flag, pairs};
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use framelink_network::SocketMode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for TOML overrides (`FRAMELINK_ADDRESS`, ...)
pub const ENV_PREFIX: &str = "FRAMELINK";

/// Address used when none is configured
pub fn default_address(mode: SocketMode) -> &'static str {
    match mode {
        SocketMode::Unix => "/tmp/server.sock",
        SocketMode::Inet => "localhost:8080",
    }
}

/// Settings that can be filled from `key=value` input
pub trait Settings: DeserializeOwned + Default {
    /// Apply one pair; unknown keys are ignored
    fn apply_pair(&mut self, key: &str, value: &str);
}

/// Load settings from `path`
///
/// `.toml` files go through the `config` crate with `FRAMELINK_*`
/// environment overrides; anything else is parsed as `key=value` input.
pub fn load_settings<T: Settings>(path: &Path) -> Result<T> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => load_toml(path),
        _ => load_input_file(path),
    }
}

fn load_toml<T: Settings>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "Loading TOML settings");
    let config = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

fn load_input_file<T: Settings>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "Loading key=value settings");
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut settings = T::default();
    for (key, value) in pairs(&contents) {
        settings.apply_pair(key, value);
    }
    Ok(settings)
}

fn apply_mode(mode: &mut SocketMode, value: &str) {
    // unknown modes keep the current value
    if let Ok(parsed) = value.parse() {
        *mode = parsed;
    }
}

/// Server role settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub mode: SocketMode,
    /// Socket path or `host[:port]`; defaults by mode when unset
    pub address: Option<String>,
    pub tls: bool,
    /// Log file; metrics report is appended here on exit
    pub output: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            mode: SocketMode::Inet,
            address: None,
            tls: false,
            output: PathBuf::from("server_output.txt"),
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> &str {
        self.address
            .as_deref()
            .unwrap_or_else(|| default_address(self.mode))
    }

    /// Apply the Unix/TLS policy; the flag reports whether TLS was turned off
    pub fn normalized(mut self) -> (Self, bool) {
        let (tls, corrected) = self.mode.effective_tls(self.tls);
        self.tls = tls;
        (self, corrected)
    }
}

impl Settings for ServerSettings {
    fn apply_pair(&mut self, key: &str, value: &str) {
        match key {
            "mode" => apply_mode(&mut self.mode, value),
            "address" => self.address = Some(value.to_string()),
            "tls" => self.tls = flag(value),
            "output" => self.output = PathBuf::from(value),
            _ => {}
        }
    }
}

/// Client role settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub mode: SocketMode,
    pub address: Option<String>,
    pub tls: bool,
    /// Socket deadline in seconds; 0 disables it
    pub timeout_secs: u64,
    /// Read messages from stdin instead of `messages`
    #[serde(alias = "free_input")]
    pub interactive: bool,
    /// Scripted messages, sent in order
    pub messages: Vec<String>,
    pub output: PathBuf,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            mode: SocketMode::Inet,
            address: None,
            tls: false,
            timeout_secs: 5,
            interactive: false,
            messages: Vec::new(),
            output: PathBuf::from("client_output.txt"),
        }
    }
}

impl ClientSettings {
    pub fn address(&self) -> &str {
        self.address
            .as_deref()
            .unwrap_or_else(|| default_address(self.mode))
    }

    /// Apply the Unix/TLS policy; the flag reports whether TLS was turned off
    pub fn normalized(mut self) -> (Self, bool) {
        let (tls, corrected) = self.mode.effective_tls(self.tls);
        self.tls = tls;
        (self, corrected)
    }
}

impl Settings for ClientSettings {
    fn apply_pair(&mut self, key: &str, value: &str) {
        match key {
            "mode" => apply_mode(&mut self.mode, value),
            "address" => self.address = Some(value.to_string()),
            "tls" => self.tls = flag(value),
            "free_input" | "interactive" => self.interactive = flag(value),
            "message" => self.messages.push(value.to_string()),
            "timeout" => {
                if let Ok(secs) = value.trim().parse() {
                    self.timeout_secs = secs;
                }
            }
            "output" => self.output = PathBuf::from(value),
            _ => {}
        }
    }
}
