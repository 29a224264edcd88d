//! Configuration System
//!
//! Translator configuration with hierarchical loading from:
//! - rampart.toml (default configuration)
//! - rampart.local.toml (git-ignored local overrides)
//! - Environment variables (RAMPART_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # rampart.toml
//! fact_dir = "facts"
//! output_dir = "out"
//! provenance = "explain"
//! profile = true
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RAMPART_FACT_DIR=/data/facts
//! RAMPART_PROVENANCE=subtree-heights
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Provenance instrumentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvenanceMode {
    /// Rule-number and level annotations for proof replay
    Explain,
    /// Per-literal subtree-height annotations
    SubtreeHeights,
}

/// Translator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory prefix for default load paths
    #[serde(default = "default_dir")]
    pub fact_dir: String,

    /// Directory prefix for default store paths; the sentinel `-` redirects
    /// every store to standard output
    #[serde(default = "default_dir")]
    pub output_dir: String,

    /// Provenance mode; absent disables provenance entirely
    #[serde(default)]
    pub provenance: Option<ProvenanceMode>,

    /// Insert log-timer and log-relation wrappers around statements and
    /// frequency annotations on scans
    #[serde(default)]
    pub profile: bool,

    /// Emit a timed debug-report section with the pretty-printed RAM
    /// program, written to this path
    #[serde(default)]
    pub debug_report: Option<PathBuf>,

    /// Compilation mode: suppresses interpreter-only provenance guards
    #[serde(default)]
    pub compile: bool,

    /// Executable-generation mode: suppresses interpreter-only provenance
    /// guards
    #[serde(default)]
    pub dl_program: bool,

    /// Source-generation mode: suppresses interpreter-only provenance
    /// guards
    #[serde(default)]
    pub generate: bool,
}

fn default_dir() -> String {
    ".".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fact_dir: default_dir(),
            output_dir: default_dir(),
            provenance: None,
            profile: false,
            debug_report: None,
            compile: false,
            dl_program: false,
            generate: false,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. rampart.toml (base configuration)
    /// 2. rampart.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RAMPART_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("rampart.toml"))
            .merge(Toml::file("rampart.local.toml"))
            .merge(Env::prefixed("RAMPART_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAMPART_").split("__"))
            .extract()
    }

    /// Check whether provenance instrumentation is enabled
    pub fn has_provenance(&self) -> bool {
        self.provenance.is_some()
    }

    /// True when translating for the interpreter: none of the compiled
    /// modes is requested, so interpreter-only provenance guards apply.
    pub fn interpreter_mode(&self) -> bool {
        !self.compile && !self.dl_program && !self.generate
    }

    /// True when every store is redirected to standard output
    pub fn stores_to_stdout(&self) -> bool {
        self.output_dir == "-"
    }
}
