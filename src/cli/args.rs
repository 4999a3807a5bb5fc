//! Command line argument parsing

use crate::js::{AssemblyOptions, SafetyMode};
use crate::platform::PlayerConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Player script slicer - extracts and runs the signature and n transforms
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Locally saved player script
    pub player: PathBuf,

    /// Player id (derived from the path when omitted)
    #[arg(long, value_name = "ID")]
    pub version_id: Option<String>,

    /// Scrambled signature to decipher
    #[arg(long, value_name = "S")]
    pub sig: Option<String>,

    /// n parameter to transform
    #[arg(long, value_name = "N")]
    pub n: Option<String>,

    /// Direct format URL to rewrite
    #[arg(long, value_name = "URL", conflicts_with = "cipher")]
    pub url: Option<String>,

    /// URL-encoded signature bundle (url=...&s=...&sp=...)
    #[arg(long, value_name = "BUNDLE")]
    pub cipher: Option<String>,

    /// Proof-of-origin token appended to the rewritten URL
    #[arg(long, value_name = "TOKEN")]
    pub pot: Option<String>,

    /// Side-effect filtering for emitted dependencies
    #[arg(long, value_enum, default_value = "strict")]
    pub safety: SafetyArg,

    /// Predeclare every emitted variable at the top of the script
    #[arg(long)]
    pub force_predeclare: bool,

    /// Print the assembled script
    #[arg(long)]
    pub print_script: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// How long an extracted player stays cached (e.g., 24h, 30m)
    #[arg(long, value_name = "DURATION", default_value = "24h")]
    pub cache_ttl: humantime::Duration,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Safety filter selection
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SafetyArg {
    /// Only side-effect-free forms
    Strict,
    /// Also member reads, conditionals and computed calls
    Loose,
    /// Emit every dependency verbatim
    Off,
}

impl From<SafetyArg> for Option<SafetyMode> {
    fn from(arg: SafetyArg) -> Self {
        match arg {
            SafetyArg::Strict => Some(SafetyMode::Strict),
            SafetyArg::Loose => Some(SafetyMode::Loose),
            SafetyArg::Off => None,
        }
    }
}

impl Args {
    /// Get cache TTL as Duration
    pub fn cache_ttl_duration(&self) -> Duration {
        self.cache_ttl.into()
    }

    /// Whether any token or locator needs the script engine
    pub fn wants_decipher(&self) -> bool {
        self.sig.is_some() || self.n.is_some() || self.url.is_some() || self.cipher.is_some()
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions::default()
            .with_safety(self.safety.into())
            .with_force_var_predeclaration(self.force_predeclare)
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig::default()
            .with_cache_ttl(self.cache_ttl_duration())
            .with_assembly(self.assembly_options())
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}
