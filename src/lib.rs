//! # sigslice - player script slicer
//!
//! Statically extracts the signature decipher and n-transform functions from
//! an obfuscated player script, assembles them with their dependencies into a
//! small standalone script, and runs that script to rewrite format URLs.
//!
//! ## Features
//!
//! - Single-pass scope and dependency analysis over the player module
//! - Structural matchers for the signature, n-transform and timestamp
//! - Side-effect filtering of emitted dependencies
//! - Per-version caching of generated scripts
//! - Isolated V8 execution through `deno_core`
//!
//! ## Example
//!
//! ```rust,no_run
//! use sigslice::platform::{
//!     DecipherRequest, Decipherer, DenoEngine, FilePlayerSource, FormatLocator, PlayerCache,
//!     PlayerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = PlayerCache::new(PlayerConfig::default());
//!     let data = cache.get_or_extract(&FilePlayerSource::new("base.js")).await?;
//!
//!     let locator = FormatLocator::parse("s=ABCDEF&url=https%3A%2F%2Fexample.com%2Fvideoplayback")?;
//!     let url = Decipherer::new(DenoEngine::new())
//!         .decipher(&data.script, &DecipherRequest::new(locator))?;
//!     println!("{}", url);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod js;
pub mod platform;
pub mod utils;

// Re-export main types
pub use error::SliceError;
pub use js::{slice_player, AssemblyOptions, ExtractionReport, GeneratedScript, SafetyMode};
pub use platform::{Decipherer, DenoEngine, PlayerCache, PlayerConfig, PlayerData, ScriptEngine};

/// Result type alias for sigslice operations
pub type Result<T> = std::result::Result<T, SliceError>;
