//! Compile-and-run abstraction for assembled scripts

use crate::error::SliceError;
use crate::Result;
use deno_core::{FastString, JsRuntime, RuntimeOptions};
use tracing::debug;

/// Runs a complete program and returns its completion value as a string.
///
/// Every call must start from a clean global scope.
pub trait ScriptEngine: Send + Sync {
    fn run(&self, program: &str) -> Result<String>;
}

/// V8 through `deno_core`, with a fresh runtime per call
#[derive(Debug, Clone, Copy, Default)]
pub struct DenoEngine;

impl DenoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptEngine for DenoEngine {
    fn run(&self, program: &str) -> Result<String> {
        debug!("Executing program ({} chars)", program.len());
        let mut runtime = JsRuntime::new(RuntimeOptions::default());

        let result = runtime
            .execute_script("<decipher>", FastString::from(program.to_string()))
            .map_err(|e| SliceError::Execution(e.to_string()))?;

        let scope = &mut runtime.handle_scope();
        let value = result.open(scope);
        if !value.is_string() {
            return Err(SliceError::NonStringResult(
                value.to_rust_string_lossy(scope),
            ));
        }
        Ok(value.to_rust_string_lossy(scope))
    }
}
