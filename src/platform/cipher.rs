//! Signature and n-parameter deciphering against an assembled script

use crate::error::SliceError;
use crate::js::assembler::{GeneratedScript, EXPORTS_BINDING};
use crate::js::extraction::{N_FUNCTION_NAME, SIG_FUNCTION_NAME};
use crate::platform::engine::ScriptEngine;
use crate::utils::url::{query_param, set_query_param};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

/// Query parameter a deciphered signature goes to when none is given
pub const DEFAULT_SIGNATURE_PARAM: &str = "signature";

/// Prefix the player puts on n results when its transform failed
pub const N_ERROR_PREFIX: &str = "enhanced_except_";

/// Query parameter carrying the proof-of-origin token
pub const PO_TOKEN_PARAM: &str = "pot";

/// Where a format's bytes live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatLocator {
    /// Usable URL, possibly carrying an `n` parameter
    Direct { url: String },
    /// URL plus an encrypted signature and the parameter it belongs in
    Cipher {
        url: String,
        s: String,
        sp: Option<String>,
    },
}

impl FormatLocator {
    pub fn direct(url: impl Into<String>) -> Self {
        FormatLocator::Direct { url: url.into() }
    }

    pub fn cipher(url: impl Into<String>, s: impl Into<String>, sp: Option<&str>) -> Self {
        FormatLocator::Cipher {
            url: url.into(),
            s: s.into(),
            sp: sp.map(str::to_string),
        }
    }

    /// Parse either an absolute URL or a `url=..&s=..&sp=..` bundle
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Url::parse(raw)?;
            return Ok(Self::direct(raw));
        }

        let mut location = None;
        let mut s = None;
        let mut sp = None;
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match &*key {
                "url" if location.is_none() => location = Some(value.into_owned()),
                "s" if s.is_none() => s = Some(value.into_owned()),
                "sp" if sp.is_none() => sp = Some(value.into_owned()),
                _ => {}
            }
        }

        let url = location.ok_or_else(|| {
            SliceError::InvalidLocator("Cipher bundle has no url field".to_string())
        })?;
        Url::parse(&url)?;

        Ok(match s {
            Some(s) => FormatLocator::Cipher { url, s, sp },
            None => FormatLocator::Direct { url },
        })
    }

    pub fn url(&self) -> &str {
        match self {
            FormatLocator::Direct { url } | FormatLocator::Cipher { url, .. } => url,
        }
    }

    /// Encrypted signature, if any
    pub fn signature(&self) -> Option<&str> {
        match self {
            FormatLocator::Direct { .. } => None,
            FormatLocator::Cipher { s, .. } => Some(s),
        }
    }

    /// Parameter name the deciphered signature is written to
    pub fn signature_param(&self) -> &str {
        match self {
            FormatLocator::Cipher { sp: Some(sp), .. } if !sp.is_empty() => sp,
            _ => DEFAULT_SIGNATURE_PARAM,
        }
    }
}

/// A locator plus the optional proof-of-origin token to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecipherRequest {
    pub locator: FormatLocator,
    pub po_token: Option<String>,
}

impl DecipherRequest {
    pub fn new(locator: FormatLocator) -> Self {
        Self {
            locator,
            po_token: None,
        }
    }

    pub fn with_po_token(mut self, token: impl Into<String>) -> Self {
        self.po_token = Some(token.into());
        self
    }
}

/// Outputs of one script run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResults {
    pub sig: Option<String>,
    pub n: Option<String>,
}

/// Escape a token for use inside a double-quoted script string
pub fn escape_token(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Program that evaluates the artifact and returns the requested
/// transforms as a JSON string
pub fn build_program(script: &GeneratedScript, sig: Option<&str>, n: Option<&str>) -> String {
    let mut calls = Vec::new();
    if let Some(n) = n {
        calls.push(format!(
            "n: {EXPORTS_BINDING}.{N_FUNCTION_NAME}(\"{}\")",
            escape_token(n)
        ));
    }
    if let Some(sig) = sig {
        calls.push(format!(
            "sig: {EXPORTS_BINDING}.{SIG_FUNCTION_NAME}(\"{}\")",
            escape_token(sig)
        ));
    }

    format!(
        "(function () {{\n{}\nreturn JSON.stringify({{ {} }});\n}})();",
        script.output,
        calls.join(", ")
    )
}

/// Applies an assembled script to format locators
#[derive(Clone)]
pub struct Decipherer {
    engine: Arc<dyn ScriptEngine>,
}

impl Decipherer {
    pub fn new(engine: impl ScriptEngine + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Run the wrappers for whichever tokens are given
    pub fn transform(
        &self,
        script: &GeneratedScript,
        sig: Option<&str>,
        n: Option<&str>,
    ) -> Result<TokenResults> {
        if sig.is_none() && n.is_none() {
            return Ok(TokenResults::default());
        }

        let raw = self.engine.run(&build_program(script, sig, n))?;
        let value: Value = serde_json::from_str(&raw)?;

        let field = |key: &str, requested: bool| -> Result<Option<String>> {
            if !requested {
                return Ok(None);
            }
            match value.get(key) {
                Some(Value::String(result)) => Ok(Some(result.clone())),
                Some(other) => Err(SliceError::NonStringResult(format!("{}: {}", key, other))),
                None => Err(SliceError::NonStringResult(format!("{}: undefined", key))),
            }
        };

        Ok(TokenResults {
            sig: field("sig", sig.is_some())?,
            n: field("n", n.is_some())?,
        })
    }

    /// Produce the final URL for a request
    pub fn decipher(&self, script: &GeneratedScript, request: &DecipherRequest) -> Result<String> {
        let locator = &request.locator;
        let mut url = Url::parse(locator.url())?;

        let sig = locator.signature();
        if sig.is_some() && !script.exports(SIG_FUNCTION_NAME) {
            return Err(SliceError::TargetUnavailable(SIG_FUNCTION_NAME.to_string()));
        }

        let original_n = query_param(&url, "n");
        let n = match &original_n {
            Some(_) if !script.exports(N_FUNCTION_NAME) => {
                warn!("No {} export, keeping n unchanged", N_FUNCTION_NAME);
                None
            }
            other => other.as_deref(),
        };

        let results = match self.transform(script, sig, n) {
            Ok(results) => results,
            Err(e) if e.is_execution_failure() && sig.is_none() => {
                warn!("n transform failed, keeping original: {}", e);
                TokenResults::default()
            }
            Err(e) if e.is_execution_failure() && n.is_some() => {
                warn!("Combined transform failed, retrying signature alone: {}", e);
                self.transform(script, sig, None)?
            }
            Err(e) => return Err(e),
        };

        if let Some(deciphered) = &results.sig {
            debug!("Signature deciphered into {}", locator.signature_param());
            set_query_param(&mut url, locator.signature_param(), deciphered);
        }

        if let Some(transformed) = &results.n {
            if transformed.starts_with(N_ERROR_PREFIX) {
                warn!("n transform returned an error value, keeping original");
            } else {
                set_query_param(&mut url, "n", transformed);
            }
        }

        if let Some(token) = &request.po_token {
            set_query_param(&mut url, PO_TOKEN_PARAM, token);
        }

        info!("Format URL resolved");
        Ok(url.to_string())
    }
}
