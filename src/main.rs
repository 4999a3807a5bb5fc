//! Main entry point for the sigslice CLI

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use sigslice::cli::{Args, OutputFormatter};
use sigslice::error::SliceError;
use sigslice::platform::{
    DecipherRequest, Decipherer, DenoEngine, FilePlayerSource, FormatLocator, PlayerCache,
    PlayerData, TokenResults,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose)?;
    debug!("Starting sigslice with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level());
    if let Err(e) = run(&args, &formatter).await {
        formatter.error(&format!("{:#}", e));
        if e
            .downcast_ref::<SliceError>()
            .is_some_and(SliceError::is_structural)
        {
            formatter.info("The player layout may have changed; rerun with -v for details");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args, formatter: &OutputFormatter) -> Result<()> {
    let start_time = Instant::now();

    let mut source = FilePlayerSource::new(&args.player);
    if let Some(version) = &args.version_id {
        source = source.with_version(version.clone());
    }

    let cache = PlayerCache::new(args.player_config());
    formatter.debug(&format!("Safety filter: {:?}", args.safety));
    let data = cache
        .get_or_extract(&source)
        .await
        .with_context(|| format!("Failed to slice {}", args.player.display()))?;
    let elapsed = start_time.elapsed();
    info!("Player {} extracted in {:?}", data.version, elapsed);

    let (tokens, url) = if args.wants_decipher() {
        decipher(args, Arc::clone(&data)).await?
    } else {
        (TokenResults::default(), None)
    };

    if args.json {
        let mut value = json!({ "player": &*data });
        if tokens.sig.is_some() || tokens.n.is_some() {
            value["tokens"] = serde_json::to_value(&tokens)?;
        }
        if let Some(url) = &url {
            value["url"] = json!(url);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    formatter.print_player(&data, elapsed);
    for target in data.report.targets.iter().filter(|t| !t.unresolved.is_empty()) {
        formatter.warning(&format!(
            "{} is missing {} dependencies",
            target.name,
            target.unresolved.len()
        ));
    }

    if args.print_script {
        println!("{}", data.script.output);
    }

    formatter.print_tokens(&tokens);
    if let Some(url) = &url {
        formatter.print_url(url);
    }

    if data.report.all_ready() {
        formatter.success(&format!("All {} targets ready", data.report.targets.len()));
    } else {
        formatter.warning("Not every target is ready; deciphering may be partial");
    }
    Ok(())
}

/// Run the requested token transforms and URL rewrite on a blocking thread
async fn decipher(args: &Args, data: Arc<PlayerData>) -> Result<(TokenResults, Option<String>)> {
    let locator = match (&args.url, &args.cipher) {
        (Some(url), _) => Some(FormatLocator::direct(url.clone())),
        (None, Some(bundle)) => Some(FormatLocator::parse(bundle)?),
        (None, None) => None,
    };
    let request = locator.map(|locator| {
        let request = DecipherRequest::new(locator);
        match &args.pot {
            Some(token) => request.with_po_token(token.clone()),
            None => request,
        }
    });
    let sig = args.sig.clone();
    let n = args.n.clone();

    let result = tokio::task::spawn_blocking(move || -> sigslice::Result<_> {
        let decipherer = Decipherer::new(DenoEngine::new());
        let tokens = decipherer.transform(&data.script, sig.as_deref(), n.as_deref())?;
        let url = request
            .map(|request| decipherer.decipher(&data.script, &request))
            .transpose()?;
        Ok((tokens, url))
    })
    .await
    .context("Decipher task failed")??;

    Ok(result)
}

/// Initialize logging system
fn init_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "info" };

    // --verbose wins over RUST_LOG
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
