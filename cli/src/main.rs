//! `get-urls`: fetch a list of URLs concurrently and report each outcome.
//!
//! URLs come from the command line, from a file (one per line, `#` starts a
//! comment), or both. Every request is sent on the default event loop before
//! any result is waited on, so they run concurrently.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use fetch_core::{FetchConfig, Request};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "get-urls")]
#[command(about = "Fetch URLs over plain HTTP/1.1 and report status and size")]
struct Cli {
    /// URLs to fetch, written as host[:port][/resource]
    urls: Vec<String>,

    /// Read more URLs from this file, one per line
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Per-request timeout in milliseconds (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// JSON file with request defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

/// A URL split into the host to connect to and the resource to request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    resource: Option<String>,
}

fn parse_target(url: &str) -> Target {
    let url = url.trim();
    let url = url.strip_prefix("http://").unwrap_or(url);
    match url.find('/') {
        Some(slash) => Target {
            host: url[..slash].to_string(),
            resource: Some(url[slash..].to_string()),
        },
        None => Target {
            host: url.to_string(),
            resource: None,
        },
    }
}

fn parse_urls_file(contents: &str) -> Vec<Target> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_target)
        .collect()
}

/// The `host resource` prefix of each report line.
fn label(host: &str, resource: &str) -> String {
    format!("{host} {resource}")
}

fn load_config(path: &Path) -> anyhow::Result<FetchConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FetchConfig::default(),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    let mut targets: Vec<Target> = cli.urls.iter().map(|url| parse_target(url)).collect();
    if let Some(path) = &cli.urls_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading urls file {}", path.display()))?;
        targets.extend(parse_urls_file(&contents));
    }
    if targets.is_empty() {
        bail!("no URLs given; pass them as arguments or with --urls-file");
    }
    tracing::info!(count = targets.len(), timeout_ms = config.timeout_ms, "fetching");

    let pending: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let mut request = Request::with_config(target.host, &config);
            if let Some(resource) = target.resource {
                request = request.resource(resource);
            }
            let label = label(request.host(), request.resource_path());
            (label, request.send())
        })
        .collect();

    let mut failures = 0;
    for (label, response) in pending {
        match response.wait() {
            Ok(response) => println!("{label} {} {} bytes", response.status(), response.body().len()),
            Err(e) => {
                failures += 1;
                println!("{label} error: {e}");
            }
        }
    }

    if failures > 0 {
        tracing::warn!(failures, "some requests failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
