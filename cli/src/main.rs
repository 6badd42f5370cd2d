/*
 * main.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Histofeed, a keep-alive HTTPS feed fetcher.
 *
 * Histofeed is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Histofeed is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Histofeed.  If not, see <http://www.gnu.org/licenses/>.
 */

//! histofeed: fetch one feed page (or any URL) over a keep-alive HTTPS connection and stream
//! the body to stdout.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use histofeed_core::config::{self, read_secret, ConfigError};
use histofeed_core::protocol::http::{Method, PassThrough, Request};
use histofeed_core::uri::{parse_url, FeedQuery};
use histofeed_core::{EngineConfig, RequestEngine, Verbosity};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// URL to fetch (http:// or https://)
    url: String,

    /// Do not keep connections alive between requests
    #[arg(short = 'n', long)]
    no_keep_alive: bool,

    /// More output; repeat for the firehose
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (default ~/.histofeed/config.xml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Bearer token
    #[arg(long, conflicts_with = "token_file")]
    token: Option<String>,

    /// File whose first line is the bearer token (default ~/.histofeed/token, if present)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// First entry of the feed page (1..=1000000)
    #[arg(long, allow_negative_numbers = true)]
    start_index: Option<i64>,

    /// Entries per feed page (1..=50)
    #[arg(long, allow_negative_numbers = true)]
    max_results: Option<i64>,

    /// Issue the request this many times on the same engine
    #[arg(long, default_value = "1")]
    repeat: u32,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request body (form-encoded unless --content-type says otherwise)
    #[arg(short, long)]
    data: Option<String>,

    #[arg(long)]
    content_type: Option<String>,
}

fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Quiet => Level::WARN,
        Verbosity::Normal => Level::INFO,
        Verbosity::Verbose => Level::DEBUG,
        Verbosity::Firehose => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("histofeed: setting default subscriber failed: {}", e);
    }
}

fn split_file(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, name)
}

/// Explicit token, explicit token file, or the default token file when there is one.
fn resolve_token(args: &Args) -> Result<Option<String>, ConfigError> {
    if let Some(token) = &args.token {
        return Ok(Some(token.clone()));
    }
    if let Some(path) = &args.token_file {
        let (dir, name) = split_file(path);
        return read_secret(&dir, &name).map(Some);
    }
    match config::default_config_dir() {
        Some(dir) => match read_secret(&dir, "token") {
            Ok(token) => Ok(Some(token)),
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        },
        None => Ok(None),
    }
}

/// Apply --start-index / --max-results to the path's query, keeping its other parameters.
fn paginate(path: &str, start_index: Option<i64>, max_results: Option<i64>) -> String {
    if start_index.is_none() && max_results.is_none() {
        return path.to_string();
    }
    let (base, query) = path.split_once('?').unwrap_or((path, ""));
    let mut q = FeedQuery::from_query_str(query);
    if let Some(n) = start_index {
        q = q.start_index(n);
    }
    if let Some(n) = max_results {
        q = q.max_results(n);
    }
    q.to_path(base)
}

fn load_engine_config(args: &Args) -> Result<(EngineConfig, Option<PathBuf>), ConfigError> {
    let path = args.config.clone().or_else(config::default_config_path);
    let mut engine_config = match &path {
        Some(p) => config::load_config(p)?,
        None => EngineConfig::default(),
    };
    if args.no_keep_alive {
        engine_config.keep_alive = false;
    }
    if args.quiet {
        engine_config.verbosity = Verbosity::Quiet;
    } else if args.verbose > 0 {
        engine_config.verbosity = Verbosity::from_count(args.verbose);
    }
    Ok((engine_config, path))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (mut engine_config, config_path) = match load_engine_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("histofeed: {}", e);
            return ExitCode::from(2);
        }
    };
    init_logging(engine_config.verbosity);

    if args.write_config {
        let Some(path) = config_path else {
            error!("no config path (HOME is not set); use --config");
            return ExitCode::from(2);
        };
        return match config::save_config(&path, &engine_config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("writing {}: {}", path.display(), e);
                ExitCode::from(2)
            }
        };
    }

    let url = match parse_url(&args.url) {
        Ok(u) => u,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    engine_config.tls = url.tls;

    let token = match resolve_token(&args) {
        Ok(t) => t,
        Err(e) => {
            error!("reading token: {}", e);
            return ExitCode::from(2);
        }
    };

    let method: Method = match args.method.parse() {
        Ok(m) => m,
        Err(never) => match never {},
    };
    let path = paginate(&url.path, args.start_index, args.max_results);
    let mut request = Request::new(method, url.host, url.port, path).bearer_opt(token);
    if let Some(content_type) = &args.content_type {
        request = request.content_type(content_type.clone());
    }
    if let Some(data) = &args.data {
        request = match request.body_slice(data.as_bytes()) {
            Ok(r) => r,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
    }

    let engine = RequestEngine::from_config(engine_config);
    let mut status = ExitCode::SUCCESS;
    for _ in 0..args.repeat.max(1) {
        let mut out = PassThrough::new(io::stdout().lock());
        engine.submit(&request, &mut out).await;
        if let Some(e) = out.take_error() {
            error!("{}", e);
            status = ExitCode::FAILURE;
            break;
        }
        if let Some(e) = out.write_error() {
            error!("writing to stdout: {}", e);
            status = ExitCode::FAILURE;
            break;
        }
    }
    engine.close();
    status
}
