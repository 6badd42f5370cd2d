/*
 * config.rs
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

//! Engine configuration: keep-alive, verbosity, failure policies and timeouts.
//! Persisted as ~/.histofeed/config.xml; all XML read/write uses the quick_xml parser/writer.
//! Secrets (the bearer token) live in separate one-line files in the same directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

/// Root element of the configuration file.
const ROOT: &str = "histofeed";

/// How much progress chatter the engine and stash emit. Errors are always logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    #[default]
    Normal,
    /// State changes, header lines, connection reuse.
    Verbose,
    /// Every read and write.
    Firehose,
}

impl Verbosity {
    /// True when messages at `level` should be emitted.
    pub fn allows(self, level: Verbosity) -> bool {
        self >= level
    }

    /// Normal raised by `count` steps (one per `-v`), saturating at Firehose.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Firehose,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::Firehose => "firehose",
        }
    }
}

impl FromStr for Verbosity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" => Ok(Verbosity::Quiet),
            "normal" => Ok(Verbosity::Normal),
            "verbose" => Ok(Verbosity::Verbose),
            "firehose" => Ok(Verbosity::Firehose),
            _ => Err(ConfigError::invalid("verbosity", s)),
        }
    }
}

/// What to do when the transport fails after a 200 status line was already parsed.
///
/// Some servers close the socket abruptly right after sending a complete 200 response,
/// so by default such an error is treated as the end of the body. `Report` surfaces it
/// instead, which is the right choice for servers where it could mean truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyShutdown {
    #[default]
    Tolerate,
    Report,
}

impl DirtyShutdown {
    pub fn as_str(self) -> &'static str {
        match self {
            DirtyShutdown::Tolerate => "tolerate",
            DirtyShutdown::Report => "report",
        }
    }
}

impl FromStr for DirtyShutdown {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tolerate" => Ok(DirtyShutdown::Tolerate),
            "report" => Ok(DirtyShutdown::Report),
            _ => Err(ConfigError::invalid("dirty-shutdown", s)),
        }
    }
}

/// Configuration shared by the engine and its connection stash. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cache connections between requests and send `Connection: Keep-Alive`.
    pub keep_alive: bool,
    pub verbosity: Verbosity,
    pub dirty_shutdown: DirtyShutdown,
    /// Reconnect-and-resend attempts for failures before any response byte arrived.
    pub max_restarts: u32,
    /// Per read/write inactivity limit. None waits forever.
    pub io_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    /// Wrap connections in TLS (the normal case); plain TCP otherwise.
    pub tls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            verbosity: Verbosity::Normal,
            dirty_shutdown: DirtyShutdown::Tolerate,
            max_restarts: 1,
            io_timeout: Some(Duration::from_secs(60)),
            connect_timeout: Duration::from_secs(15),
            tls: true,
        }
    }
}

/// Errors reading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("invalid value {value:?} for <{element}>")]
    InvalidValue { element: &'static str, value: String },

    #[error("secret file {0} is empty")]
    EmptySecret(PathBuf),
}

impl ConfigError {
    fn invalid(element: &'static str, value: &str) -> Self {
        ConfigError::InvalidValue {
            element,
            value: value.to_string(),
        }
    }
}

/// Default config directory: ~/.histofeed.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|h| h.join(".histofeed"))
}

/// Default config path: ~/.histofeed/config.xml.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("config.xml"))
}

/// Load configuration from `path`. A missing file yields the defaults; unknown elements are ignored.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn parse_bool(element: &'static str, text: &str) -> Result<bool, ConfigError> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(element, text)),
    }
}

fn parse_secs(element: &'static str, text: &str) -> Result<u64, ConfigError> {
    text.parse::<u64>()
        .map_err(|_| ConfigError::invalid(element, text))
}

/// Parse configuration XML. Elements are children of the root, each holding one text value.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();
    let mut reader = Reader::from_str(content);
    let mut element_name: Vec<u8> = Vec::new();
    loop {
        match reader.read_event() {
            Err(e) => return Err(ConfigError::Xml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                element_name.clear();
                element_name.extend_from_slice(e.name().as_ref());
            }
            Ok(Event::Text(e)) => {
                if element_name.is_empty() {
                    continue;
                }
                let text = e.unescape().map_err(|e| ConfigError::Xml(e.to_string()))?;
                let text = text.trim();
                match element_name.as_slice() {
                    b"keep-alive" => config.keep_alive = parse_bool("keep-alive", text)?,
                    b"verbosity" => config.verbosity = text.parse()?,
                    b"dirty-shutdown" => config.dirty_shutdown = text.parse()?,
                    b"max-restarts" => {
                        config.max_restarts = text
                            .parse()
                            .map_err(|_| ConfigError::invalid("max-restarts", text))?
                    }
                    b"io-timeout-secs" => {
                        config.io_timeout = match parse_secs("io-timeout-secs", text)? {
                            0 => None,
                            n => Some(Duration::from_secs(n)),
                        }
                    }
                    b"connect-timeout-secs" => {
                        config.connect_timeout =
                            Duration::from_secs(parse_secs("connect-timeout-secs", text)?)
                    }
                    b"tls" => config.tls = parse_bool("tls", text)?,
                    _ => {}
                }
                element_name.clear();
            }
            Ok(Event::End(_)) => element_name.clear(),
            _ => {}
        }
    }
    Ok(config)
}

fn write_element(writer: &mut Writer<&mut Vec<u8>>, name: &str, value: &str) -> Result<(), ConfigError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    Ok(())
}

/// Serialize configuration to XML (UTF-8).
pub fn config_to_xml(config: &EngineConfig) -> Result<Vec<u8>, ConfigError> {
    let mut out = Vec::new();
    let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    writer
        .write_event(Event::Start(BytesStart::new(ROOT)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    write_element(&mut writer, "keep-alive", if config.keep_alive { "true" } else { "false" })?;
    write_element(&mut writer, "verbosity", config.verbosity.as_str())?;
    write_element(&mut writer, "dirty-shutdown", config.dirty_shutdown.as_str())?;
    write_element(&mut writer, "max-restarts", &config.max_restarts.to_string())?;
    let io_timeout = config.io_timeout.map(|d| d.as_secs()).unwrap_or(0);
    write_element(&mut writer, "io-timeout-secs", &io_timeout.to_string())?;
    write_element(
        &mut writer,
        "connect-timeout-secs",
        &config.connect_timeout.as_secs().to_string(),
    )?;
    write_element(&mut writer, "tls", if config.tls { "true" } else { "false" })?;
    writer
        .write_event(Event::End(BytesEnd::new(ROOT)))
        .map_err(|e| ConfigError::Xml(e.to_string()))?;
    Ok(out)
}

/// Write configuration to `path`, creating the parent directory if needed.
pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config_to_xml(config)?)?;
    Ok(())
}

/// Read a secret (e.g. the access token) stored as the first line of `dir/name`.
pub fn read_secret(dir: &Path, name: &str) -> Result<String, ConfigError> {
    let path = dir.join(name);
    let content = fs::read_to_string(&path)?;
    let line = content.lines().next().unwrap_or("").trim_end();
    if line.is_empty() {
        return Err(ConfigError::EmptySecret(path));
    }
    Ok(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_alive_and_tolerate() {
        let c = EngineConfig::default();
        assert!(c.keep_alive);
        assert_eq!(c.dirty_shutdown, DirtyShutdown::Tolerate);
        assert_eq!(c.max_restarts, 1);
        assert_eq!(c.verbosity, Verbosity::Normal);
    }

    #[test]
    fn parse_overrides_known_elements() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<histofeed>
  <keep-alive>false</keep-alive>
  <verbosity>Firehose</verbosity>
  <dirty-shutdown>report</dirty-shutdown>
  <io-timeout-secs>0</io-timeout-secs>
  <colour>blue</colour>
</histofeed>"#;
        let c = parse_config(xml).unwrap();
        assert!(!c.keep_alive);
        assert_eq!(c.verbosity, Verbosity::Firehose);
        assert_eq!(c.dirty_shutdown, DirtyShutdown::Report);
        assert_eq!(c.io_timeout, None);
        assert_eq!(c.connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn parse_rejects_bad_bool() {
        let err = parse_config("<histofeed><tls>maybe</tls></histofeed>").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { element: "tls", .. }));
    }

    #[test]
    fn xml_round_trip_preserves_config() {
        let c = EngineConfig {
            keep_alive: false,
            verbosity: Verbosity::Verbose,
            io_timeout: Some(Duration::from_secs(5)),
            ..EngineConfig::default()
        };
        let xml = config_to_xml(&c).unwrap();
        let back = parse_config(std::str::from_utf8(&xml).unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("histofeed-no-such-dir/config.xml");
        assert_eq!(load_config(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn secret_is_first_line() {
        let dir = std::env::temp_dir().join(format!("histofeed-secret-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("access_token"), "ya29.token\nignored\n").unwrap();
        assert_eq!(read_secret(&dir, "access_token").unwrap(), "ya29.token");
        fs::write(dir.join("empty"), "\n").unwrap();
        assert!(matches!(
            read_secret(&dir, "empty"),
            Err(ConfigError::EmptySecret(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn verbosity_counts_saturate() {
        assert_eq!(Verbosity::from_count(0), Verbosity::Normal);
        assert_eq!(Verbosity::from_count(1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_count(7), Verbosity::Firehose);
        assert!(Verbosity::Verbose.allows(Verbosity::Normal));
        assert!(!Verbosity::Quiet.allows(Verbosity::Normal));
    }
}
