//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A config file: the path given explicitly, otherwise the first of
//!    `booksing.toml`, `booksing.yaml`, `booksing.yml` or `booksing.json` found
//!    in the working directory or the platform config directory.
//! 3. Environment variables prefixed with `BOOKSING_`. Nested keys use a
//!    double underscore: `BOOKSING_MEILI__HOST`.

pub mod duration;
pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcOffset;
use time::macros::format_description;
use tracing::debug;

const ENV_PREFIX: &str = "BOOKSING_";
const FILE_STEM: &str = "booksing";
const FILE_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];
const DATABASE_SCHEME: &str = "file://";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeiliConfig {
    pub host: String,
    pub index: String,
    /// Sent as a bearer token when present.
    pub key: Option<String>,
}

impl Default for MeiliConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:7700".to_string(),
            index: "books".to_string(),
            key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The library: where cataloged books live.
    pub book_dir: PathBuf,
    /// Where new files are dropped. Defaults to `<book_dir>/import`.
    pub import_dir: Option<PathBuf>,
    /// Quarantine for files that could not be parsed.
    pub fail_dir: PathBuf,
    /// `file://<path>` of the SQLite catalog.
    pub database: String,
    pub meili: MeiliConfig,
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// `UTC` or a fixed offset such as `+02:00`. Decides which calendar day
    /// an addition belongs to in the search index.
    pub timezone: String,
    /// Maximum books per search index request.
    pub batch_size: usize,
    /// Parser workers.
    pub workers: usize,
    #[serde(with = "crate::duration")]
    pub save_interval: Duration,
    /// `0s` disables periodic scanning.
    #[serde(with = "crate::duration")]
    pub scan_interval: Duration,
    /// Longest a scan cycle waits for a slow file before ending without it.
    #[serde(with = "crate::duration")]
    pub cycle_timeout: Duration,
    pub recursive: bool,
    /// Books that may wait for the index updater before the pipeline stalls.
    pub index_buffer: usize,
    /// Library path template. The pipeline's built-in layout when unset.
    pub template: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            book_dir: PathBuf::from("."),
            import_dir: None,
            fail_dir: PathBuf::from("./failed"),
            database: "file://booksing.db".to_string(),
            meili: MeiliConfig::default(),
            log_level: "info".to_string(),
            timezone: "UTC".to_string(),
            batch_size: 50,
            workers: 5,
            save_interval: Duration::from_secs(10),
            scan_interval: Duration::from_secs(60),
            cycle_timeout: Duration::from_secs(60),
            recursive: true,
            index_buffer: 1000,
            template: None,
        }
    }
}

impl Config {
    /// Load and validate. `explicit` must exist if given.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(&Self::search_dirs()),
        };
        let config: Config = Self::figment(file.as_deref())?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The layered sources, without extraction or validation.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            debug!(path = %path.display(), "reading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// The working directory, then the platform config directory.
    pub fn search_dirs() -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from(".")];
        if let Some(project) = ProjectDirs::from("", "", FILE_STEM) {
            dirs.push(project.config_dir().to_path_buf());
        }
        dirs
    }

    /// First `booksing.{toml,yaml,yml,json}` in `dirs`.
    pub fn discover(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .flat_map(|dir| FILE_EXTENSIONS.iter().map(move |ext| dir.join(format!("{FILE_STEM}.{ext}"))))
            .find(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| exn::Exn::from(ErrorKind::Invalid(reason.to_string()));
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.index_buffer == 0 {
            return Err(invalid("index_buffer must be at least 1"));
        }
        if self.save_interval.is_zero() {
            return Err(invalid("save_interval must be longer than zero"));
        }
        if self.cycle_timeout.is_zero() {
            return Err(invalid("cycle_timeout must be longer than zero"));
        }
        if self.meili.host.trim().is_empty() {
            return Err(invalid("meili.host must be set"));
        }
        self.database_path()?;
        self.utc_offset()?;
        Ok(())
    }

    pub fn import_dir(&self) -> PathBuf {
        self.import_dir.clone().unwrap_or_else(|| self.book_dir.join("import"))
    }

    /// The filesystem path behind `database`. Only `file://` is supported.
    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database.strip_prefix(DATABASE_SCHEME) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => exn::bail!(ErrorKind::Invalid(format!("unsupported database {:?}", self.database))),
        }
    }

    pub fn utc_offset(&self) -> Result<UtcOffset> {
        let timezone = self.timezone.trim();
        if timezone.eq_ignore_ascii_case("utc") || timezone == "Z" {
            return Ok(UtcOffset::UTC);
        }
        UtcOffset::parse(timezone, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
            .or_raise(|| ErrorKind::Invalid(format!("timezone must be UTC or an offset like +02:00, not {timezone:?}")))
    }

    /// `None` when periodic scanning is disabled.
    pub fn scan_interval(&self) -> Option<Duration> {
        (!self.scan_interval.is_zero()).then_some(self.scan_interval)
    }
}
