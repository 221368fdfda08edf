use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::SearchResult;

/// How dictionary bytes that are not valid UTF-8 are handled when loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Reject the dictionary; the search reports it as unreadable.
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going.
    Lossy,
}

/// Configuration for dictionary searches.
///
/// # Configuration Locations
///
/// Values are layered, later sources overriding earlier ones:
/// 1. Global `$CONFIG_DIR/dictsearch/config.yaml`
/// 2. Local `.dictsearch.yaml` in the current directory
/// 3. A file passed explicitly (the CLI's `--config` flag)
///
/// # Configuration Format
///
/// ```yaml
/// # Directory holding one word list per file
/// dictionary_dir: "./dictionaries"
///
/// # Scanner threads (default: CPU cores)
/// thread_count: 4
///
/// # Give up on a search after this long (humantime syntax)
/// max_search_duration: "5s"
///
/// # Bound the result conduit; omit for unbounded
/// sink_capacity: 1024
///
/// # failfast | lossy
/// encoding_mode: "lossy"
///
/// # trace, debug, info, warn, error
/// log_level: "info"
/// ```
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Directory the filesystem loader lists and reads dictionaries from
    #[serde(default = "default_dictionary_dir")]
    pub dictionary_dir: PathBuf,

    /// Number of scanner threads
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Upper bound on a single search; `None` waits for every scanner
    #[serde(
        default,
        deserialize_with = "duration_opt::deserialize",
        serialize_with = "duration_opt::serialize"
    )]
    pub max_search_duration: Option<Duration>,

    /// Capacity of the result conduit; `None` means unbounded
    #[serde(default)]
    pub sink_capacity: Option<usize>,

    /// Handling of invalid UTF-8 in dictionary files
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_dictionary_dir() -> PathBuf {
    PathBuf::from("./dictionaries")
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dictionary_dir: default_dictionary_dir(),
            thread_count: default_thread_count(),
            max_search_duration: None,
            sink_capacity: None,
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> SearchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, adding `config_path` as the highest-precedence file.
    ///
    /// The default locations are optional; an explicit path must exist.
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("dictsearch/config.yaml")),
            Some(PathBuf::from(".dictsearch.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values.
    ///
    /// Every value the CLI supplies wins, even one equal to the built-in
    /// default; unset values keep what the files said.
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(dictionary_dir) = cli.dictionary_dir {
            self.dictionary_dir = dictionary_dir;
        }
        if let Some(thread_count) = cli.thread_count {
            self.thread_count = thread_count;
        }
        if cli.max_search_duration.is_some() {
            self.max_search_duration = cli.max_search_duration;
        }
        if cli.sink_capacity.is_some() {
            self.sink_capacity = cli.sink_capacity;
        }
        if let Some(encoding_mode) = cli.encoding_mode {
            self.encoding_mode = encoding_mode;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub dictionary_dir: Option<PathBuf>,
    pub thread_count: Option<NonZeroUsize>,
    pub max_search_duration: Option<Duration>,
    pub sink_capacity: Option<usize>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}

mod duration_opt {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| humantime::parse_duration(raw.trim()).map_err(D::Error::custom))
            .transpose()
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }
}
