use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Name of the optional config file in the working directory.
pub const CONFIG_FILE: &str = ".grammar-sync.toml";

/// Runtime settings loaded from `.grammar-sync.toml`.
/// Every field has a default, so the file itself is optional.
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for tarball and repository archive downloads.
    pub archive_timeout: Duration,
    /// Command that prints a CSON file as JSON on stdout.
    pub converter: PathBuf,
    /// Timeout for single grammar downloads.
    pub grammar_timeout: Duration,
    /// Path of the origin -> scopes manifest.
    pub manifest: PathBuf,
    /// Directory receiving `<scope>.json` files.
    pub output: PathBuf,
    /// Environment preparation command, run once before fetching. Empty skips it.
    pub prepare: Vec<String>,
    /// Number of dispatcher worker threads.
    pub workers: usize,
}

/// Raw TOML structure for `.grammar-sync.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct GrammarSyncTomlConfig {
    /// Seconds before an archive download is abandoned.
    archive_timeout_secs: Option<u64>,
    /// CSON converter command.
    converter: Option<PathBuf>,
    /// Seconds before a single grammar download is abandoned.
    grammar_timeout_secs: Option<u64>,
    /// Manifest path.
    manifest: Option<PathBuf>,
    /// Output directory.
    output: Option<PathBuf>,
    /// Preparation command as program followed by arguments.
    prepare: Option<Vec<String>>,
    /// Worker pool size.
    workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            archive_timeout: Duration::from_secs(30),
            converter: PathBuf::from("node_modules/.bin/csonc"),
            grammar_timeout: Duration::from_secs(10),
            manifest: PathBuf::from("grammars.toml"),
            output: PathBuf::from("grammars"),
            prepare: vec!["npm".to_string(), "install".to_string()],
            workers: 8,
        };
    }
}

impl Config {
    /// Load config from `.grammar-sync.toml` in the given root directory.
    /// Returns the defaults if the file doesn't exist. A file that exists
    /// but is malformed is an error, never a silent fallback.
    ///
    /// Relative paths in the result are joined onto `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if `workers` is zero.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default().rooted_at(root));
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content).map(|config| return config.rooted_at(root));
    }

    /// Parse config content, filling unset keys from the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` on malformed TOML, or `Error::ConfigInvalid`
    /// if `workers` is zero.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: GrammarSyncTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();

        let workers = raw.workers.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(Error::ConfigInvalid {
                reason: "`workers` must be at least 1".to_string(),
            });
        }

        return Ok(Self {
            archive_timeout: raw
                .archive_timeout_secs
                .map_or(defaults.archive_timeout, Duration::from_secs),
            converter: raw.converter.unwrap_or(defaults.converter),
            grammar_timeout: raw
                .grammar_timeout_secs
                .map_or(defaults.grammar_timeout, Duration::from_secs),
            manifest: raw.manifest.unwrap_or(defaults.manifest),
            output: raw.output.unwrap_or(defaults.output),
            prepare: raw.prepare.unwrap_or(defaults.prepare),
            workers,
        });
    }

    /// Resolve the manifest and output paths against `root`.
    /// The converter is left alone so bare program names still go through `PATH`.
    fn rooted_at(mut self, root: &Path) -> Self {
        self.manifest = root.join(&self.manifest);
        self.output = root.join(&self.output);
        return self;
    }
}
