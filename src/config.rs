use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::database::{DatabaseOptions, Patch, Tuning};

pub struct SqlpatchConfig {
    /// Directory for pre-migration snapshots
    pub backup_dir: String,

    /// Pragma directives replacing the default tuning (empty = defaults)
    pub tuning: Vec<String>,

    /// Emit progress messages
    pub info_logging: bool,

    /// Emit error messages
    pub error_logging: bool,
}

const EMPTY_CONFIG: &str = r#"### sqlpatch configuration file

### directory for pre-migration database snapshots
# backup_dir = "/tmp"

### pragma directives applied on open, replacing the defaults (comma separated)
# tuning = "journal_mode=WAL,synchronous=NORMAL,foreign_keys=ON"

### logging switches
# info_logging = true
# error_logging = true
"#;

impl Default for SqlpatchConfig {
    fn default() -> Self {
        Self {
            backup_dir: std::env::temp_dir().to_string_lossy().to_string(),
            tuning: Vec::new(),
            info_logging: true,
            error_logging: true,
        }
    }
}

impl SqlpatchConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<SqlpatchConfig> {
        let mut builder = Config::builder();

        // Add in toml configuration file
        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    builder = builder.add_source(config::File::from(path));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                // By default use $HOME/.sqlpatch/sqlpatch.toml
                let home_dir =
                    dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
                let sqlpatch_dir = home_dir.join(".sqlpatch");
                std::fs::create_dir_all(&sqlpatch_dir)
                    .map_err(|e| anyhow!("Unable to create sqlpatch directory: {}", e))?;
                let p = sqlpatch_dir.join("sqlpatch.toml");
                if p.exists() {
                    builder = builder.add_source(config::File::from(p.as_path()));
                } else {
                    std::fs::write(&p, EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.display(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of SQLPATCH)
        // E.g., `SQLPATCH_BACKUP_DIR=/var/backups sqlpatch migrate ...`
        builder = builder.add_source(config::Environment::with_prefix("SQLPATCH"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    fn from_map(config: &HashMap<String, String>) -> Result<SqlpatchConfig> {
        let defaults = Self::default();

        let backup_dir = config
            .get("backup_dir")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.backup_dir);

        let tuning = config
            .get("tuning")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(SqlpatchConfig {
            backup_dir,
            tuning,
            info_logging: parse_bool(config, "info_logging")?.unwrap_or(defaults.info_logging),
            error_logging: parse_bool(config, "error_logging")?
                .unwrap_or(defaults.error_logging),
        })
    }

    /// Options for a database at `path`, carrying the configured backup,
    /// tuning and logging settings
    pub fn database_options(&self, path: impl Into<PathBuf>) -> DatabaseOptions {
        let tuning = if self.tuning.is_empty() {
            Tuning::Defaults
        } else {
            Tuning::Custom(self.tuning.clone())
        };

        DatabaseOptions::new(path)
            .backup_dir(&self.backup_dir)
            .tuning(tuning)
            .info_logging(self.info_logging)
            .error_logging(self.error_logging)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let tuning = if self.tuning.is_empty() {
            "defaults".to_string()
        } else {
            self.tuning.join(", ")
        };
        [
            format!("Backup Directory:   {}", self.backup_dir),
            format!("Tuning:             {}", tuning),
            format!("Info Logging:       {}", self.info_logging),
            format!("Error Logging:      {}", self.error_logging),
        ]
        .join("\n")
    }

    /// Get the default config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.sqlpatch/sqlpatch.toml", home_dir)
    }
}

fn parse_bool(config: &HashMap<String, String>, key: &str) -> Result<Option<bool>> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => match v.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            other => Err(anyhow!("Invalid boolean for {}: '{}'", key, other)),
        },
    }
}

/// Patch file layout: a `patches` array of `{ version, statements }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchFile {
    #[serde(default)]
    pub patches: Vec<Patch>,
}

impl PatchFile {
    /// Load a patch file; the format (toml or json) follows the file extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("Patch file does not exist: {}", path.display()));
        }

        Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| anyhow!("Failed to read patch file {}: {}", path.display(), e))?
            .try_deserialize::<PatchFile>()
            .map_err(|e| anyhow!("Failed to parse patch file {}: {}", path.display(), e))
    }
}
