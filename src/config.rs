//! Run configuration: staging layout, pacing, and safety valves.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::placement;

/// Name of the holding directory manifests are relocated into.
pub const MANIFEST_HOLDING_DIR: &str = "0_csv_";
/// Name of the holding directory bulk archives are relocated into.
pub const ARCHIVE_HOLDING_DIR: &str = "0_zip_";

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root of the archive; also the browser's download staging directory.
    pub download_root: PathBuf,
    /// Path of the ledger database file.
    pub database_path: PathBuf,
    /// Documents per bulk export page.
    pub page_size: u32,
    /// How long to wait for one download artifact to appear.
    pub artifact_timeout_secs: u64,
    /// Staging poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Consecutive client failures that abort the batch.
    pub max_consecutive_errors: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("."),
            database_path: PathBuf::from("archiver.db"),
            page_size: 50,
            artifact_timeout_secs: 120,
            poll_interval_ms: 2000,
            max_consecutive_errors: 10,
        }
    }
}

impl RunConfig {
    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=200).contains(&self.page_size) {
            bail!(
                "Invalid config value for `page_size`: {}. Expected range: 1..=200",
                self.page_size
            );
        }
        if !(1..=3600).contains(&self.artifact_timeout_secs) {
            bail!(
                "Invalid config value for `artifact_timeout_secs`: {}. Expected range: 1..=3600",
                self.artifact_timeout_secs
            );
        }
        if !(100..=60_000).contains(&self.poll_interval_ms) {
            bail!(
                "Invalid config value for `poll_interval_ms`: {}. Expected range: 100..=60000",
                self.poll_interval_ms
            );
        }
        if !(1..=1000).contains(&self.max_consecutive_errors) {
            bail!(
                "Invalid config value for `max_consecutive_errors`: {}. Expected range: 1..=1000",
                self.max_consecutive_errors
            );
        }
        Ok(())
    }

    /// Holding area manifests are relocated into after parsing.
    #[must_use]
    pub fn manifest_holding_dir(&self) -> PathBuf {
        self.download_root.join(MANIFEST_HOLDING_DIR)
    }

    /// Holding area bulk archives are relocated into after extraction.
    #[must_use]
    pub fn archive_holding_dir(&self) -> PathBuf {
        self.download_root.join(ARCHIVE_HOLDING_DIR)
    }

    /// Archive folder for one client: `<root>/<name>_<number>`.
    #[must_use]
    pub fn client_root(&self, client_name: &str, client_number: &str) -> PathBuf {
        self.download_root
            .join(placement::client_folder_name(client_name, client_number))
    }

    /// Per-client bulk extraction scratch: `<root>/0_zip_/<name>_<number>_zip`.
    #[must_use]
    pub fn scratch_dir(&self, client_name: &str, client_number: &str) -> PathBuf {
        self.archive_holding_dir().join(format!(
            "{}_zip",
            placement::client_folder_name(client_name, client_number)
        ))
    }

    /// Artifact wait deadline as a [`Duration`].
    #[must_use]
    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_secs(self.artifact_timeout_secs)
    }

    /// Staging poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Whether the file existed and was parsed.
    pub loaded_from_file: bool,
    /// The effective configuration.
    pub config: RunConfig,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/archiver/config.toml`
/// 2. `$HOME/.config/archiver/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("archiver")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("archiver")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present, falling back to defaults.
///
/// # Errors
///
/// Returns an error when a config file exists but cannot be read or parsed.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            loaded_from_file: false,
            config: RunConfig::default(),
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            loaded_from_file: false,
            config: RunConfig::default(),
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        loaded_from_file: true,
        config,
    })
}

fn load_file_config(path: &Path) -> Result<RunConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<RunConfig> {
    let mut cfg = RunConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "download_root" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `download_root` value on line {}", line_index + 1)
                })?;
                cfg.download_root = PathBuf::from(parsed);
            }
            "database_path" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `database_path` value on line {}", line_index + 1)
                })?;
                cfg.database_path = PathBuf::from(parsed);
            }
            "page_size" => {
                cfg.page_size = parse_integer(value).with_context(|| {
                    format!("Invalid `page_size` value on line {}", line_index + 1)
                })?;
            }
            "artifact_timeout_secs" => {
                cfg.artifact_timeout_secs = parse_integer(value).with_context(|| {
                    format!(
                        "Invalid `artifact_timeout_secs` value on line {}",
                        line_index + 1
                    )
                })?;
            }
            "poll_interval_ms" => {
                cfg.poll_interval_ms = parse_integer(value).with_context(|| {
                    format!("Invalid `poll_interval_ms` value on line {}", line_index + 1)
                })?;
            }
            "max_consecutive_errors" => {
                cfg.max_consecutive_errors = parse_integer(value).with_context(|| {
                    format!(
                        "Invalid `max_consecutive_errors` value on line {}",
                        line_index + 1
                    )
                })?;
            }
            other => bail!(
                "Unknown config key `{other}` on line {}",
                line_index + 1
            ),
        }
    }

    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("expected a double-quoted string, got: {trimmed}");
    };
    Ok(inner.to_string())
}

fn parse_integer<T: std::str::FromStr>(value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("expected an integer, got: {}", value.trim()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_config_str_full() {
        let cfg = parse_config_str(
            r#"
            download_root = "/srv/archive"  # staging and archive root
            database_path = "/srv/archive/ledger.db"
            page_size = 25
            artifact_timeout_secs = 60
            poll_interval_ms = 500
            max_consecutive_errors = 3
            "#,
        )
        .unwrap();

        assert_eq!(cfg.download_root, PathBuf::from("/srv/archive"));
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.artifact_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(500));
        assert_eq!(cfg.max_consecutive_errors, 3);
    }

    #[test]
    fn test_parse_config_str_rejects_unknown_key() {
        let err = parse_config_str("no_such_key = 1").unwrap_err();
        assert!(err.to_string().contains("no_such_key"));
    }

    #[test]
    fn test_parse_config_str_rejects_out_of_range_page_size() {
        let err = parse_config_str("page_size = 0").unwrap_err();
        assert!(format!("{err:#}").contains("page_size"));
    }

    #[test]
    fn test_parse_config_str_rejects_bare_string() {
        let err = parse_config_str("download_root = /srv/archive").unwrap_err();
        assert!(format!("{err:#}").contains("download_root"));
    }

    #[test]
    fn test_layout_helpers() {
        let cfg = RunConfig {
            download_root: PathBuf::from("/srv/archive"),
            ..RunConfig::default()
        };
        assert_eq!(
            cfg.manifest_holding_dir(),
            PathBuf::from("/srv/archive/0_csv_")
        );
        assert_eq!(
            cfg.client_root("Acme Co", "1042"),
            PathBuf::from("/srv/archive/Acme Co_1042")
        );
        assert_eq!(
            cfg.scratch_dir("Acme Co", "1042"),
            PathBuf::from("/srv/archive/0_zip_/Acme Co_1042_zip")
        );
    }
}
