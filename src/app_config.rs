//! Config file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ebook_dl_core::{CrawlConfig, StageKind};

/// Flat `key = value` file configuration. Every field is optional and only
/// overrides the built-in default when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub retry_delay_ms: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    /// `<stage>_workers` entries in file order.
    pub workers: Vec<(StageKind, usize)>,
    pub dead_host_prefixes: Option<Vec<String>>,
    pub relative_marker: Option<String>,
    pub download_command: Option<String>,
}

impl FileConfig {
    /// Copies every value present in the file onto `config`.
    pub fn apply(&self, config: &mut CrawlConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent.clone_from(user_agent);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir.clone_from(output_dir);
        }
        if let Some(database) = &self.database {
            config.database_path.clone_from(database);
        }
        for (kind, workers) in &self.workers {
            config.workers.set(*kind, *workers);
        }
        if let Some(prefixes) = &self.dead_host_prefixes {
            config.dead_host_prefixes.clone_from(prefixes);
        }
        if let Some(marker) = &self.relative_marker {
            config.relative_marker.clone_from(marker);
        }
        if let Some(command) = &self.download_command {
            config.download_command = Some(command.clone());
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/ebook-dl/config.toml`
/// 2. `$HOME/.config/ebook-dl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("ebook-dl")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("ebook-dl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is only read when present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "base_url" => cfg.base_url = Some(parse_string_literal(value).with_context(invalid)?),
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "retry_delay_ms" => {
                cfg.retry_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "database" => {
                cfg.database = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "dead_host_prefixes" => {
                let list = parse_string_literal(value).with_context(invalid)?;
                cfg.dead_host_prefixes = Some(
                    list.split(',')
                        .map(str::trim)
                        .filter(|prefix| !prefix.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            "relative_marker" => {
                cfg.relative_marker = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "download_command" => {
                cfg.download_command = Some(parse_string_literal(value).with_context(invalid)?);
            }
            other => {
                let Some(stage) = other.strip_suffix("_workers") else {
                    bail!("Unknown configuration key: '{other}' on line {line_no}");
                };
                let kind: StageKind = stage.parse()?;
                let workers = parse_integer_u64(value).with_context(invalid)?;
                let workers = usize::try_from(workers)
                    .map_err(|_| anyhow::anyhow!("`{other}` out of range on line {line_no}"))?;
                cfg.workers.push((kind, workers));
            }
        }
    }
    Ok(cfg)
}

/// Parses a `--workers STAGE=N` override.
pub fn parse_worker_override(raw: &str) -> Result<(StageKind, usize)> {
    let Some((stage, count)) = raw.split_once('=') else {
        bail!("Invalid --workers value '{raw}': expected STAGE=N");
    };
    let kind: StageKind = stage.trim().parse()?;
    let count = count
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Invalid worker count in '{raw}'"))?;
    Ok((kind, count))
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ebook_dl_core::ConfigError;

    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
            # crawl settings
            base_url = "https://mirror.example"
            user_agent = "test-agent"   # inline comment
            request_timeout_secs = 30
            retry_delay_ms = 250
            output_dir = "/tmp/books"
            database = "catalog.db"
            download_workers = 8
            extraction_workers = 50
            dead_host_prefixes = "http://dead.one, http://dead.two"
            relative_marker = "/"
            download_command = "wget -q -O {dest} {url}"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.base_url.as_deref(), Some("https://mirror.example"));
        assert_eq!(cfg.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(cfg.request_timeout_secs, Some(30));
        assert_eq!(cfg.retry_delay_ms, Some(250));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/books")));
        assert_eq!(cfg.database, Some(PathBuf::from("catalog.db")));
        assert_eq!(
            cfg.workers,
            vec![(StageKind::Download, 8), (StageKind::Extraction, 50)]
        );
        assert_eq!(
            cfg.dead_host_prefixes,
            Some(vec!["http://dead.one".to_string(), "http://dead.two".to_string()])
        );
        assert_eq!(cfg.download_command.as_deref(), Some("wget -q -O {dest} {url}"));
    }

    #[test]
    fn test_apply_overrides_only_present_values() {
        let cfg = parse_config_str("download_workers = 3\nretry_delay_ms = 10").unwrap();
        let mut config = CrawlConfig::default();
        cfg.apply(&mut config);

        assert_eq!(config.workers.download, 3);
        assert_eq!(config.workers.extraction, 130);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.base_url, ebook_dl_core::config::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_unknown_stage_is_config_error() {
        let err = parse_config_str("crawl_workers = 3").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownStage("crawl".to_string()))
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_config_str("speed = 3").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_unquoted_string_rejected() {
        let err = parse_config_str("base_url = https://x").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_missing_equals_rejected() {
        let err = parse_config_str("\n\nbase_url").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_worker_override() {
        assert_eq!(
            parse_worker_override("download=20").unwrap(),
            (StageKind::Download, 20)
        );
        assert!(parse_worker_override("download").is_err());
        assert!(parse_worker_override("download=x").is_err());

        let err = parse_worker_override("crawl=2").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "output_dir = \"books\"\n").unwrap();
        let cfg = load_file_config(Some(&path)).unwrap().unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("books")));
    }
}
