//! TOML parser with helpful error messages

use super::schema::WatcherConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse revwatch.toml with detailed error messages
pub fn parse_watcher_toml(path: &Path) -> Result<WatcherConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_watcher_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse revwatch.toml content from string
pub fn parse_watcher_toml_str(content: &str) -> Result<WatcherConfig> {
    let config: WatcherConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Attach the offending lines to a TOML parse error
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    match error.span() {
        Some(span) => {
            let line_num = content[..span.start.min(content.len())]
                .matches('\n')
                .count()
                + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                get_line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &WatcherConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdentityStrategy, SizeLimit};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse_watcher_toml_str("").unwrap();
        assert_eq!(config, WatcherConfig::default());
        assert_eq!(config.fetch.retries, 9);
        assert_eq!(config.target.name, "fluxdemo");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[fetch]
retries = 2
max_download_size = "unlimited"
max_untar_size = 1048576
hostname_override = "localhost:8080"

[target]
api_version = "example.com/v1"
kind = "Widget"
plural = "widgets"
name = "demo"
namespace = "apps"
identity = "entry-name"

[cluster]
api_server = "https://127.0.0.1:6443"
insecure_skip_tls_verify = true

[controller]
scratch_dir = "/var/tmp/revwatch"
requeue_base_ms = 100
requeue_max_ms = 1000
"#;

        let config = parse_watcher_toml_str(toml).unwrap();
        assert_eq!(config.fetch.retries, 2);
        assert_eq!(config.fetch.max_download_size, SizeLimit::Unlimited);
        assert_eq!(config.fetch.max_untar_size, SizeLimit::Bytes(1_048_576));
        assert_eq!(config.target.identity, IdentityStrategy::EntryName);
        assert_eq!(config.target.api_resource().group, "example.com");
        assert!(config.cluster.insecure_skip_tls_verify);
        assert_eq!(config.controller.requeue_base_ms, 100);
    }

    #[test]
    fn test_parse_rejects_unknown_size_keyword() {
        let toml = r#"
[fetch]
max_download_size = "huge"
"#;
        assert!(parse_watcher_toml_str(toml).is_err());
    }

    #[test]
    fn test_parse_invalid_toml_reports_line() {
        let toml = "[fetch]\nretries = \"three\"\n";
        let err = parse_watcher_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("line 2"), "unexpected error: {err}");
    }

    #[test]
    fn test_parse_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[target]\nname = \"from-file\"").unwrap();

        let config = parse_watcher_toml(file.path()).unwrap();
        assert_eq!(config.target.name, "from-file");
    }

    #[test]
    fn test_round_trip_keeps_unlimited_keyword() {
        let mut config = WatcherConfig::default();
        config.fetch.max_untar_size = SizeLimit::Unlimited;

        let toml = to_toml(&config).unwrap();
        assert!(toml.contains("max_untar_size = \"unlimited\""));
        assert_eq!(parse_watcher_toml_str(&toml).unwrap(), config);
    }
}
