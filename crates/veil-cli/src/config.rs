//! Protocol configuration loading for the CLI.

use std::path::Path;

use anyhow::Context;
use veil_core::ProtocolConfig;

/// Load from a YAML file, or from the environment when no path is given.
pub fn load_protocol_config(path: Option<&Path>) -> anyhow::Result<ProtocolConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = ProtocolConfig::from_yaml_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(path = %path.display(), "protocol config loaded");
            Ok(config)
        }
        None => ProtocolConfig::from_env().context("reading protocol config from environment"),
    }
}
