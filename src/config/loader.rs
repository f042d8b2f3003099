use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::config::models::BridgeSettings;

/// Prefix of environment variables overriding file settings,
/// e.g. `NACOS_BRIDGE__SOURCE__DATA_ID=app.yaml`
pub const ENV_PREFIX: &str = "NACOS_BRIDGE";

/// Load settings from a file using the config crate, then apply environment overrides.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_settings(config_path: &str) -> Result<BridgeSettings> {
    load_settings_sync(config_path)
}

/// Load settings synchronously
pub fn load_settings_sync(config_path: &str) -> Result<BridgeSettings> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .wrap_err_with(|| format!("Failed to build settings from {}", config_path.display()))?;

    let mut bridge: BridgeSettings = settings.try_deserialize().wrap_err_with(|| {
        format!(
            "Failed to deserialize settings from {}",
            config_path.display()
        )
    })?;

    // Validate and default each section the same way the builders do
    bridge.source = bridge
        .source
        .map(|source| source.finish())
        .transpose()
        .wrap_err("Invalid [source] section")?;
    bridge.registry = bridge
        .registry
        .map(|registry| registry.finish())
        .transpose()
        .wrap_err("Invalid [registry] section")?;

    Ok(bridge)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::LogLevel;

    #[tokio::test]
    async fn test_load_yaml_settings() {
        let yaml_content = r#"
source:
  client:
    endpoint: "http://10.0.0.1:8848"
    namespace_id: "ns1"
    group: "G"
  data_id: "app.yaml"
registry:
  client:
    endpoint: "http://10.0.0.1:8848"
    namespace_id: "ns1"
    log_level: "info"
  weight: 10
  skip_schemes: ["http"]
logging:
  json: true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let settings = load_settings(temp_file.path().to_str().unwrap())
            .await
            .unwrap();

        let source = settings.source.unwrap();
        assert_eq!(source.group(), "G");
        assert_eq!(source.data_id, "app.yaml");
        assert_eq!(source.watch_capacity, 1);
        assert_eq!(source.client.timeout_ms, 5000);

        let registry = settings.registry.unwrap();
        assert_eq!(registry.weight, 10.0);
        assert_eq!(registry.cluster, "DEFAULT");
        assert_eq!(registry.client.log_level, LogLevel::Info);
        assert!(registry.skips_scheme("http"));
        assert!(settings.logging.json);
    }

    #[tokio::test]
    async fn test_load_json_settings() {
        let json_content = r#"
{
  "registry": {
    "client": {
      "endpoint": "https://nacos.example.com",
      "namespace_id": "prod"
    },
    "cluster": "BLUE"
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let settings = load_settings(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(settings.source.is_none());
        let registry = settings.registry.unwrap();
        assert_eq!(registry.cluster, "BLUE");
        assert_eq!(registry.client.server().unwrap().port, 443);
    }

    #[tokio::test]
    async fn test_invalid_section_is_rejected() {
        let yaml_content = r#"
source:
  client:
    endpoint: "http://10.0.0.1:8848"
    namespace_id: "ns1"
  data_id: ""
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        assert!(
            load_settings(temp_file.path().to_str().unwrap())
                .await
                .is_err()
        );
    }
}
