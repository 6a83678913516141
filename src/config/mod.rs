// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
        }
        _ => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_json_by_default() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"listen": {{"port": 3000}}, "backends": [{{"host": "127.0.0.1", "port": 2775}}]}}"#
        )
        .unwrap();

        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.listen.port, 3000);
        assert_eq!(config.backends[0].id(), "127.0.0.1:2775");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "health_check:\n  interval_secs: 0").unwrap();

        assert!(load_config(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = load_config("/nonexistent/lb.yaml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
