use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::EngineConfig;
use crate::model::RunMode;

/// Default data directory: ~/.crewline
pub fn get_crewline_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".crewline"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<EngineConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let cfg = toml::from_str::<EngineConfig>(&s)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<EngineConfig> {
    // Priority 1: $CREWLINE_CONFIG
    // Priority 2: ~/.crewline/config.toml
    // Priority 3: ./crewline.toml
    let explicit = std::env::var("CREWLINE_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let home_config = get_crewline_data_dir().ok().map(|d| d.join("config.toml"));
    let local_config = PathBuf::from("crewline.toml");

    let mut cfg = if let Some(path) = explicit {
        load_from_path(&path)?
    } else if let Some(path) = home_config.filter(|p| p.exists()) {
        load_from_path(&path)?
    } else if local_config.exists() {
        load_from_path(&local_config)?
    } else {
        EngineConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn apply_env_overrides<F>(cfg: &mut EngineConfig, get: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("CREWLINE_LLM_API_KEY") {
        cfg.llm.api_key = v;
    }
    if let Some(v) = non_empty("CREWLINE_LLM_BASE_URL") {
        cfg.llm.base_url = v;
    }
    if let Some(v) = non_empty("CREWLINE_MODE") {
        cfg.engine.default_mode = v.parse::<RunMode>().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CREWLINE_LLM_API_KEY", "sk-test"),
            ("CREWLINE_MODE", "real"),
            ("CREWLINE_LLM_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.llm.api_key, "sk-test");
        assert_eq!(cfg.engine.default_mode, RunMode::Real);
        assert_eq!(cfg.llm.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_invalid_mode_override_is_an_error() {
        let mut cfg = EngineConfig::default();
        let res = apply_env_overrides(&mut cfg, |k| {
            (k == "CREWLINE_MODE").then(|| "turbo".to_string())
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ntask_timeout_ms = 1000\n[http_server]\nport = 9999").unwrap();

        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.engine.task_timeout_ms, 1000);
        assert_eq!(cfg.http_server.port, 9999);
    }
}
