use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{BridgeError, Result, messages::FallbackIdPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// settings read by the bridge process itself
    pub bridge: BridgeConfig,
    /// settings used by the orchestrator side when spawning bridges
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// template for the id a task reports when its input has none
    pub fallback_id_template: FallbackIdPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// bridge executable, defaults to `planbridge` on PATH
    pub command: PathBuf,
    /// per-invocation timeout in seconds, at least 1, defaults to 120
    pub timeout_secs: u64,
    /// root directory for materialized nodes, defaults to `<tmp>/planbridge`
    pub working_root: Option<PathBuf>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("planbridge"),
            timeout_secs: 120,
            working_root: None,
        }
    }
}

impl LauncherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn working_root(&self) -> PathBuf {
        self.working_root.clone().unwrap_or_else(|| std::env::temp_dir().join("planbridge"))
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| BridgeError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use std::{path::PathBuf, time::Duration};

    use crate::{BridgeError, Config};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        [bridge]
        fallback_id_template = "{task_name}-fallback"

        [launcher]
        command = "/usr/local/bin/planbridge"
        timeout_secs = 30
        working_root = "/var/lib/planbridge"
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.bridge.fallback_id_template.render("Task1A"), "Task1A-fallback");
        assert_eq!(config.launcher.command, PathBuf::from("/usr/local/bin/planbridge"));
        assert_eq!(config.launcher.timeout(), Duration::from_secs(30));
        assert_eq!(config.launcher.working_root(), PathBuf::from("/var/lib/planbridge"));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.bridge.fallback_id_template.render("Task2"), "Task2-result");
        assert_eq!(config.launcher.command, PathBuf::from("planbridge"));
        assert_eq!(config.launcher.timeout(), Duration::from_secs(120));
        assert!(config.launcher.working_root().ends_with("planbridge"));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = Config::load_from_str("[launcher]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.launcher.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_fallback_template() {
        let err = Config::load_from_str("[bridge]\nfallback_id_template = \"fixed\"\n").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
