use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::candidates::MAX_MULTIPV;
use crate::error::EngineResult;

/// Settings for launching and driving an engine.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable
    pub engine_path: PathBuf,
    /// Extra command-line arguments for the engine
    pub engine_args: Vec<String>,
    /// Number of ranked lines requested from the engine
    pub multipv: u32,
    pub handshake_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Period of the display poller
    pub poll_interval_ms: u64,
    pub default_movetime_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("stockfish"),
            engine_args: Vec::new(),
            multipv: 3,
            handshake_timeout_ms: 5000,
            shutdown_grace_ms: 1000,
            poll_interval_ms: 250,
            default_movetime_ms: 1000,
        }
    }
}

impl EngineSettings {
    /// Reads a settings file, then applies `SALMON_*` environment overrides.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .add_source(Environment::with_prefix("SALMON"))
            .build()?;
        let settings: EngineSettings = settings.try_deserialize()?;
        Ok(settings.normalized())
    }

    pub fn normalized(mut self) -> Self {
        self.multipv = self.multipv.clamp(1, MAX_MULTIPV);
        self.poll_interval_ms = self.poll_interval_ms.max(1);
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_movetime(&self) -> Duration {
        Duration::from_millis(self.default_movetime_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let name = format!("salmon-settings-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "engine_path = \"/usr/games/stockfish\"").unwrap();
        writeln!(file, "multipv = 500").unwrap();
        drop(file);

        let settings = EngineSettings::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.engine_path, PathBuf::from("/usr/games/stockfish"));
        assert_eq!(settings.multipv, MAX_MULTIPV);
        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = EngineSettings::load(Path::new("/nonexistent/salmon.toml"));
        assert!(matches!(result, Err(crate::error::EngineError::Config(_))));
    }
}
