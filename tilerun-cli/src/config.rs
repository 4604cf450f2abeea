use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tilerun_core::OperatorConfig;

pub const CONFIG_FILE: &str = "tilerun.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub operator: OperatorConfig,
    pub default_width: usize,
    pub default_bet: u64,
    pub player: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            operator: OperatorConfig::default(),
            default_width: 5,
            default_bet: 1000,
            player: "local".to_string(),
        }
    }
}

impl CliConfig {
    /// Read `tilerun.json` from the data directory, falling back to defaults.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.operator.validate()?;
        Ok(config)
    }
}
