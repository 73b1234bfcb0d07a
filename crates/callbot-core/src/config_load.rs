//! Loading [`crate::agent::AgentConfig`] from a TOML file, the way the
//! pack's CLI-fronted example repos load their configuration.

use std::path::Path;

use crate::agent::AgentConfig;
use crate::error::{AgentError, AgentResult};

impl AgentConfig {
    pub fn from_toml_str(contents: &str) -> AgentResult<Self> {
        toml::from_str(contents).map_err(|e| AgentError::ConfigInvalid(e.to_string()))
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AgentError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_toml_str_rejects_garbage() {
        let result = AgentConfig::from_toml_str("not = [valid");
        assert!(matches!(result, Err(AgentError::ConfigInvalid(_))));
    }

    #[test]
    fn from_toml_str_parses_full_default_shape() {
        let default = AgentConfig::default();
        let serialized = toml::to_string(&default).unwrap();
        let reparsed = AgentConfig::from_toml_str(&serialized).unwrap();
        assert_eq!(reparsed.agent_id, default.agent_id);
        assert_eq!(reparsed.sample_rate, default.sample_rate);
    }
}
