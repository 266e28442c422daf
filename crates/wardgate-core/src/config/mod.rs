//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Wardgate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub search: SearchConfig,
    pub policy: PolicyConfig,
    pub pipeline: PipelineConfig,
}

/// Search index collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub auth_token: Option<String>,
}

/// Policy decision point collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub auth_token: Option<String>,
}

/// Pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// In-flight policy checks per invocation
    pub authorization_window: usize,
    /// Upper bound on requested page size
    pub max_page_size: u32,
    /// Suggestions requested from the index per invocation
    pub suggestion_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                base_url: "http://localhost:9200".to_string(),
                timeout_secs: 30,
                auth_token: None,
            },
            policy: PolicyConfig {
                base_url: "http://localhost:8181".to_string(),
                timeout_secs: 10,
                auth_token: None,
            },
            pipeline: PipelineConfig {
                authorization_window: 10,
                max_page_size: 100,
                suggestion_limit: 10,
            },
        }
    }
}

impl SearchConfig {
    pub fn resolved_auth_token(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(env::var("WARDGATE_SEARCH_TOKEN").ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.auth_token.is_some() {
            return Err(anyhow!(
                "Search backend tokens must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl PolicyConfig {
    pub fn resolved_auth_token(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(env::var("WARDGATE_POLICY_TOKEN").ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.auth_token.is_some() {
            return Err(anyhow!(
                "Policy service tokens must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Redact a token for display, keeping the last four characters
fn redacted(token: &str) -> String {
    // Walk chars from the end so the suffix lands on a char boundary.
    match token.char_indices().rev().nth(3) {
        Some((idx, _)) if idx > 0 => format!("***{}", &token[idx..]),
        _ => "***".to_string(),
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("WARDGATE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("wardgate")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.search.enforce_env_only()?;
        self.policy.enforce_env_only()?;

        if self.pipeline.authorization_window == 0 {
            return Err(anyhow!("pipeline.authorization_window must be at least 1"));
        }
        if self.pipeline.max_page_size == 0 {
            return Err(anyhow!("pipeline.max_page_size must be at least 1"));
        }
        if self.pipeline.suggestion_limit == 0 {
            return Err(anyhow!("pipeline.suggestion_limit must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Search backend settings
            "search.base_url" => Ok(self.search.base_url.clone()),
            "search.timeout_secs" => Ok(self.search.timeout_secs.to_string()),

            // Policy service settings
            "policy.base_url" => Ok(self.policy.base_url.clone()),
            "policy.timeout_secs" => Ok(self.policy.timeout_secs.to_string()),

            // Pipeline settings
            "pipeline.authorization_window" => {
                Ok(self.pipeline.authorization_window.to_string())
            }
            "pipeline.max_page_size" => Ok(self.pipeline.max_page_size.to_string()),
            "pipeline.suggestion_limit" => Ok(self.pipeline.suggestion_limit.to_string()),

            // Tokens (special handling - show redacted)
            "search.auth_token" => match self.search.resolved_auth_token()? {
                Some(token) => Ok(redacted(&token)),
                None => Ok("(not set - use WARDGATE_SEARCH_TOKEN env var)".to_string()),
            },
            "policy.auth_token" => match self.policy.resolved_auth_token()? {
                Some(token) => Ok(redacted(&token)),
                None => Ok("(not set - use WARDGATE_POLICY_TOKEN env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `wardgate config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // Search backend settings
            "search.base_url" => {
                self.search.base_url = value.to_string();
            }
            "search.timeout_secs" => {
                self.search.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Policy service settings
            "policy.base_url" => {
                self.policy.base_url = value.to_string();
            }
            "policy.timeout_secs" => {
                self.policy.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Pipeline settings
            "pipeline.authorization_window" => {
                let window: usize = value
                    .parse()
                    .with_context(|| format!("Invalid authorization_window value: {}", value))?;
                if !(1..=100).contains(&window) {
                    return Err(anyhow!("Authorization window must be between 1 and 100"));
                }
                self.pipeline.authorization_window = window;
            }
            "pipeline.max_page_size" => {
                let size: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_page_size value: {}", value))?;
                if !(1..=500).contains(&size) {
                    return Err(anyhow!("Max page size must be between 1 and 500"));
                }
                self.pipeline.max_page_size = size;
            }
            "pipeline.suggestion_limit" => {
                let limit: usize = value
                    .parse()
                    .with_context(|| format!("Invalid suggestion_limit value: {}", value))?;
                if !(1..=50).contains(&limit) {
                    return Err(anyhow!("Suggestion limit must be between 1 and 50"));
                }
                self.pipeline.suggestion_limit = limit;
            }

            // Tokens cannot be set via config
            "search.auth_token" | "policy.auth_token" => {
                return Err(anyhow!(
                    "Service tokens cannot be stored in configuration for security. \
                     Set the WARDGATE_SEARCH_TOKEN or WARDGATE_POLICY_TOKEN environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `wardgate config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "search.base_url",
            "search.timeout_secs",
            "search.auth_token",
            "policy.base_url",
            "policy.timeout_secs",
            "policy.auth_token",
            "pipeline.authorization_window",
            "pipeline.max_page_size",
            "pipeline.suggestion_limit",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_keeps_last_four_chars() {
        assert_eq!(redacted("svc-token-1234"), "***1234");
        assert_eq!(redacted("abcde"), "***bcde");
        assert_eq!(redacted("abcd"), "***");
        assert_eq!(redacted(""), "***");
    }

    #[test]
    fn test_redacted_handles_multibyte_tokens() {
        // The suffix is taken by char, not by byte offset.
        assert_eq!(redacted("token-naïveté"), "***veté");
        assert_eq!(redacted("€€"), "***");
    }
}
