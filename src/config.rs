//! Configuration structs (spec §6). Parsing correctness is a thin
//! pass-through to `toml`/`serde`; this module only defines the target
//! shape and a one-line loader, consistent with config-file parsing being
//! a named non-goal.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub listen: ListenConfig,
    pub filter: FilterConfig,
    /// Tier order is deterministic by iteration of this map (spec §6);
    /// `IndexMap` preserves the order names were written in the file
    /// instead of a `HashMap`'s unspecified order.
    pub tiers: IndexMap<String, TierConfig>,
    pub api: ApiConfig,
    pub fetch: FetchConfig,
    #[serde(default)]
    pub measure: MeasureConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListenConfig {
    pub bind: String,
    pub typesdb: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    pub blacklist: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TierConfig {
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FetchConfig {
    pub bind: String,
    #[serde(default = "default_proxy_timeout", with = "humantime_serde")]
    pub proxy_timeout: Duration,
    #[serde(default)]
    pub remote_port: Option<String>,
}

fn default_proxy_timeout() -> Duration {
    Duration::from_secs(3)
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeasureConfig {
    #[serde(default = "default_measure_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        MeasureConfig {
            interval: default_measure_interval(),
        }
    }
}

fn default_measure_interval() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::error::CocoError::Config(format!("{}: {e}", path.as_ref().display())))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| crate::error::CocoError::Config(format!("{}: {e}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.tiers.is_empty() {
            return Err(crate::error::CocoError::Config("no tiers configured".into()).into());
        }
        for (name, tier) in &self.tiers {
            if tier.targets.is_empty() {
                return Err(crate::error::CocoError::Config(format!("tier {name:?} has no targets")).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_preserving_tier_order() {
        let text = r#"
            [listen]
            bind = "0.0.0.0:25826"
            typesdb = "types.db"

            [filter]
            blacklist = "(vmem|irq)"

            [tiers.c]
            targets = ["127.0.0.1:25827"]

            [tiers.a]
            targets = ["127.0.0.1:25828"]

            [api]
            bind = "0.0.0.0:8080"

            [fetch]
            bind = "0.0.0.0:8081"
            proxy_timeout = "5s"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        let names: Vec<_> = config.tiers.keys().collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(config.fetch.proxy_timeout, Duration::from_secs(5));
        assert_eq!(config.measure.interval, Duration::from_secs(10));
    }

    #[test]
    fn empty_tiers_fails_validation() {
        let text = r#"
            [listen]
            bind = "0.0.0.0:25826"
            typesdb = "types.db"
            [filter]
            blacklist = ""
            [api]
            bind = "0.0.0.0:8080"
            [fetch]
            bind = "0.0.0.0:8081"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
