// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Context, Result};
use concerto_events::PartyId;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// One roster member as written in configuration: network address plus
/// hex-encoded identity key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PartyEntry {
    pub addr: String,
    pub pubkey: String,
}

impl PartyEntry {
    pub fn party_id(&self) -> Result<PartyId> {
        let pubkey = hex::decode(&self.pubkey)
            .with_context(|| format!("pubkey for {} is not hex", self.addr))?;
        Ok(PartyId::new(self.addr.clone(), pubkey))
    }
}

/// Per-node configuration, loaded from a TOML file with `CONCERTO_`
/// environment overrides on top.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// This node's network address.
    pub addr: String,
    /// This node's hex-encoded identity key.
    pub pubkey: String,
    /// The fixed, ordered set of session members. Circuit variable
    /// suffixes index into this list, so order matters.
    pub roster: Vec<PartyEntry>,
    /// How long a delegated request waits for its reply. Expiry is
    /// terminal; there is no retry.
    pub request_timeout_ms: u64,
    /// Default log directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            pubkey: String::new(),
            roster: Vec::new(),
            request_timeout_ms: 30_000,
            log_filter: "info".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn party_id(&self) -> Result<PartyId> {
        let pubkey = hex::decode(&self.pubkey).context("node pubkey is not hex")?;
        Ok(PartyId::new(self.addr.clone(), pubkey))
    }

    pub fn roster_ids(&self) -> Result<Vec<PartyId>> {
        self.roster.iter().map(PartyEntry::party_id).collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            bail!("addr must not be empty");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be positive");
        }
        let me = self.party_id()?;
        let roster = self.roster_ids()?;
        if roster.is_empty() {
            bail!("roster must not be empty");
        }
        if !roster.contains(&me) {
            bail!("roster does not contain this node ({})", self.addr);
        }
        Ok(())
    }
}

/// Load and validate configuration: defaults, then the TOML file if
/// given, then `CONCERTO_*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let mut figment = Figment::from(Serialized::defaults(NodeConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    let config: NodeConfig = figment
        .merge(Env::prefixed("CONCERTO_"))
        .extract()
        .context("Could not load node configuration")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const CONFIG: &str = r#"
addr = "alpha:9000"
pubkey = "aa01"
request_timeout_ms = 1500

[[roster]]
addr = "alpha:9000"
pubkey = "aa01"

[[roster]]
addr = "beta:9000"
pubkey = "bb02"
"#;

    #[test]
    fn loads_a_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("concerto.toml", CONFIG)?;
            let config =
                load_config(Some(Path::new("concerto.toml"))).map_err(|e| e.to_string())?;

            assert_eq!(config.addr, "alpha:9000");
            assert_eq!(config.request_timeout(), Duration::from_millis(1500));
            assert_eq!(config.log_filter, "info");

            let roster = config.roster_ids().map_err(|e| e.to_string())?;
            assert_eq!(roster.len(), 2);
            assert_eq!(roster[0], config.party_id().map_err(|e| e.to_string())?);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file("concerto.toml", CONFIG)?;
            jail.set_env("CONCERTO_REQUEST_TIMEOUT_MS", "250");
            jail.set_env("CONCERTO_LOG_FILTER", "debug");

            let config =
                load_config(Some(Path::new("concerto.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.request_timeout_ms, 250);
            assert_eq!(config.log_filter, "debug");
            Ok(())
        });
    }

    #[test]
    fn rejects_a_roster_missing_this_node() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "concerto.toml",
                r#"
addr = "gamma:9000"
pubkey = "cc03"

[[roster]]
addr = "alpha:9000"
pubkey = "aa01"
"#,
            )?;
            assert!(load_config(Some(Path::new("concerto.toml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn rejects_non_hex_keys_and_zero_timeouts() {
        let mut config = NodeConfig {
            addr: "alpha:9000".into(),
            pubkey: "not-hex".into(),
            roster: vec![PartyEntry {
                addr: "alpha:9000".into(),
                pubkey: "not-hex".into(),
            }],
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        config.pubkey = "aa01".into();
        config.roster[0].pubkey = "aa01".into();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_alone_do_not_validate() {
        assert!(NodeConfig::default().validate().is_err());
    }
}
