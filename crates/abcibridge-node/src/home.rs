//! Node home directory maintenance.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{NodeError, Result};

pub const CONFIG_DIR: &str = "config";
pub const DATA_DIR: &str = "data";
pub const GENESIS_FILE: &str = "genesis.json";
pub const CONFIG_FILE: &str = "config.toml";
pub const PRIV_VALIDATOR_KEY_FILE: &str = "priv_validator_key.json";

/// `config.toml` edits for a single isolated local node.
pub const DEFAULT_CONFIG_OVERRIDES: &[(&str, &str)] = &[
    ("fast_sync = true", "fast_sync = false"),
    ("max_num_outbound_peers = 10", "max_num_outbound_peers = 0"),
    ("pex = true", "pex = false"),
];

pub fn genesis_path(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(GENESIS_FILE)
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

pub fn validator_key_path(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(PRIV_VALIDATOR_KEY_FILE)
}

/// True if `home` already holds a genesis file or validator key.
pub fn has_node_state(home: &Path) -> bool {
    genesis_path(home).exists() || validator_key_path(home).exists()
}

/// Remove the `config` and `data` directories under `home`.
pub async fn clear_node_state(home: &Path) -> Result<()> {
    for dir in [CONFIG_DIR, DATA_DIR] {
        let path = home.join(dir);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed node state"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Genesis values a reset falls back to when none are given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenesisDefaults {
    pub genesis_time: Option<String>,
    pub app_hash: Option<String>,
}

pub async fn read_genesis_defaults(home: &Path) -> Result<GenesisDefaults> {
    let (_, genesis) = load_genesis(home).await?;
    let field = |name: &str| genesis.get(name).and_then(Value::as_str).map(str::to_string);
    Ok(GenesisDefaults {
        genesis_time: field("genesis_time"),
        app_hash: field("app_hash"),
    })
}

/// Rewrite `genesis.json` so the chain restarts from height zero.
///
/// Sets `genesis_time` and `app_hash`, forces `initial_height` to `"0"` and
/// keeps every other field.
pub async fn reset_genesis(home: &Path, genesis_time: &str, app_hash: &str) -> Result<()> {
    let (path, mut genesis) = load_genesis(home).await?;
    genesis.insert("genesis_time".into(), Value::from(genesis_time));
    genesis.insert("app_hash".into(), Value::from(app_hash));
    genesis.insert("initial_height".into(), Value::from("0"));

    write_json(&path, &genesis).await?;

    info!(path = %path.display(), genesis_time, app_hash, "genesis reset");
    Ok(())
}

/// Chain settings for a rebuilt `genesis.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub genesis_time: String,
    pub chain_id: String,
    pub consensus_params: Value,
}

/// One member of the genesis validator set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: String,
    pub pub_key: Value,
    pub power: String,
    pub name: String,
}

/// Input document for [`write_genesis`]: chain settings plus validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisUpdate {
    pub genesis_config: GenesisConfig,
    pub validators: Vec<GenesisValidator>,
}

#[derive(Serialize)]
struct Genesis<'a> {
    genesis_time: &'a str,
    chain_id: &'a str,
    consensus_params: &'a Value,
    initial_height: &'static str,
    validators: &'a [GenesisValidator],
    app_hash: &'static str,
}

/// Replace `genesis.json` with a fresh document for a new validator set.
///
/// Unlike [`reset_genesis`] nothing from the old file survives; the chain
/// starts at height `"0"` with an empty app hash.
pub async fn write_genesis(home: &Path, update: &GenesisUpdate) -> Result<()> {
    let path = genesis_path(home);
    let config = &update.genesis_config;
    let genesis = Genesis {
        genesis_time: &config.genesis_time,
        chain_id: &config.chain_id,
        consensus_params: &config.consensus_params,
        initial_height: "0",
        validators: &update.validators,
        app_hash: "",
    };
    write_json(&path, &genesis).await?;

    info!(
        path = %path.display(),
        chain_id = %config.chain_id,
        validators = update.validators.len(),
        "genesis rewritten"
    );
    Ok(())
}

/// Public validator parameters: `priv_validator_key.json` without `priv_key`.
pub async fn read_validator_params(home: &Path) -> Result<Map<String, Value>> {
    let path = validator_key_path(home);
    let mut params = load_object(&path).await?;
    params.remove("priv_key");
    Ok(params)
}

/// Apply textual `(from, to)` replacements to `config.toml`.
///
/// Returns how many of the overrides matched.
pub async fn override_config(home: &Path, overrides: &[(&str, &str)]) -> Result<usize> {
    let path = config_path(home);
    let mut contents = tokio::fs::read_to_string(&path).await?;

    let mut applied = 0;
    for (from, to) in overrides {
        if contents.contains(from) {
            contents = contents.replace(from, to);
            applied += 1;
        }
    }
    tokio::fs::write(&path, contents).await?;

    debug!(path = %path.display(), applied, "config overrides applied");
    Ok(applied)
}

async fn load_genesis(home: &Path) -> Result<(PathBuf, Map<String, Value>)> {
    let path = genesis_path(home);
    let genesis = load_object(&path).await?;
    Ok((path, genesis))
}

async fn load_object(path: &Path) -> Result<Map<String, Value>> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|source| NodeError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut rendered =
        serde_json::to_string_pretty(value).map_err(|source| NodeError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;
    rendered.push('\n');
    tokio::fs::write(path, rendered).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = r#"{
  "genesis_time": "2022-01-01T00:00:00.000000000Z",
  "chain_id": "test-chain",
  "initial_height": "1",
  "consensus_params": {"block": {"max_bytes": "22020096"}},
  "validators": [{"name": "v0", "power": "10"}],
  "app_hash": "abc"
}"#;

    fn home_with(file: &str, contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(dir.path().join(CONFIG_DIR).join(file), contents).unwrap();
        dir
    }

    #[tokio::test]
    async fn reset_genesis_preserves_other_fields() {
        let home = home_with(GENESIS_FILE, GENESIS);
        reset_genesis(home.path(), "2023-05-05T05:05:05Z", "").await.unwrap();

        let raw = std::fs::read_to_string(genesis_path(home.path())).unwrap();
        let genesis: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(genesis["genesis_time"], "2023-05-05T05:05:05Z");
        assert_eq!(genesis["app_hash"], "");
        assert_eq!(genesis["initial_height"], "0");
        assert_eq!(genesis["chain_id"], "test-chain");
        assert_eq!(genesis["validators"][0]["name"], "v0");
        assert_eq!(genesis["consensus_params"]["block"]["max_bytes"], "22020096");
    }

    #[tokio::test]
    async fn genesis_defaults_come_from_file() {
        let home = home_with(GENESIS_FILE, GENESIS);
        let defaults = read_genesis_defaults(home.path()).await.unwrap();
        assert_eq!(
            defaults.genesis_time.as_deref(),
            Some("2022-01-01T00:00:00.000000000Z")
        );
        assert_eq!(defaults.app_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn invalid_genesis_is_reported() {
        let home = home_with(GENESIS_FILE, "[1, 2, 3]");
        let err = reset_genesis(home.path(), "t", "h").await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidJson { .. }));
    }

    #[tokio::test]
    async fn missing_genesis_is_io_error() {
        let home = tempfile::tempdir().unwrap();
        let err = reset_genesis(home.path(), "t", "h").await.unwrap_err();
        assert!(matches!(err, NodeError::Io(_)));
    }

    #[tokio::test]
    async fn default_overrides_isolate_the_node() {
        let toml = "fast_sync = true\n[p2p]\npex = true\nmax_num_outbound_peers = 10\nseeds = \"\"\n";
        let home = home_with(CONFIG_FILE, toml);

        let applied = override_config(home.path(), DEFAULT_CONFIG_OVERRIDES).await.unwrap();
        assert_eq!(applied, 3);

        let rewritten = std::fs::read_to_string(config_path(home.path())).unwrap();
        assert_eq!(
            rewritten,
            "fast_sync = false\n[p2p]\npex = false\nmax_num_outbound_peers = 0\nseeds = \"\"\n"
        );

        let applied = override_config(home.path(), DEFAULT_CONFIG_OVERRIDES).await.unwrap();
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn validator_params_omit_private_key() {
        let key = r#"{
  "address": "ABCD",
  "pub_key": {"type": "tendermint/PubKeyEd25519", "value": "cHVi"},
  "priv_key": {"type": "tendermint/PrivKeyEd25519", "value": "c2VjcmV0"}
}"#;
        let home = home_with(PRIV_VALIDATOR_KEY_FILE, key);

        let params = read_validator_params(home.path()).await.unwrap();
        assert_eq!(params["address"], "ABCD");
        assert_eq!(params["pub_key"]["value"], "cHVi");
        assert!(!params.contains_key("priv_key"));

        let on_disk = std::fs::read_to_string(validator_key_path(home.path())).unwrap();
        assert!(on_disk.contains("priv_key"), "key file must not be modified");
    }

    #[tokio::test]
    async fn missing_validator_key_is_io_error() {
        let home = tempfile::tempdir().unwrap();
        let err = read_validator_params(home.path()).await.unwrap_err();
        assert!(matches!(err, NodeError::Io(_)));
    }

    #[tokio::test]
    async fn write_genesis_replaces_whole_document() {
        let home = home_with(GENESIS_FILE, GENESIS);
        let update: GenesisUpdate = serde_json::from_value(serde_json::json!({
            "genesis_config": {
                "genesis_time": "2024-02-02T00:00:00Z",
                "chain_id": "fresh-chain",
                "consensus_params": {"block": {"max_bytes": "1024"}}
            },
            "validators": [{
                "address": "A1",
                "pub_key": {"type": "tendermint/PubKeyEd25519", "value": "a2V5"},
                "power": "5",
                "name": "node0"
            }]
        }))
        .unwrap();

        write_genesis(home.path(), &update).await.unwrap();

        let raw = std::fs::read_to_string(genesis_path(home.path())).unwrap();
        let genesis: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(genesis["chain_id"], "fresh-chain");
        assert_eq!(genesis["genesis_time"], "2024-02-02T00:00:00Z");
        assert_eq!(genesis["initial_height"], "0");
        assert_eq!(genesis["app_hash"], "");
        assert_eq!(genesis["consensus_params"]["block"]["max_bytes"], "1024");
        assert_eq!(genesis["validators"][0]["name"], "node0");
        assert_eq!(genesis["validators"][0]["power"], "5");
        assert_eq!(genesis["validators"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_node_state_removes_config_and_data() {
        let home = home_with(GENESIS_FILE, GENESIS);
        std::fs::create_dir_all(home.path().join(DATA_DIR)).unwrap();
        std::fs::write(home.path().join("keep.txt"), "x").unwrap();
        assert!(has_node_state(home.path()));

        clear_node_state(home.path()).await.unwrap();
        assert!(!has_node_state(home.path()));
        assert!(!home.path().join(DATA_DIR).exists());
        assert!(home.path().join("keep.txt").exists());

        clear_node_state(home.path()).await.unwrap();
    }
}
