//! operator configuration
//!
//! an optional json file provides the base, command line flags (and their
//! `AP_*` env fallbacks) override single fields on top of it.

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use ap_client::{ControllerConfig, ProverConfig, RpcConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: Option<RpcConfig>,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub prover: Option<ProverConfig>,
}

/// per-field overrides collected from the command line
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub miner_address: Option<Address>,
    pub trees_address: Option<Address>,
    pub from_block: Option<u64>,
    pub tree_height: Option<usize>,
    pub prover: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides)?;
        Ok(config)
    }

    fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(height) = overrides.tree_height {
            self.controller.tree_height = height;
        }
        if let Some(program) = overrides.prover {
            match &mut self.prover {
                Some(prover) => prover.program = program,
                None => {
                    self.prover = Some(ProverConfig {
                        program,
                        args: Vec::new(),
                        scratch_dir: None,
                    })
                }
            }
        }

        let rpc = match self.rpc.take() {
            Some(mut rpc) => {
                if let Some(url) = overrides.rpc_url {
                    rpc.url = url;
                }
                if let Some(miner) = overrides.miner_address {
                    rpc.miner_address = miner;
                }
                if let Some(trees) = overrides.trees_address {
                    rpc.trees_address = trees;
                }
                if let Some(block) = overrides.from_block {
                    rpc.from_block = block;
                }
                Some(rpc)
            }
            None => match (overrides.miner_address, overrides.trees_address) {
                (Some(miner_address), Some(trees_address)) => Some(RpcConfig {
                    url: overrides
                        .rpc_url
                        .unwrap_or_else(|| "http://127.0.0.1:8545".to_string()),
                    miner_address,
                    trees_address,
                    from_block: overrides.from_block.unwrap_or_default(),
                }),
                (None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "both --miner-address and --trees-address are needed without a config file"
                    ))
                }
            },
        };
        self.rpc = rpc;
        Ok(())
    }

    pub fn rpc(&self) -> Result<&RpcConfig> {
        self.rpc
            .as_ref()
            .ok_or_else(|| anyhow!("no rpc endpoint configured (set AP_MINER_ADDRESS and AP_TREES_ADDRESS)"))
    }

    pub fn prover(&self) -> Result<&ProverConfig> {
        self.prover
            .as_ref()
            .ok_or_else(|| anyhow!("no prover configured (set AP_PROVER)"))
    }
}
