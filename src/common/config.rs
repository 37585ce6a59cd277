// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_joined_block_rows() -> usize {
    65536
}

fn default_non_joined_block_size() -> usize {
    65536
}

fn default_join_overflow_mode() -> String {
    "throw".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub join: JoinConfig,
}

/// Join runtime settings with engine-wide defaults. Per-join values in the
/// descriptor take precedence over these.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    /// Upper bound for one cross-join output chunk before the continuation
    /// mechanism kicks in.
    #[serde(default = "default_max_joined_block_rows")]
    pub max_joined_block_rows: usize,
    /// Chunk size used when scanning non-joined build rows.
    #[serde(default = "default_non_joined_block_size")]
    pub non_joined_block_size: usize,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_rows_in_join: u64,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_bytes_in_join: u64,
    /// "throw" or "break".
    #[serde(default = "default_join_overflow_mode")]
    pub join_overflow_mode: String,
    #[serde(default)]
    pub join_any_take_last_row: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            max_joined_block_rows: default_max_joined_block_rows(),
            non_joined_block_size: default_non_joined_block_size(),
            max_rows_in_join: 0,
            max_bytes_in_join: 0,
            join_overflow_mode: default_join_overflow_mode(),
            join_any_take_last_row: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            join: JoinConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static EngineConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = EngineConfig::load_from_file(path.as_ref())?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

/// Load from $CHUNKJOIN_CONFIG, then ./chunkjoin.toml, then built-in defaults.
pub fn init_from_env_or_default() -> &'static EngineConfig {
    if let Some(cfg) = CONFIG.get() {
        return cfg;
    }
    let cfg = std::env::var("CHUNKJOIN_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            let local = PathBuf::from("chunkjoin.toml");
            local.exists().then_some(local)
        })
        .and_then(|path| EngineConfig::load_from_file(&path).ok())
        .unwrap_or_default();
    let _ = CONFIG.set(cfg);
    CONFIG.get().expect("CONFIG set")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unlimited() {
        let cfg = JoinConfig::default();
        assert_eq!(cfg.max_rows_in_join, 0);
        assert_eq!(cfg.max_bytes_in_join, 0);
        assert_eq!(cfg.join_overflow_mode, "throw");
        assert!(!cfg.join_any_take_last_row);
    }

    #[test]
    fn parses_partial_config() {
        let cfg: EngineConfig =
            toml::from_str("[join]\nmax_rows_in_join = 10\n").expect("config parses");
        assert_eq!(cfg.join.max_rows_in_join, 10);
        assert_eq!(
            cfg.join.max_joined_block_rows,
            default_max_joined_block_rows()
        );
        assert_eq!(cfg.log_level, "info");
    }
}
