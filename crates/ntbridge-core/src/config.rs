// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Translation-layer configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-call transfer bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLimits {
    /// Largest single host read/write; longer requests are split.
    #[serde(default = "default_max_transfer")]
    pub max_transfer: u32,
    /// Upper bound of the directory query buffer used per host call.
    #[serde(default = "default_dir_buffer_max")]
    pub dir_buffer_max: usize,
}

fn default_max_transfer() -> u32 {
    u32::MAX
}

fn default_dir_buffer_max() -> usize {
    32 * 1024
}

impl Default for IoLimits {
    fn default() -> Self {
        Self {
            max_transfer: default_max_transfer(),
            dir_buffer_max: default_dir_buffer_max(),
        }
    }
}

/// Rename retry bound and unlink-while-open trash naming.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePolicy {
    #[serde(default = "default_rename_attempts")]
    pub rename_attempts: u32,
    /// Directory under the volume root holding per-user trash folders.
    #[serde(default = "default_recycle_dir")]
    pub recycle_dir: String,
    /// Prefix of every trashed file name.
    #[serde(default = "default_trash_marker")]
    pub trash_marker: String,
}

fn default_rename_attempts() -> u32 {
    4
}

fn default_recycle_dir() -> String {
    "$Recycle.Bin".to_string()
}

fn default_trash_marker() -> String {
    ".ntbridge".to_string()
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            rename_attempts: default_rename_attempts(),
            recycle_dir: default_recycle_dir(),
            trash_marker: default_trash_marker(),
        }
    }
}

/// Files whose reads get carriage returns rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPolicy {
    #[serde(default = "default_text_suffixes")]
    pub suffixes: Vec<String>,
}

fn default_text_suffixes() -> Vec<String> {
    [".c", ".h", ".hh"].iter().map(|s| s.to_string()).collect()
}

impl Default for TextPolicy {
    fn default() -> Self {
        Self {
            suffixes: default_text_suffixes(),
        }
    }
}

impl TextPolicy {
    /// Compares the text after the last `.` of the path.
    pub fn is_text(&self, path: &str) -> bool {
        match path.rfind('.') {
            Some(idx) => {
                let ext = &path[idx..];
                self.suffixes.iter().any(|s| s == ext)
            }
            None => false,
        }
    }
}

/// Values reported through `stat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPolicy {
    #[serde(default = "default_dev_major")]
    pub dev_major: u32,
    #[serde(default)]
    pub dev_minor: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

fn default_dev_major() -> u32 {
    8
}

fn default_block_size() -> u32 {
    4096
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            dev_major: default_dev_major(),
            dev_minor: 0,
            block_size: default_block_size(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub io: IoLimits,
    #[serde(default)]
    pub namespace: NamespacePolicy,
    #[serde(default)]
    pub text: TextPolicy,
    #[serde(default)]
    pub identity: IdentityPolicy,
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}
