// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! POSIX filesystem view over an NT host
//!
//! [`NtFs`] carries the path-based operations (open, link, unlink, rename,
//! mkdir, rmdir, symlink); handle-based operations live on [`crate::NtFile`].

use std::sync::{Arc, OnceLock};

use crate::config::BridgeConfig;
use crate::host::{HostResult, NtHost};

pub struct NtFs {
    pub(crate) host: Arc<dyn NtHost>,
    pub(crate) config: Arc<BridgeConfig>,
    /// Computed on first use and never invalidated.
    user_sid: OnceLock<String>,
}

impl NtFs {
    pub fn new(host: Arc<dyn NtHost>, config: BridgeConfig) -> Self {
        Self {
            host,
            config: Arc::new(config),
            user_sid: OnceLock::new(),
        }
    }

    pub fn host(&self) -> &Arc<dyn NtHost> {
        &self.host
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn user_sid(&self) -> HostResult<&str> {
        if let Some(sid) = self.user_sid.get() {
            return Ok(sid);
        }
        let sid = self.host.current_user_sid()?;
        Ok(self.user_sid.get_or_init(|| sid))
    }
}
