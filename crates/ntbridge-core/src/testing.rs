// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test-only host implementations
//!
//! An in-memory host modelling NT share modes and delete-pending names,
//! and a decorator that injects failure statuses into any host.

#[cfg(test)]
pub mod memory_host;
