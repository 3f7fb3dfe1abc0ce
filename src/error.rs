/*
 *  error.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for the plugin protocol
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::collections::TryReserveError;
use thiserror::Error;

use crate::plugin::ffi::StatusCode;

/// Unified error type for all plugin operations
#[derive(Debug, Error)]
pub enum PluginError {
    /// Buffer or instance allocation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Serialization into the target buffer failed
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// An operation was used outside its contract (lifecycle or schema)
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// A plugin entry point returned `StatusCode::Error`
    #[error("Plugin operation '{operation}' reported an error")]
    Status { operation: &'static str },

    /// A payload was not valid UTF-8
    #[error("Payload is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Panic occurred in plugin code
    #[error("Plugin panic: {0}")]
    Panic(String),

    /// The module could not be loaded or does not export the protocol
    #[error("Plugin load failed: {0}")]
    Load(String),
}

impl PluginError {
    /// Map a status returned by `operation` into a result
    pub fn check(operation: &'static str, status: StatusCode) -> Result<()> {
        match status {
            StatusCode::Ok => Ok(()),
            StatusCode::Error => Err(PluginError::Status { operation }),
        }
    }
}

impl From<TryReserveError> for PluginError {
    fn from(err: TryReserveError) -> Self {
        PluginError::Allocation(err.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Encoding(err.to_string())
    }
}

#[cfg(feature = "plugin-system")]
impl From<libloading::Error> for PluginError {
    fn from(err: libloading::Error) -> Self {
        PluginError::Load(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
