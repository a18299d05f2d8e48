// SnapTrace - Snippet Execution Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde::Deserialize;
use snaptrace_common::DEFAULT_SENTINEL_PREFIX;

use crate::InstrumentationError;

/// Configuration of the instrumentation pipeline.
///
/// Every field has a default, so a configuration file only needs to name
/// what it changes:
///
/// ```toml
/// emitter_type = "Docs.Tracing.Emitter"
/// validate_references = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Fully qualified type that receives emission calls in the instrumented program
    pub emitter_type: String,
    /// Static method of `emitter_type` that records one program state
    pub emit_method: String,
    /// Re-resolve every synthesized identifier after rewriting
    pub validate_references: bool,
    /// Prefix of the per-request sentinel token
    pub sentinel_prefix: String,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            emitter_type: "SnapTrace.Emitter".into(),
            emit_method: "EmitProgramState".into(),
            validate_references: true,
            sentinel_prefix: DEFAULT_SENTINEL_PREFIX.into(),
        }
    }
}

impl InstrumentationConfig {
    /// Parses a configuration from TOML and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, InstrumentationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| InstrumentationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the type that receives emission calls
    pub fn with_emitter_type(mut self, emitter_type: impl Into<String>) -> Self {
        self.emitter_type = emitter_type.into();
        self
    }

    /// Set the method that records one program state
    pub fn with_emit_method(mut self, emit_method: impl Into<String>) -> Self {
        self.emit_method = emit_method.into();
        self
    }

    /// Enable or disable validation of synthesized references
    pub fn with_validate_references(mut self, validate: bool) -> Self {
        self.validate_references = validate;
        self
    }

    /// Set the sentinel prefix
    pub fn with_sentinel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sentinel_prefix = prefix.into();
        self
    }

    /// Checks that the emitter names can be spliced into source code and that
    /// the sentinel prefix cannot be confused with program output framing.
    pub fn validate(&self) -> Result<(), InstrumentationError> {
        if !self.emitter_type.split('.').all(is_identifier) {
            return Err(InstrumentationError::Config(format!(
                "emitter type `{}` is not a qualified name",
                self.emitter_type
            )));
        }
        if !is_identifier(&self.emit_method) {
            return Err(InstrumentationError::Config(format!(
                "emit method `{}` is not an identifier",
                self.emit_method
            )));
        }
        if self.sentinel_prefix.is_empty()
            || !self.sentinel_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(InstrumentationError::Config(format!(
                "sentinel prefix `{}` must be non-empty and alphanumeric",
                self.sentinel_prefix
            )));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
