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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Default prefix of generated sentinels.
pub const DEFAULT_SENTINEL_PREFIX: &str = "snaptrace";

/// A per-request token that delimits structured blocks in captured output.
///
/// A sentinel is generated once per instrumentation request and shared by the
/// runtime emitter and the decoder of that request. It carries 128 random bits
/// so that genuine program output cannot collide with it by accident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentinel(String);

impl Sentinel {
    /// Generates a fresh sentinel with the default prefix.
    pub fn generate() -> Self {
        Self::with_prefix(DEFAULT_SENTINEL_PREFIX)
    }

    /// Generates a fresh sentinel with a custom prefix.
    pub fn with_prefix(prefix: &str) -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(format!("<<{prefix}:{}>>", hex::encode(bytes)))
    }

    /// Wraps an existing token, e.g. one received from a remote runner.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// If `line` consists only of repetitions of this sentinel (trailing
    /// whitespace ignored), returns how many.
    pub fn repetitions(&self, line: &str) -> Option<usize> {
        let mut rest = line.trim_end();
        if rest.is_empty() || self.0.is_empty() {
            return None;
        }
        let mut count = 0;
        while let Some(tail) = rest.strip_prefix(self.0.as_str()) {
            rest = tail;
            count += 1;
        }
        (rest.is_empty() && count > 0).then_some(count)
    }
}

impl Display for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sentinel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_sentinels_differ() {
        let a = Sentinel::generate();
        let b = Sentinel::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("<<snaptrace:"));
        assert!(a.as_str().ends_with(">>"));
        // 32 hex digits of entropy
        assert_eq!(a.as_str().len(), "<<snaptrace:>>".len() + 32);
    }

    #[test]
    fn test_repetitions() {
        let s = Sentinel::from_token("<<S>>");
        assert_eq!(s.repetitions("<<S>>"), Some(1));
        assert_eq!(s.repetitions("<<S>><<S>>"), Some(2));
        assert_eq!(s.repetitions("<<S>>\r"), Some(1));
        assert_eq!(s.repetitions("<<S>> x"), None);
        assert_eq!(s.repetitions("x<<S>>"), None);
        assert_eq!(s.repetitions(""), None);
    }
}
