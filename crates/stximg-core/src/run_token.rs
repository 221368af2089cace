//! Run isolation tokens.
//!
//! Each pipeline invocation namespaces its working directory with a token
//! that is unique by construction, so concurrent runs on a shared filesystem
//! never collide. The token carries no semantics beyond being a path
//! segment.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

/// Opaque, collision-resistant token identifying one pipeline run.
///
/// Format: `<unix-seconds>-<uuid4>`. The timestamp prefix keeps sibling run
/// directories roughly sortable; uniqueness rests entirely on the UUID's
/// 122 bits of randomness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunToken(String);

impl RunToken {
    /// Generates a fresh token. Never reused across runs.
    #[must_use]
    pub fn generate() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self(format!("{seconds}-{}", Uuid::new_v4().simple()))
    }

    /// Returns the token as a path-segment string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_tokens_are_distinct_across_many_generations() {
        let tokens: HashSet<RunToken> = (0..10_000).map(|_| RunToken::generate()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_token_is_a_safe_path_segment() {
        let token = RunToken::generate();
        assert!(!token.as_str().is_empty());
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_display_matches_as_str() {
        let token = RunToken::generate();
        assert_eq!(token.to_string(), token.as_str());
    }
}
