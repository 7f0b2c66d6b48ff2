//! Test-file detection.

use regex::Regex;

use crate::config::ConfigError;

/// Compiled test-file patterns, built once from configuration.
#[derive(Debug, Clone)]
pub struct TestPatterns {
    patterns: Vec<Regex>,
}

impl TestPatterns {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether a repository-relative path names a test file.
    pub fn is_test_file(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let normalized = normalized.trim_start_matches("./");
        self.patterns.iter().any(|re| re.is_match(normalized))
    }
}
