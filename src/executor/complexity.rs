//! Complexity analysis
//!
//! Counts operations, joins and filters against the configured soft
//! ceilings. Exceeding a ceiling produces a warning; the query still runs.

use crate::config::QueryConfig;
use crate::token::{OperationCounts, Token};

/// Counts plus one warning per exceeded ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityReport {
    pub counts: OperationCounts,
    pub warnings: Vec<String>,
}

impl ComplexityReport {
    pub fn is_complex(&self) -> bool {
        !self.warnings.is_empty()
    }
}

pub struct ComplexityAnalyzer<'a> {
    config: &'a QueryConfig,
}

impl<'a> ComplexityAnalyzer<'a> {
    pub fn new(config: &'a QueryConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, token: &Token) -> ComplexityReport {
        let counts = token.counts();
        let checks = [
            ("operations", counts.operations, self.config.max_operations),
            ("joins", counts.joins, self.config.max_joins),
            ("filters", counts.filters, self.config.max_filters),
        ];
        let warnings = checks
            .iter()
            .filter(|(_, count, max)| count > max)
            .map(|(what, count, max)| {
                format!("query has {} {}, recommended maximum is {}", count, what, max)
            })
            .collect();
        ComplexityReport { counts, warnings }
    }
}
