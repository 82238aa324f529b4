//! Compiler configuration.

use std::sync::Arc;

use super::TranslationCache;
use crate::navigation::Heterogeneity;
use crate::sql::Dialect;

/// Default cap on the number of or-factors a predicate may flatten into.
pub const DEFAULT_MAX_OR_FACTORS: usize = 64;

/// Configuration for [`QueryCompiler`](super::QueryCompiler).
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Target dialect; decides the pagination strategy.
    /// Default: PostgreSQL
    pub dialect: Dialect,

    /// When a navigation counts as crossing a storage boundary.
    /// Default: [`Heterogeneity::ByStore`]
    pub heterogeneity: Heterogeneity,

    /// Largest number of or-factors a predicate may flatten into before the
    /// predicate is evaluated in memory instead.
    /// Default: 64
    pub max_or_factors: usize,

    /// Cache of translated expressions shared across compilations.
    /// Default: none
    pub translation_cache: Option<Arc<TranslationCache>>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            heterogeneity: Heterogeneity::default(),
            max_or_factors: DEFAULT_MAX_OR_FACTORS,
            translation_cache: None,
        }
    }
}

impl CompilerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the heterogeneity predicate.
    #[must_use]
    pub fn heterogeneity(mut self, heterogeneity: Heterogeneity) -> Self {
        self.heterogeneity = heterogeneity;
        self
    }

    /// Set the or-factor cap.
    #[must_use]
    pub fn max_or_factors(mut self, max: usize) -> Self {
        self.max_or_factors = max;
        self
    }

    /// Share a translation cache with this compiler.
    #[must_use]
    pub fn translation_cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.translation_cache = Some(cache);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PaginationStrategy;

    #[test]
    fn builder_overrides_defaults() {
        let config = CompilerConfig::new();
        assert_eq!(config.dialect, Dialect::PostgreSql);
        assert_eq!(config.max_or_factors, DEFAULT_MAX_OR_FACTORS);
        assert!(config.translation_cache.is_none());

        let config = CompilerConfig::new()
            .dialect(Dialect::SqlServer)
            .heterogeneity(Heterogeneity::Never)
            .max_or_factors(8)
            .translation_cache(Arc::new(TranslationCache::new()));
        assert_eq!(config.dialect.pagination(), PaginationStrategy::RowNumber);
        assert_eq!(config.heterogeneity, Heterogeneity::Never);
        assert_eq!(config.max_or_factors, 8);
        assert!(config.translation_cache.is_some());
    }
}
