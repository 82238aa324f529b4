//! Target dialects and their pagination strategies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Microsoft SQL Server.
    SqlServer,
    /// Oracle.
    Oracle,
    /// MySQL.
    MySql,
    /// PostgreSQL.
    #[default]
    PostgreSql,
    /// SQLite.
    Sqlite,
}

/// How a dialect skips rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaginationStrategy {
    /// Number rows with `ROW_NUMBER()` in a nested statement and filter on
    /// the number.
    RowNumber,
    /// Native `OFFSET`/`LIMIT` (or `OFFSET ... FETCH`).
    OffsetFetch,
}

impl Dialect {
    /// The pagination strategy used for this dialect.
    #[must_use]
    pub const fn pagination(self) -> PaginationStrategy {
        match self {
            Self::SqlServer | Self::Oracle => PaginationStrategy::RowNumber,
            Self::MySql | Self::PostgreSql | Self::Sqlite => PaginationStrategy::OffsetFetch,
        }
    }

    /// Lower-case dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
