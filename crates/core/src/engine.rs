//! Database engines and their identifier limits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PitrError;

/// Database engine a recovery runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// MySQL 8.0 and later
    MySql,
    /// PostgreSQL
    Postgres,
}

impl Engine {
    /// Maximum identifier length, in characters
    pub fn max_identifier_len(&self) -> usize {
        match self {
            Engine::MySql => 64,
            Engine::Postgres => 63,
        }
    }

    /// Lowercase engine name as used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::MySql => "mysql",
            Engine::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = PitrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Engine::MySql),
            "postgres" => Ok(Engine::Postgres),
            other => Err(PitrError::Config(format!("unknown engine '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for engine in [Engine::MySql, Engine::Postgres] {
            assert_eq!(engine.as_str().parse::<Engine>().unwrap(), engine);
        }
        assert!("oracle".parse::<Engine>().is_err());
    }

    #[test]
    fn test_identifier_limits() {
        assert_eq!(Engine::MySql.max_identifier_len(), 64);
        assert_eq!(Engine::Postgres.max_identifier_len(), 63);
    }
}
