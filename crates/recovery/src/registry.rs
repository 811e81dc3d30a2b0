//! Engine registry
//!
//! Maps each [`Engine`] to a factory that opens a [`SqlDriver`] for a
//! connection configuration. The registry is built once at startup and
//! handed to [`crate::PitrRecovery::from_registry`]; nothing registers
//! itself behind the caller's back.
//!
//! ```ignore
//! let mut registry = EngineRegistry::new();
//! registry.register(Engine::MySql, |conn| Ok(Arc::new(MyDriver::open(conn)?) as Arc<dyn SqlDriver>));
//! let recovery = PitrRecovery::from_registry(config, &registry)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pitr_core::{ConnectionConfig, Engine, PitrError, Result};
use tracing::debug;

use crate::connection::SqlDriver;

/// Builds a driver from connection settings
pub type DriverFactory = Box<dyn Fn(&ConnectionConfig) -> Result<Arc<dyn SqlDriver>> + Send + Sync>;

/// Explicit registry of engine drivers
#[derive(Default)]
pub struct EngineRegistry {
    factories: HashMap<Engine, DriverFactory>,
}

impl EngineRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `engine`, replacing any previous one
    pub fn register<F>(&mut self, engine: Engine, factory: F) -> &mut Self
    where
        F: Fn(&ConnectionConfig) -> Result<Arc<dyn SqlDriver>> + Send + Sync + 'static,
    {
        debug!(%engine, "registering driver factory");
        self.factories.insert(engine, Box::new(factory));
        self
    }

    /// Builder form of [`EngineRegistry::register`]
    pub fn with_engine<F>(mut self, engine: Engine, factory: F) -> Self
    where
        F: Fn(&ConnectionConfig) -> Result<Arc<dyn SqlDriver>> + Send + Sync + 'static,
    {
        self.register(engine, factory);
        self
    }

    /// Open a driver for `engine`
    pub fn driver(&self, engine: Engine, config: &ConnectionConfig) -> Result<Arc<dyn SqlDriver>> {
        let factory = self.factories.get(&engine).ok_or_else(|| {
            PitrError::Config(format!("no driver registered for engine {}", engine))
        })?;
        factory(config)
    }

    /// True if `engine` has a factory
    pub fn contains(&self, engine: Engine) -> bool {
        self.factories.contains_key(&engine)
    }

    /// Identifier length limit of `engine`
    pub fn max_identifier_len(&self, engine: Engine) -> usize {
        engine.max_identifier_len()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<&str> = self.factories.keys().map(Engine::as_str).collect();
        engines.sort_unstable();
        f.debug_struct("EngineRegistry")
            .field("engines", &engines)
            .finish()
    }
}
