use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{TtsEngine, TtsError};

/// Name-keyed table of TTS engines with a single default slot.
///
/// The first engine registered becomes the default. Concurrent readers are
/// allowed; writers are serialized.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    engines: HashMap<String, Arc<dyn TtsEngine>>,
    default: String,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine; rejects duplicate names.
    pub fn register(&self, engine: Arc<dyn TtsEngine>) -> Result<(), TtsError> {
        let mut inner = self.inner.write();

        let name = engine.name().to_string();
        if inner.engines.contains_key(&name) {
            return Err(TtsError::EngineExists);
        }

        if inner.default.is_empty() {
            inner.default = name.clone();
        }
        inner.engines.insert(name, engine);
        Ok(())
    }

    /// Look up an engine by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TtsEngine>, TtsError> {
        self.inner
            .read()
            .engines
            .get(name)
            .cloned()
            .ok_or(TtsError::EngineNotFound)
    }

    /// The default engine, if any is registered.
    pub fn default_engine(&self) -> Result<Arc<dyn TtsEngine>, TtsError> {
        let inner = self.inner.read();
        if inner.default.is_empty() {
            return Err(TtsError::EngineNotFound);
        }
        inner
            .engines
            .get(&inner.default)
            .cloned()
            .ok_or(TtsError::EngineNotFound)
    }

    /// Change the default; the engine must already be registered.
    pub fn set_default(&self, name: &str) -> Result<(), TtsError> {
        let mut inner = self.inner.write();
        if !inner.engines.contains_key(name) {
            return Err(TtsError::EngineNotFound);
        }
        inner.default = name.to_string();
        Ok(())
    }

    /// Names of all registered engines.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().engines.keys().cloned().collect()
    }
}
