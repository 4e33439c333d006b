use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// What a backend constructor needs to load its model.
#[derive(Clone, Debug)]
pub struct BackendSpec {
    pub model_path: PathBuf,
    pub image_size: u32,
}

type BackendFactory = fn(&BackendSpec) -> Result<Box<dyn DetectorBackend>>;

/// Registry of detector backend constructors, keyed by name.
///
/// Constructors are stored instead of instances so that only the selected
/// backend ever loads a model.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    ///
    /// `tract` is the default when the `backend-tract` feature is enabled.
    /// `stub` is always available but never the default: it loads no model.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "backend-tract")]
        registry.register_default("tract", |spec| {
            let backend = super::backends::TractBackend::new(&spec.model_path, spec.image_size)?;
            Ok(Box::new(backend))
        });
        registry.register("stub", |_| Ok(Box::new(StubBackend::new())));
        registry
    }

    /// Register a constructor that must be selected by name.
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Register a constructor and make it the default.
    pub fn register_default(&mut self, name: &str, factory: BackendFactory) {
        self.register(name, factory);
        self.default_name = Some(name.to_string());
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends in name order.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Construct (and load) the named backend.
    pub fn build(&self, name: &str, spec: &BackendSpec) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(spec)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
