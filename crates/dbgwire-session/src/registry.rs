//! Named plugin factories.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::plugin::{BackendPlugin, ViewPlugin};

type BackendFactory = Box<dyn Fn() -> Box<dyn BackendPlugin>>;
type ViewFactory = Box<dyn Fn() -> Box<dyn ViewPlugin>>;

/// Creates plugins by name.
///
/// Registering a name twice replaces the earlier factory.
#[derive(Default)]
pub struct PluginRegistry {
    backends: BTreeMap<String, BackendFactory>,
    views: BTreeMap<String, ViewFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_backend<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BackendPlugin> + 'static,
    {
        let name = name.into();
        debug!(%name, "registered backend");
        self.backends.insert(name, Box::new(factory));
    }

    pub fn register_view<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ViewPlugin> + 'static,
    {
        let name = name.into();
        debug!(%name, "registered view");
        self.views.insert(name, Box::new(factory));
    }

    pub fn create_backend(&self, name: &str) -> SessionResult<Box<dyn BackendPlugin>> {
        self.backends
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| SessionError::unknown_plugin(name))
    }

    pub fn create_view(&self, name: &str) -> SessionResult<Box<dyn ViewPlugin>> {
        self.views
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| SessionError::unknown_plugin(name))
    }

    /// Registered backend names, sorted.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Registered view names, sorted.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}
