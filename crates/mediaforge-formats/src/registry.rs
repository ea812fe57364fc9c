//! Format plugin registry
//!
//! Opens images by sniffing magic bytes first and falling back to file
//! extension, and resolves destination format specifiers for conversion.

use mediaforge_core::{Error, ImageFormat, MediaImage, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::mfi::MfiFormat;
use crate::raw::RawFormat;

/// The set of known format plugins
pub struct Registry {
    plugins: Vec<Arc<dyn ImageFormat>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    /// Create a registry with the in-tree formats registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MfiFormat));
        registry.register(Arc::new(RawFormat));
        registry
    }

    /// Register a format plugin
    pub fn register(&mut self, plugin: Arc<dyn ImageFormat>) {
        self.plugins.push(plugin);
    }

    /// Get all registered plugins
    pub fn plugins(&self) -> &[Arc<dyn ImageFormat>] {
        &self.plugins
    }

    /// Open an image, detecting its format.
    ///
    /// Magic-byte sniffing wins over extension matching so that a renamed
    /// file still opens as what it really is.
    pub fn open(&self, path: &Path) -> Result<Box<dyn MediaImage>> {
        for plugin in &self.plugins {
            if plugin.sniff(path)? {
                debug!(format = plugin.id(), "detected by magic");
                return plugin.open(path);
            }
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            for plugin in &self.plugins {
                if plugin.extensions().contains(&ext.as_str()) {
                    debug!(format = plugin.id(), "detected by extension");
                    return plugin.open(path);
                }
            }
        }

        Err(Error::UnknownFormat(path.display().to_string()))
    }

    /// Resolve a destination format specifier to exactly one writable plugin.
    ///
    /// The specifier may be an extension (with or without a leading dot), a
    /// plugin id, or a plugin name. Zero matches and multiple matches are
    /// both errors.
    pub fn find_writable(&self, spec: &str) -> Result<Arc<dyn ImageFormat>> {
        let needle = spec.trim_start_matches('.').to_lowercase();

        let matches: Vec<&Arc<dyn ImageFormat>> = self
            .plugins
            .iter()
            .filter(|p| p.can_write())
            .filter(|p| {
                p.id().eq_ignore_ascii_case(&needle)
                    || p.name().eq_ignore_ascii_case(spec)
                    || p.extensions().contains(&needle.as_str())
            })
            .collect();

        match matches.len() {
            0 => Err(Error::UnknownFormat(spec.to_string())),
            1 => Ok(Arc::clone(matches[0])),
            _ => Err(Error::AmbiguousFormat(spec.to_string())),
        }
    }

    /// List registered formats: (name, id, extensions, writable)
    pub fn supported_formats(&self) -> Vec<(&'static str, &'static str, &'static [&'static str], bool)> {
        self.plugins
            .iter()
            .map(|p| (p.name(), p.id(), p.extensions(), p.can_write()))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
