//! Template store: every template image a scenario references, decoded once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::GrayImage;
use tapflow_domain::scenario::Scenario;

/// Path → decoded grayscale template.
///
/// Built before a run and read-only afterwards; share it behind an `Arc`.
/// Paths that could not be decoded are simply absent, so matching against
/// them never succeeds.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<PathBuf, GrayImage>,
}

impl TemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every image path reachable from `scenario`.
    ///
    /// Unreadable images are logged and skipped.
    #[must_use]
    pub fn preload(scenario: &Scenario) -> Self {
        let mut store = Self::new();
        let paths = scenario.image_paths();
        for path in &paths {
            store.load(path);
        }
        tracing::info!(
            loaded = store.len(),
            referenced = paths.len(),
            "template images preloaded"
        );
        store
    }

    /// Decode `path` from disk unless it is already cached.
    ///
    /// Returns whether the template is available afterwards.
    pub fn load(&mut self, path: &Path) -> bool {
        if self.templates.contains_key(path) {
            return true;
        }
        match image::open(path) {
            Ok(img) => {
                tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "template loaded");
                self.templates.insert(path.to_path_buf(), img.to_luma8());
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unable to load template image");
                false
            }
        }
    }

    /// Cache an already decoded template under `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, template: GrayImage) {
        self.templates.insert(path.into(), template);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&GrayImage> {
        self.templates.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.templates.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
