//! Atomic handle over the bundle currently being served

use std::path::Path;
use std::sync::Arc;

use flowsense_core::{Preprocessor, Result};
use flowsense_learn::ArtifactBundle;
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// A bundle together with the preprocessing transform built from it
#[derive(Debug)]
pub struct LoadedModel {
    bundle: ArtifactBundle,
    preprocessor: Preprocessor,
}

impl LoadedModel {
    /// Build the transform for `bundle`
    pub fn new(bundle: ArtifactBundle, clip_bound: f64) -> Result<Self> {
        let preprocessor = bundle.preprocessor(clip_bound)?;
        Ok(Self { bundle, preprocessor })
    }

    /// The served bundle
    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// The transform built from the bundle's statistics and encoder
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Bundle id
    pub fn id(&self) -> Uuid {
        self.bundle.info().id
    }
}

/// Shared, swappable reference to the serving model.
///
/// Readers take a snapshot with [`BundleHandle::current`] and keep using it
/// for the whole request; a swap only replaces the pointer, so a reader sees
/// either the old model or the new one in full.
#[derive(Debug)]
pub struct BundleHandle {
    current: RwLock<Arc<LoadedModel>>,
    clip_bound: f64,
}

impl BundleHandle {
    /// Start serving `bundle`
    pub fn new(bundle: ArtifactBundle, clip_bound: f64) -> Result<Self> {
        let model = LoadedModel::new(bundle, clip_bound)?;
        info!(id = %model.id(), "Serving bundle");
        Ok(Self {
            current: RwLock::new(Arc::new(model)),
            clip_bound,
        })
    }

    /// Load a bundle from `path` and start serving it
    pub fn open<P: AsRef<Path>>(path: P, clip_bound: f64) -> Result<Self> {
        Self::new(ArtifactBundle::load(path)?, clip_bound)
    }

    /// Snapshot of the serving model
    pub fn current(&self) -> Arc<LoadedModel> {
        Arc::clone(&self.current.read())
    }

    /// Clip bound used when building transforms
    pub fn clip_bound(&self) -> f64 {
        self.clip_bound
    }

    /// Replace the serving bundle, returning the previous model.
    ///
    /// The new model is fully built before the lock is taken; on error the
    /// serving model is unchanged.
    pub fn swap(&self, bundle: ArtifactBundle) -> Result<Arc<LoadedModel>> {
        let next = Arc::new(LoadedModel::new(bundle, self.clip_bound)?);
        let id = next.id();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!(id = %id, previous = %previous.id(), "Swapped serving bundle");
        Ok(previous)
    }

    /// Load a bundle from `path` and swap it in.
    ///
    /// A bundle that fails to load is never served; the error is returned and
    /// the current model keeps serving.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<Arc<LoadedModel>> {
        let path = path.as_ref();
        match ArtifactBundle::load(path) {
            Ok(bundle) => self.swap(bundle),
            Err(err) => {
                warn!(path = %path.display(), "Reload failed, keeping current bundle: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::bundle_from_rows;
    use flowsense_core::Error;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn swap_returns_previous_model() {
        let first = bundle_from_rows(&[&["1", "0", "a"], &["9", "1", "b"]]);
        let second = bundle_from_rows(&[&["2", "0", "a"], &["8", "1", "b"]]);
        let (first_id, second_id) = (first.info().id, second.info().id);

        let handle = BundleHandle::new(first, 1e9).unwrap();
        let snapshot = handle.current();
        let previous = handle.swap(second).unwrap();

        assert_eq!(previous.id(), first_id);
        assert_eq!(snapshot.id(), first_id);
        assert_eq!(handle.current().id(), second_id);
    }

    #[test]
    fn failed_reload_keeps_serving() {
        let bundle = bundle_from_rows(&[&["1", "0", "a"], &["9", "1", "b"]]);
        let id = bundle.info().id;
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.fsb");
        bundle.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let corrupt = dir.path().join("corrupt.fsb");
        std::fs::write(&corrupt, bytes).unwrap();

        let handle = BundleHandle::open(&path, 1e9).unwrap();
        assert!(matches!(handle.reload(&corrupt), Err(Error::ArtifactLoad(_))));
        assert!(handle.reload(dir.path().join("missing.fsb")).is_err());
        assert_eq!(handle.current().id(), id);
    }

    #[test]
    fn concurrent_readers_see_whole_models() {
        // The two bundles differ in feature width, so a torn read would pair
        // one bundle's classifier with the other's transform.
        let narrow = bundle_from_rows(&[&["1", "0", "a"], &["9", "1", "b"]]);
        let wide = bundle_from_rows(&[&["1", "0", "a"], &["9", "1", "b"], &["5", "2", "a"], &["4", "3", "b"]]);
        assert_ne!(narrow.feature_width(), wide.feature_width());

        let handle = Arc::new(BundleHandle::new(narrow.clone(), 1e9).unwrap());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let model = handle.current();
                        assert_eq!(
                            model.preprocessor().numeric_width() + model.preprocessor().categorical_width(),
                            model.bundle().classifier().n_features()
                        );
                    }
                })
            })
            .collect();

        for i in 0..200 {
            let next = if i % 2 == 0 { wide.clone() } else { narrow.clone() };
            handle.swap(next).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
