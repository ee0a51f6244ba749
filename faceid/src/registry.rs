use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::info;

use crate::codec;
use crate::error::{FaceIdError, Result};
use crate::model::{ModelLoader, Models};
use crate::recognizer::Recognizer;

/// Opaque handle of a [`Recognizer`] owned by a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates, looks up and destroys recognizers by handle.
///
/// Models are loaded by the first successful [`Registry::create`] and
/// shared by every later instance; concurrent first calls still load them
/// exactly once. A failed load is not cached and is never retried
/// internally.
///
/// An application normally keeps one registry for the whole process.
pub struct Registry {
    loader: Box<dyn ModelLoader>,
    models: OnceCell<Arc<Models>>,
    instances: RwLock<HashMap<InstanceId, Arc<Recognizer>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            models: OnceCell::new(),
            instances: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates an empty gallery file at `path`. Needs no instance.
    pub fn create_gallery(path: impl AsRef<Path>) -> Result<()> {
        codec::create_empty(path.as_ref())
    }

    /// Creates a recognizer with an empty gallery and default params.
    ///
    /// `model_dir` is only read by the first successful call.
    pub fn create(&self, model_dir: impl AsRef<Path>) -> Result<InstanceId> {
        let model_dir = model_dir.as_ref();
        let models = self.models.get_or_try_init(|| {
            let models = self.loader.load(model_dir)?;
            info!(model_dir = %model_dir.display(), ?models, "models loaded");
            Ok::<_, FaceIdError>(Arc::new(models))
        })?;

        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let recognizer = Arc::new(Recognizer::new(Arc::clone(models)));
        self.instances.write().insert(id, recognizer);
        info!(instance = %id, "recognizer created");
        Ok(id)
    }

    /// Returns the recognizer behind `id`.
    pub fn get(&self, id: InstanceId) -> Result<Arc<Recognizer>> {
        self.instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(FaceIdError::InvalidInstance(id.0))
    }

    /// Removes the recognizer behind `id`. Unsaved changes are discarded.
    ///
    /// Calls already holding the recognizer finish normally.
    pub fn destroy(&self, id: InstanceId) -> Result<()> {
        match self.instances.write().remove(&id) {
            Some(_) => {
                info!(instance = %id, "recognizer destroyed");
                Ok(())
            }
            None => Err(FaceIdError::InvalidInstance(id.0)),
        }
    }

    /// Reports whether the models have been loaded.
    pub fn models_loaded(&self) -> bool {
        self.models.get().is_some()
    }

    /// Returns the number of live instances.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
