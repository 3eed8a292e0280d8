use crate::error::RunnerError;
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{
    connectors::{source::SledSourceLog, target::SledTarget},
    state::sled_store::SledStateStore,
};
use std::sync::Arc;
use tracing::debug;

/// Source log, merge target and state store sharing one sled database.
#[derive(Clone)]
pub struct Stores {
    pub db: sled::Db,
    pub state: Arc<SledStateStore>,
    pub source: Arc<SledSourceLog>,
    pub target: Arc<SledTarget>,
}

impl Stores {
    pub fn open(settings: &ValidatedSettings) -> Result<Self, RunnerError> {
        std::fs::create_dir_all(&settings.state_dir).map_err(|e| {
            RunnerError::Initialization(format!(
                "Could not create state directory {}: {e}",
                settings.state_dir.display()
            ))
        })?;

        let db = sled::open(&settings.state_dir).map_err(|e| {
            RunnerError::Initialization(format!(
                "Could not open state store at {}: {e}",
                settings.state_dir.display()
            ))
        })?;
        debug!(path = %settings.state_dir.display(), "Opened state store");

        Self::from_db(db, settings)
    }

    pub fn from_db(db: sled::Db, settings: &ValidatedSettings) -> Result<Self, RunnerError> {
        Ok(Self {
            state: Arc::new(SledStateStore::from_db(db.clone())?),
            source: Arc::new(SledSourceLog::open(&db, &settings.source)?),
            target: Arc::new(SledTarget::open(&db, &settings.target)?),
            db,
        })
    }
}
