//! Startup lifecycle: load the persisted artifact set, or train one first.

use crate::config::{AppConfig, TrainingConfig};
use crate::error::{PipelineError, Result};
use crate::models::inference::InferenceContext;
use crate::models::loader::ArtifactStore;
use crate::training::{Trainer, TrainingOutcome};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the lifecycle currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    Uninitialized,
    Loading,
    Training,
    Ready,
    Failed(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Loading => write!(f, "loading"),
            LifecycleState::Training => write!(f, "training"),
            LifecycleState::Ready => write!(f, "ready"),
            LifecycleState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Owns the one-time decision between loading and training.
///
/// `Uninitialized -> Loading -> Ready` when an artifact set exists,
/// `Uninitialized -> Training -> Ready` otherwise. Any error moves to
/// `Failed`, which is terminal.
pub struct ModelLifecycle {
    store: ArtifactStore,
    dataset_path: PathBuf,
    training: TrainingConfig,
    state: LifecycleState,
    context: Option<Arc<InferenceContext>>,
}

impl ModelLifecycle {
    pub fn new(store: ArtifactStore, dataset_path: PathBuf, training: TrainingConfig) -> Self {
        Self {
            store,
            dataset_path,
            training,
            state: LifecycleState::Uninitialized,
            context: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ArtifactStore::new(config.artifacts.path.clone()),
            config.artifacts.dataset_path.clone(),
            config.training.clone(),
        )
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// The context, once `Ready`.
    pub fn context(&self) -> Option<Arc<InferenceContext>> {
        self.context.clone()
    }

    /// Load the artifact set if present, otherwise train and persist one.
    pub fn initialize(&mut self) -> Result<Arc<InferenceContext>> {
        if self.state != LifecycleState::Uninitialized {
            return Err(PipelineError::Lifecycle(format!(
                "initialize called in state {}",
                self.state
            )));
        }

        let result = if self.store.exists() {
            self.transition(LifecycleState::Loading);
            self.store.load().and_then(InferenceContext::from_artifacts)
        } else {
            warn!(
                path = %self.store.path().display(),
                "No artifact set found; training a new model"
            );
            self.transition(LifecycleState::Training);
            self.train_and_persist()
                .and_then(|outcome| InferenceContext::from_artifacts(outcome.artifacts))
        };
        self.finish(result)
    }

    /// Train a fresh artifact set from the dataset, persist it and serve it.
    /// Only valid once `Ready`.
    pub fn retrain(&mut self) -> Result<Arc<InferenceContext>> {
        if self.state != LifecycleState::Ready {
            return Err(PipelineError::Lifecycle(format!(
                "retrain called in state {}",
                self.state
            )));
        }
        self.transition(LifecycleState::Training);
        let result = self
            .train_and_persist()
            .and_then(|outcome| InferenceContext::from_artifacts(outcome.artifacts));
        self.finish(result)
    }

    fn train_and_persist(&self) -> Result<TrainingOutcome> {
        let outcome = Trainer::new(self.training.clone()).train_from_path(&self.dataset_path)?;
        self.store.save(&outcome.artifacts)?;
        Ok(outcome)
    }

    fn finish(&mut self, result: Result<InferenceContext>) -> Result<Arc<InferenceContext>> {
        match result {
            Ok(context) => {
                let context = Arc::new(context);
                self.context = Some(Arc::clone(&context));
                self.transition(LifecycleState::Ready);
                Ok(context)
            }
            Err(e) => {
                error!(error = %e, "Model lifecycle failed");
                self.context = None;
                self.transition(LifecycleState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
    }
}
