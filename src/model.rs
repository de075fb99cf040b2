use std::{error::Error, path::Path, path::PathBuf, sync::Arc};

use burn::{data::dataloader::DataLoader, optim::SgdConfig, tensor::backend::AutodiffBackend};

use crate::{config::TrainingConfig, data::MaskBatch, layers::TrainableLayers, stats::Stats};

pub type TrainLoader<B> = Arc<dyn DataLoader<B, MaskBatch<B>>>;
pub type ValidLoader<B> = Arc<
    dyn DataLoader<
            <B as AutodiffBackend>::InnerBackend,
            MaskBatch<<B as AutodiffBackend>::InnerBackend>,
        >,
>;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load weights from {path}")]
    LoadWeights {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("training failed")]
    Training(#[source] BoxError),
}

/// What a training run does, as handed to the model.
#[derive(Clone)]
pub struct Schedule {
    pub learning_rate: f64,
    pub epochs: usize,
    pub layers: TrainableLayers,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
    pub optimizer: SgdConfig,
}

impl Schedule {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            layers: config.layers,
            steps_per_epoch: config.steps_per_epoch,
            validation_steps: config.validation_steps,
            optimizer: config.optimizer.clone(),
        }
    }
}

/// A Mask R-CNN implementation the training driver can fine tune.
///
/// Network layers, anchors, losses and the optimisation loop all live behind this trait.
/// Layers are addressed by their Keras-style names, which [`TrainableLayers`] and
/// [`crate::layers::HEAD_EXCLUDES`] match against.
pub trait MaskRcnn<B: AutodiffBackend>: Sized {
    /// Loads pretrained weights by layer name, leaving layers named in `exclude` at their
    /// initial values.
    fn load_weights(self, path: &Path, exclude: &[&str]) -> Result<Self, ModelError>;

    /// Runs `schedule.epochs` epochs, each `schedule.steps_per_epoch` training steps followed
    /// by `schedule.validation_steps` validation steps, updating only
    /// `schedule.layers`. Progress goes through `stats`.
    fn train(
        self,
        train: TrainLoader<B>,
        valid: ValidLoader<B>,
        schedule: &Schedule,
        stats: &mut Stats,
    ) -> Result<Self, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_config() {
        let config = TrainingConfig::new()
            .with_epochs(3)
            .with_layers(TrainableLayers::From4)
            .with_learning_rate(0.01);

        let schedule = Schedule::from_config(&config);

        assert_eq!(schedule.epochs, 3);
        assert_eq!(schedule.layers, TrainableLayers::From4);
        assert_eq!(schedule.learning_rate, 0.01);
        assert_eq!(schedule.steps_per_epoch, 10);
        assert_eq!(schedule.validation_steps, 50);
    }

    #[test]
    fn default_schedule_trains_heads() {
        let schedule = Schedule::from_config(&TrainingConfig::new());

        assert_eq!(schedule.epochs, 100);
        assert_eq!(schedule.layers, TrainableLayers::Heads);
        assert_eq!(schedule.learning_rate, 0.001);
    }
}
