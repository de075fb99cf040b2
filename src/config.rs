use std::path::PathBuf;

use burn::{
    config::Config,
    grad_clipping::GradientClippingConfig,
    optim::{SgdConfig, decay::WeightDecayConfig, momentum::MomentumConfig},
};
use argh::FromArgs;

use crate::labels::PlantClasses;
use crate::layers::TrainableLayers;

pub const CONFIG_PATH: &str = "./config/training_config.json";
pub const DATASET_DIR: &str = "./datasets";
pub const WEIGHTS_FILE: &str = "./assets/pretrained_models/mask_rcnn_coco.h5";
pub const LOGS_DIR: &str = "./artifacts/logs";

/// Hyperparameters of a Mask R-CNN fine tuning run on the plant disease dataset.
///
/// Anything not overridden here keeps the usual Mask R-CNN value. The image size, mean pixel
/// and instance cap match the COCO checkpoint the run starts from.
#[derive(Config)]
pub struct TrainingConfig {
    #[config(default = "default_optimizer()")]
    pub optimizer: SgdConfig,
    #[config(default = 4)]
    pub images_per_gpu: usize,
    #[config(default = 1)]
    pub gpu_count: usize,
    /// Background plus the 28 plant classes.
    #[config(default = 29)]
    pub num_classes: usize,
    #[config(default = 10)]
    pub steps_per_epoch: usize,
    #[config(default = 50)]
    pub validation_steps: usize,
    /// Detections scoring below this are discarded.
    #[config(default = 0.9)]
    pub detection_min_confidence: f64,
    #[config(default = 0.001)]
    pub learning_rate: f64,
    #[config(default = 100)]
    pub epochs: usize,
    #[config(default = "TrainableLayers::Heads")]
    pub layers: TrainableLayers,
    #[config(default = 800)]
    pub image_min_dim: usize,
    #[config(default = 1024)]
    pub image_max_dim: usize,
    #[config(default = 100)]
    pub max_gt_instances: usize,
    #[config(default = "[123.7, 116.8, 103.9]")]
    pub mean_pixel: [f32; 3],
    /// Random horizontal flips of training images.
    #[config(default = false)]
    pub augment: bool,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 1)]
    pub seed: u64,
}

/// SGD with momentum 0.9, weight decay 1e-4 and gradient norm clipping at 5.0.
pub fn default_optimizer() -> SgdConfig {
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new().with_momentum(0.9).with_dampening(0.0),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(1e-4)))
        .with_gradient_clipping(Some(GradientClippingConfig::Norm(5.0)))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("num_classes is {found} but the label table has {expected} classes")]
    ClassCount { expected: usize, found: usize },
    #[error("batch size is zero (images_per_gpu = {images_per_gpu}, gpu_count = {gpu_count})")]
    ZeroBatch {
        images_per_gpu: usize,
        gpu_count: usize,
    },
    #[error("detection_min_confidence {0} is outside [0, 1]")]
    Confidence(f64),
    #[error("image_min_dim {min} exceeds image_max_dim {max}")]
    ImageDims { min: usize, max: usize },
}

impl TrainingConfig {
    /// Images per step across all devices.
    pub fn batch_size(&self) -> usize {
        self.images_per_gpu * self.gpu_count
    }

    /// `[height, width, channels]` of the molded network input.
    pub fn image_shape(&self) -> [usize; 3] {
        [self.image_max_dim, self.image_max_dim, 3]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let expected = PlantClasses.count();
        if self.num_classes != expected {
            return Err(ConfigError::ClassCount {
                expected,
                found: self.num_classes,
            });
        }

        if self.batch_size() == 0 {
            return Err(ConfigError::ZeroBatch {
                images_per_gpu: self.images_per_gpu,
                gpu_count: self.gpu_count,
            });
        }

        if !(0.0..=1.0).contains(&self.detection_min_confidence) {
            return Err(ConfigError::Confidence(self.detection_min_confidence));
        }

        if self.image_min_dim > self.image_max_dim {
            return Err(ConfigError::ImageDims {
                min: self.image_min_dim,
                max: self.image_max_dim,
            });
        }

        Ok(())
    }
}

/// Where a run reads its dataset and weights from and writes its logs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    /// Holds `train/` and `val/`, each with a `train.json` VIA project and its images.
    pub dataset_dir: PathBuf,
    pub weights_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from(DATASET_DIR),
            weights_path: PathBuf::from(WEIGHTS_FILE),
            logs_dir: PathBuf::from(LOGS_DIR),
        }
    }
}

impl RunPaths {
    pub fn from_cmd(cmd: &PlantCmd) -> Self {
        let defaults = Self::default();
        Self {
            dataset_dir: cmd.d.clone().map(PathBuf::from).unwrap_or(defaults.dataset_dir),
            weights_path: cmd.w.clone().map(PathBuf::from).unwrap_or(defaults.weights_path),
            logs_dir: cmd.l.clone().map(PathBuf::from).unwrap_or(defaults.logs_dir),
        }
    }
}

#[derive(FromArgs, PartialEq, Debug)]
/// Mask R-CNN data preparation for the plant disease dataset.
pub struct PlantCmd {
    #[argh(subcommand)]
    pub commands: Commands,
    #[argh(option)]
    /// training config file (default ./config/training_config.json)
    pub c: Option<String>,
    #[argh(option)]
    /// dataset root holding train/ and val/ (default ./datasets)
    pub d: Option<String>,
    #[argh(option)]
    /// pretrained weights file (default ./assets/pretrained_models/mask_rcnn_coco.h5)
    pub w: Option<String>,
    #[argh(option)]
    /// logs directory (default ./artifacts/logs)
    pub l: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Commands {
    Check(SubCommandCheck),
    Inspect(SubCommandInspect),
    Weights(SubCommandWeights),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Load both subsets and run every image through the batcher
#[argh(subcommand, name = "check")]
pub struct SubCommandCheck {}

#[derive(FromArgs, PartialEq, Debug)]
/// Save one image with its masks drawn on top
#[argh(subcommand, name = "inspect")]
pub struct SubCommandInspect {
    #[argh(option)]
    /// subset to read from, train or val
    pub s: String,
    #[argh(option)]
    /// image index within the subset
    pub i: usize,
    #[argh(option)]
    /// output image path (default ./artifacts/inspect.png)
    pub o: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Download the COCO weights if they are missing
#[argh(subcommand, name = "weights")]
pub struct SubCommandWeights {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::fixture_dir;

    #[test]
    fn defaults_match_plant_run() {
        let config = TrainingConfig::new();

        assert_eq!(config.images_per_gpu, 4);
        assert_eq!(config.num_classes, 29);
        assert_eq!(config.steps_per_epoch, 10);
        assert_eq!(config.detection_min_confidence, 0.9);
        assert_eq!(config.epochs, 100);
        assert_eq!(config.layers, TrainableLayers::Heads);
        assert_eq!(config.batch_size(), 4);
        assert_eq!(config.image_shape(), [1024, 1024, 3]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            TrainingConfig::new().with_num_classes(81).validate(),
            Err(ConfigError::ClassCount {
                expected: 29,
                found: 81
            })
        );
        assert!(matches!(
            TrainingConfig::new().with_gpu_count(0).validate(),
            Err(ConfigError::ZeroBatch { .. })
        ));
        assert_eq!(
            TrainingConfig::new()
                .with_detection_min_confidence(1.5)
                .validate(),
            Err(ConfigError::Confidence(1.5))
        );
        assert_eq!(
            TrainingConfig::new()
                .with_image_min_dim(2048)
                .validate(),
            Err(ConfigError::ImageDims {
                min: 2048,
                max: 1024
            })
        );
    }

    #[test]
    fn config_survives_json() {
        let dir = fixture_dir("config");
        let path = dir.join("training_config.json");

        TrainingConfig::new()
            .with_images_per_gpu(2)
            .with_layers(TrainableLayers::From5)
            .save(&path)
            .unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();

        assert_eq!(loaded.images_per_gpu, 2);
        assert_eq!(loaded.layers, TrainableLayers::From5);
        assert_eq!(loaded.mean_pixel, [123.7, 116.8, 103.9]);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn cli_paths_override_defaults() {
        let cmd = PlantCmd::from_args(&["plant_mrcnn"], &["--d", "/data/leaves", "weights"]).unwrap();

        let paths = RunPaths::from_cmd(&cmd);
        assert_eq!(paths.dataset_dir, PathBuf::from("/data/leaves"));
        assert_eq!(paths.weights_path, PathBuf::from(WEIGHTS_FILE));
        assert_eq!(cmd.commands, Commands::Weights(SubCommandWeights {}));
    }

    #[test]
    fn inspect_takes_subset_and_index() {
        let cmd = PlantCmd::from_args(&["plant_mrcnn"], &["inspect", "--s", "val", "--i", "3"]).unwrap();

        match cmd.commands {
            Commands::Inspect(inspect) => {
                assert_eq!(inspect.s, "val");
                assert_eq!(inspect.i, 3);
                assert_eq!(inspect.o, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
