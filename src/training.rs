//! Training driver, called by whichever crate supplies the [`MaskRcnn`] implementation.

use std::path::Path;

use crate::config::{ConfigError, RunPaths, TrainingConfig};
use crate::data::{BatchType, MaskBatch, MaskBatcher, MaskItem};
use crate::dataset::{DatasetError, PlantDataset, Subset};
use crate::layers::HEAD_EXCLUDES;
use crate::model::{MaskRcnn, ModelError, Schedule, TrainLoader, ValidLoader};
use crate::stats::Stats;
use crate::weights::{WeightsError, resolve_weights};
use burn::{data::dataloader::DataLoaderBuilder, tensor::backend::AutodiffBackend};
use log::info;

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("invalid training config")]
    Config(#[from] ConfigError),
    #[error("failed to load dataset")]
    Dataset(#[from] DatasetError),
    #[error("failed to resolve pretrained weights")]
    Weights(#[from] WeightsError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to prepare logs directory {path}")]
    Logs {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn create_logs_dir(dir: &Path) -> Result<(), TrainError> {
    std::fs::create_dir_all(dir).map_err(|source| TrainError::Logs {
        path: dir.to_path_buf(),
        source,
    })
}

/// Loads and prepares one subset of the dataset.
pub fn load_prepared(dataset_dir: &Path, subset: Subset) -> Result<PlantDataset, DatasetError> {
    let mut dataset = PlantDataset::load_subset(dataset_dir, subset)?;
    dataset.prepare();
    Ok(dataset)
}

/// Builds the shuffled training and validation loaders over two prepared subsets.
pub fn data_loaders<B: AutodiffBackend>(
    config: &TrainingConfig,
    dataset_train: PlantDataset,
    dataset_valid: PlantDataset,
    device: &B::Device,
) -> (TrainLoader<B>, ValidLoader<B>) {
    let batcher_train = MaskBatcher::new(config, BatchType::Train);
    let batcher_valid = MaskBatcher::new(config, BatchType::Valid);

    let dataloader_train = DataLoaderBuilder::<B, MaskItem, MaskBatch<B>>::new(batcher_train)
        .set_device(device.clone())
        .batch_size(config.batch_size())
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_train);

    let dataloader_valid =
        DataLoaderBuilder::<B::InnerBackend, MaskItem, MaskBatch<B::InnerBackend>>::new(batcher_valid)
            .set_device(device.clone())
            .batch_size(config.batch_size())
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .build(dataset_valid);

    (dataloader_train, dataloader_valid)
}

/// Trains `model` on the plant dataset with the schedule from `config`.
///
/// Weights are expected to be loaded already, see [`run`] for the full sequence.
pub fn train<B: AutodiffBackend, M: MaskRcnn<B>>(
    model: M,
    config: &TrainingConfig,
    paths: &RunPaths,
    device: &B::Device,
) -> Result<M, TrainError> {
    B::seed(config.seed);

    let dataset_train = load_prepared(&paths.dataset_dir, Subset::Train)?;
    let dataset_valid = load_prepared(&paths.dataset_dir, Subset::Val)?;
    let (dataloader_train, dataloader_valid) =
        data_loaders::<B>(config, dataset_train, dataset_valid, device);

    create_logs_dir(&paths.logs_dir)?;
    let mut stats = Stats::new(&paths.logs_dir, config.batch_size()).map_err(|source| {
        TrainError::Logs {
            path: paths.logs_dir.clone(),
            source,
        }
    })?;

    let schedule = Schedule::from_config(config);

    info!("Training network {}", schedule.layers);
    info!(
        "{} epochs of {} steps at learning rate {}, batch size {}",
        schedule.epochs,
        schedule.steps_per_epoch,
        schedule.learning_rate,
        config.batch_size()
    );

    let model = model.train(dataloader_train, dataloader_valid, &schedule, &mut stats)?;

    info!("Training finished, log at {}", stats.log_path().display());

    Ok(model)
}

/// Validates `config`, fetches the COCO weights when missing, loads them into `model` without
/// the class-specific output layers, and trains.
pub fn run<B: AutodiffBackend, M: MaskRcnn<B>>(
    model: M,
    config: &TrainingConfig,
    paths: &RunPaths,
    device: &B::Device,
) -> Result<M, TrainError> {
    config.validate()?;
    create_logs_dir(&paths.logs_dir)?;

    let weights_path = resolve_weights(&paths.weights_path)?;
    info!("Loading weights {}", weights_path.display());
    let model = model.load_weights(&weights_path, &HEAD_EXCLUDES)?;

    train::<B, M>(model, config, paths, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{LEAF_PROJECT, fixture_dir, write_subset};
    use crate::layers::TrainableLayers;
    use burn::backend::{Autodiff, NdArray, ndarray::NdArrayDevice};
    use std::path::PathBuf;

    type B = Autodiff<NdArray<f32>>;

    #[derive(Debug, Default)]
    struct Recorder {
        weights: Option<(PathBuf, Vec<String>)>,
        layers: Option<TrainableLayers>,
        epochs: usize,
        train_items: usize,
        valid_items: usize,
        class_ids: Vec<i64>,
        image_dims: Vec<[usize; 4]>,
    }

    impl MaskRcnn<B> for Recorder {
        fn load_weights(mut self, path: &Path, exclude: &[&str]) -> Result<Self, ModelError> {
            self.weights = Some((
                path.to_path_buf(),
                exclude.iter().map(|s| s.to_string()).collect(),
            ));
            Ok(self)
        }

        fn train(
            mut self,
            train: TrainLoader<B>,
            valid: ValidLoader<B>,
            schedule: &Schedule,
            stats: &mut Stats,
        ) -> Result<Self, ModelError> {
            self.layers = Some(schedule.layers);
            self.epochs = schedule.epochs;
            self.train_items = train.num_items();
            self.valid_items = valid.num_items();

            for (iteration, batch) in train.iter().enumerate().take(schedule.steps_per_epoch) {
                self.image_dims.push(batch.images.dims());
                self.class_ids
                    .extend(batch.class_ids.into_data().iter::<i64>());
                stats.update(1.0, iteration + 1, "Train", 1);
            }
            stats.flush().map_err(|e| ModelError::Training(Box::new(e)))?;

            Ok(self)
        }
    }

    fn fixture(name: &str) -> (PathBuf, RunPaths) {
        let root = fixture_dir(name);
        let images = [("leaf1.jpg", 400, 300), ("blank.jpg", 10, 10), ("leaf2.png", 50, 25)];
        write_subset(&root.join("datasets"), "train", LEAF_PROJECT, &images);
        write_subset(&root.join("datasets"), "val", LEAF_PROJECT, &images);

        let paths = RunPaths {
            dataset_dir: root.join("datasets"),
            weights_path: root.join("weights").join("mask_rcnn_coco.h5"),
            logs_dir: root.join("logs"),
        };
        (root, paths)
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::new()
            .with_images_per_gpu(2)
            .with_image_min_dim(64)
            .with_image_max_dim(64)
            .with_num_workers(1)
            .with_epochs(1)
    }

    #[test]
    fn run_loads_weights_without_heads_and_trains() {
        let (root, paths) = fixture("training_run");
        std::fs::create_dir_all(paths.weights_path.parent().unwrap()).unwrap();
        std::fs::write(&paths.weights_path, b"h5").unwrap();

        let device = NdArrayDevice::default();
        let model = run::<B, _>(Recorder::default(), &small_config(), &paths, &device).unwrap();

        let (weights, exclude) = model.weights.unwrap();
        assert_eq!(weights, paths.weights_path);
        assert_eq!(
            exclude,
            vec!["mrcnn_class_logits", "mrcnn_bbox_fc", "mrcnn_bbox", "mrcnn_mask"]
        );
        assert_eq!(model.layers, Some(TrainableLayers::Heads));
        assert_eq!(model.epochs, 1);

        // blank.jpg has no regions and is skipped in both subsets.
        assert_eq!(model.train_items, 2);
        assert_eq!(model.valid_items, 2);

        assert_eq!(model.image_dims, vec![[2, 3, 64, 64]]);
        let mut class_ids = model.class_ids.clone();
        class_ids.sort();
        // Two slots per image: [25, pad] and [4, 8].
        assert_eq!(class_ids, vec![0, 4, 8, 25]);

        assert!(paths.logs_dir.join("log.txt").exists());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn loaders_reuse_prepared_subsets() {
        let (root, paths) = fixture("training_loaders");
        let train = load_prepared(&paths.dataset_dir, Subset::Train).unwrap();
        let valid = load_prepared(&paths.dataset_dir, Subset::Val).unwrap();
        let counts = train.class_counts();

        let device = NdArrayDevice::default();
        let (train_loader, valid_loader) = data_loaders::<B>(&small_config(), train, valid, &device);

        assert_eq!(train_loader.num_items(), 2);
        assert_eq!(valid_loader.num_items(), 2);
        assert_eq!(counts.iter().sum::<usize>(), 3);
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn invalid_config_stops_before_any_io() {
        let (root, paths) = fixture("training_invalid");
        let device = NdArrayDevice::default();

        let err = run::<B, _>(
            Recorder::default(),
            &small_config().with_num_classes(2),
            &paths,
            &device,
        )
        .unwrap_err();

        assert!(matches!(err, TrainError::Config(ConfigError::ClassCount { .. })));
        assert!(!paths.logs_dir.exists());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_subset_fails_training() {
        let root = fixture_dir("training_missing");
        let paths = RunPaths {
            dataset_dir: root.join("datasets"),
            weights_path: root.join("w.h5"),
            logs_dir: root.join("logs"),
        };
        let device = NdArrayDevice::default();

        let err = train::<B, _>(Recorder::default(), &small_config(), &paths, &device).unwrap_err();
        assert!(matches!(
            err,
            TrainError::Dataset(DatasetError::ReadAnnotations { .. })
        ));
        std::fs::remove_dir_all(root).ok();
    }
}
