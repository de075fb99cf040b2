use std::{error::Error, path::PathBuf, process::ExitCode};

use burn::{
    backend::{Autodiff, NdArray, ndarray::NdArrayDevice},
    config::Config,
    data::dataloader::DataLoader,
    tensor::cast::ToElement,
};
use log::{error, info};
use plant_mrcnn::{
    config::{CONFIG_PATH, Commands, PlantCmd, RunPaths, SubCommandInspect, TrainingConfig},
    dataset::{PlantDataset, Subset},
    labels::PlantClasses,
    training::{data_loaders, load_prepared},
    transforms::pipeline::{Transform, labels_as_tensor},
    weights::resolve_weights,
};

type Backend = NdArray<f32>;
type AutoDiffBackend = Autodiff<Backend>;

fn load_config(path: Option<&str>) -> Result<TrainingConfig, Box<dyn Error>> {
    let path = PathBuf::from(path.unwrap_or(CONFIG_PATH));

    if path.exists() {
        info!("Using config {}", path.display());
        return Ok(TrainingConfig::load(&path)?);
    }

    info!("No config at {}, using defaults", path.display());
    Ok(TrainingConfig::new())
}

fn check(config: &TrainingConfig, paths: &RunPaths) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    let device = NdArrayDevice::default();
    let dataset_train = load_prepared(&paths.dataset_dir, Subset::Train)?;
    let dataset_valid = load_prepared(&paths.dataset_dir, Subset::Val)?;
    let train = dataset_train.class_counts();
    let val = dataset_valid.class_counts();
    let classes = dataset_train.class_info();

    let (dataloader_train, dataloader_valid) =
        data_loaders::<AutoDiffBackend>(config, dataset_train, dataset_valid, &device);

    let mut instances = 0;
    for batch in dataloader_train.iter() {
        instances += batch.class_ids.greater_elem(0).int().sum().into_scalar().to_usize();
    }
    for batch in dataloader_valid.iter() {
        instances += batch.class_ids.greater_elem(0).int().sum().into_scalar().to_usize();
    }

    info!(
        "Batched {} train and {} val images, {} instances after resizing",
        dataloader_train.num_items(),
        dataloader_valid.num_items(),
        instances
    );

    println!("{:<28} {:>6} {:>6}", "class", "train", "val");
    for class in classes.iter().skip(1) {
        println!(
            "{:<28} {:>6} {:>6}",
            class.name, train[class.id], val[class.id]
        );
    }

    Ok(())
}

fn inspect(paths: &RunPaths, cmd: &SubCommandInspect) -> Result<(), Box<dyn Error>> {
    let device = NdArrayDevice::default();
    let dataset = PlantDataset::load(&paths.dataset_dir, &cmd.s)?;

    let item = dataset.load_item(cmd.i)?;
    let output = cmd.o.clone().unwrap_or_else(|| "./artifacts/inspect.png".to_string());
    if let Some(parent) = PathBuf::from(&output).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let masks = (item.masks.count() > 0).then(|| item.masks.to_tensor::<Backend>(&device));
    let labels = (!item.class_ids.is_empty()).then(|| labels_as_tensor::<Backend>(&item.class_ids, &device));

    Transform::new(item.image, masks, labels, &device).save_overlay(&output)?;

    let classes = PlantClasses;
    let names: Vec<&str> = item
        .class_ids
        .iter()
        .map(|&id| classes.name(id as usize).unwrap_or("?"))
        .collect();
    info!("Saved {} with {} instances: {}", output, names.len(), names.join(", "));

    Ok(())
}

fn execute(cmd: PlantCmd) -> Result<(), Box<dyn Error>> {
    let paths = RunPaths::from_cmd(&cmd);

    match &cmd.commands {
        Commands::Check(_) => {
            let config = load_config(cmd.c.as_deref())?;
            check(&config, &paths)
        }
        Commands::Inspect(sub_command_inspect) => inspect(&paths, sub_command_inspect),
        Commands::Weights(_) => {
            let path = resolve_weights(&paths.weights_path)?;
            info!("Weights ready at {}", path.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli_cmd: PlantCmd = argh::from_env();

    match execute(cli_cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            let mut source = err.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
