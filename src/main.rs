#![recursion_limit = "256"]

use flower_recognition::{
    data::loader::{load_dataset, split_dataset},
    model::{
        artifact::save_model,
        evaluate::evaluate,
        pretrained::load_pretrained,
        training::{TrainingConfig, fit, image_loader, prepare_workspace},
    },
    utils::app_paths::AppPaths,
};

use burn::{backend::Autodiff, data::dataset::Dataset};
use color_eyre::{Result, eyre::WrapErr};
use log::info;

#[cfg(feature = "cuda")]
type Backend = burn::backend::Cuda<f32, i32>;
#[cfg(not(feature = "cuda"))]
type Backend = burn::backend::Wgpu<f32, i32>;
type AutodiffBackend = Autodiff<Backend>;

fn create_model(paths: &AppPaths) -> Result<()> {
    let config = TrainingConfig::from_file_or_default(paths.training_config.as_deref())?;
    prepare_workspace(&paths.workspace_path, &config)?;
    let device = Default::default();

    info!("------------- Loading Data -------------");
    let (dataset, labels) = load_dataset(&paths.data_path)?;
    let splits = split_dataset(
        dataset,
        config.seed,
        config.test_fraction,
        config.validation_fraction,
    )?;
    info!(
        "Split: {} train / {} validation / {} test",
        splits.train.len(),
        splits.validation.len(),
        splits.test.len()
    );

    let model = load_pretrained::<Backend>(
        &paths.weights_path,
        config.architecture,
        labels.len(),
        &device,
    )?;

    info!("------------- Start Training -------------");
    let model = fit::<AutodiffBackend>(
        model,
        splits.train,
        splits.validation,
        &config,
        device.clone(),
    )?;
    info!("------------- Training Finished -------------");

    info!("------------- Evaluating Model Metrics -------------");
    let metrics = evaluate(&model, &image_loader(splits.test, &config), config.top_k)
        .wrap_err("Evaluation failed")?;
    println!("{metrics}");
    for (class, log_loss) in labels.classes().iter().zip(&metrics.per_class_log_loss) {
        println!("  {class:<16} log-loss {log_loss:.4}");
    }

    info!("------------- Saving the Model -------------");
    save_model(model, &labels, config.architecture, &paths.model_path)
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths = AppPaths::from_env();
    create_model(&paths)
}
