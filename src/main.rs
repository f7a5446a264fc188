use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod backend;
mod cli;
mod logging;

use backend::{InferenceBackend, TrainingBackend};
use cli::{ClassifyArgs, Cli, Command, PreprocessArgs, TrainArgs};
use nemo_train::{build_classifier, load_datasets, Predictor, Trainer};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match cli.command {
        Command::Preprocess(args) => preprocess(args),
        Command::Train(args) => train(args),
        Command::Classify(args) => classify(args),
    }
}

fn preprocess(args: PreprocessArgs) -> Result<()> {
    let config = args.segmentation_config()?;
    info!(
        "Thresholds: border {}, object {}; margin {}px",
        config.border_threshold, config.object_threshold, config.image_margin
    );

    let summary = nemo_cv::run_preprocess(&args.source, &args.output, config)?;
    println!(
        "{} images, {} patches written to {}",
        summary.images,
        summary.patches,
        args.output.display()
    );
    Ok(())
}

fn train(args: TrainArgs) -> Result<()> {
    let config = args.training_config()?;
    let device = backend::default_device();
    info!("Backend: {}", backend::backend_name());

    let datasets = load_datasets(&args.data_dir, &config)?;
    let (classifier, model) = build_classifier::<TrainingBackend>(
        &config,
        datasets.metadata.labels.len(),
        Some(args.backbone.as_path()),
        &device,
    )
    .with_context(|| format!("Failed to build classifier from {:?}", args.backbone))?;

    let trainer = Trainer::<TrainingBackend>::new(config, device)?;
    let report = trainer.train(&datasets, &classifier, model, &args.output)?;

    println!(
        "Test loss {:.4}, accuracy {:.4}",
        report.test.loss, report.test.accuracy
    );
    println!("Model saved to {}", report.artifacts.model.display());
    Ok(())
}

fn classify(args: ClassifyArgs) -> Result<()> {
    let device = backend::default_device();
    let predictor = Predictor::<InferenceBackend>::load(&args.model, args.image_size, device)?
        .with_batch_size(args.batch_size);
    let predictions = predictor.classify(&args.images)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&predictions)?);
    } else {
        for prediction in &predictions {
            println!(
                "{}\t{}\t{:.3}",
                prediction.path.display(),
                prediction.label,
                prediction.confidence
            );
        }
    }
    Ok(())
}
