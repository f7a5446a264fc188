// tests/dataset_tests.rs
use anyhow::Result;
use nemo_core::{LabelVocabulary, NemoError};
use nemo_train::{load_datasets, StreamOptions, TrainingConfig};
use std::fs;
use std::path::Path;

fn write_patch(path: &Path, shade: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade])).save(path)?;
    Ok(())
}

fn write_split(root: &Path, split: &str, per_class: usize) -> Result<()> {
    for i in 0..per_class {
        write_patch(&root.join(split).join("catA").join(format!("a{}.png", i)), 20)?;
        write_patch(&root.join(split).join("catB").join(format!("b{}.png", i)), 230)?;
    }
    Ok(())
}

fn small_config() -> TrainingConfig {
    TrainingConfig {
        image_size: 32,
        batch_size: 2,
        ..Default::default()
    }
}

#[test]
fn test_vocabulary_is_shared_across_splits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_split(dir.path(), "train", 2)?;
    write_split(dir.path(), "valid", 1)?;
    write_split(dir.path(), "test", 1)?;

    let datasets = load_datasets(dir.path(), &small_config())?;

    let labels = &datasets.metadata.labels;
    assert_eq!(labels.get("catA"), Some(0));
    assert_eq!(labels.get("catB"), Some(1));
    assert_eq!(datasets.metadata.train_count, 4);
    assert_eq!(datasets.metadata.valid_count, 2);
    assert_eq!(datasets.metadata.test_count, 2);

    for file in datasets.valid.files() {
        let class = file
            .path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str());
        assert_eq!(labels.name(file.label), class);
    }
    Ok(())
}

#[test]
fn test_stream_yields_labeled_batches() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_split(dir.path(), "train", 3)?;
    write_split(dir.path(), "valid", 1)?;
    write_split(dir.path(), "test", 1)?;

    let config = small_config();
    let datasets = load_datasets(dir.path(), &config)?;

    let mut labels = Vec::new();
    for batch in datasets.train.stream(&StreamOptions::evaluation(&config), 1) {
        let batch = batch?;
        assert!(batch.len() <= 2);
        for sample in batch {
            assert_eq!(sample.image.size, 32);
            assert_eq!(sample.target.iter().sum::<f32>(), 1.0);
            assert_eq!(sample.target[sample.label], 1.0);
            // catA patches are dark, catB light
            let pixel = sample.image.get(0, 16, 16);
            assert_eq!(pixel > 0.5, sample.label == 1);
            labels.push(sample.label);
        }
    }
    labels.sort_unstable();
    assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    Ok(())
}

#[test]
fn test_unknown_class_in_valid_split() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_split(dir.path(), "train", 1)?;
    write_split(dir.path(), "test", 1)?;
    write_patch(&dir.path().join("valid").join("catC").join("c0.png"), 120)?;

    let err = load_datasets(dir.path(), &small_config())
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a label mismatch"))?;

    match err.downcast_ref::<NemoError>() {
        Some(NemoError::LabelMismatch { label, .. }) => assert_eq!(label, "catC"),
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}

#[test]
fn test_missing_split_is_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_split(dir.path(), "train", 1)?;
    write_split(dir.path(), "valid", 1)?;
    fs::create_dir_all(dir.path().join("test").join("catA"))?;

    let err = load_datasets(dir.path(), &small_config())
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected an empty split"))?;

    assert!(matches!(
        err.downcast_ref::<NemoError>(),
        Some(NemoError::EmptySplit { .. })
    ));
    Ok(())
}

#[test]
fn test_label_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("labels.json");
    let vocabulary = LabelVocabulary::from_names(["catB", "catA"]);

    vocabulary.save(&path)?;
    let loaded = LabelVocabulary::load(&path)?;

    assert_eq!(loaded, vocabulary);
    assert_eq!(loaded.names(), vec!["catA", "catB"]);
    Ok(())
}
