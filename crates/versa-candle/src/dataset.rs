//! Directory datasets: one subdirectory per class, images inside

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

use crate::error::{CandleError, Result};
use versa_core::ClassIndexMap;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Images of one class directory
#[derive(Debug, Clone)]
pub struct ClassFolder {
    pub label: String,
    pub images: Vec<PathBuf>,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List class folders sorted by label, each with its images sorted by name
pub fn scan(dataset_dir: &Path) -> Result<Vec<ClassFolder>> {
    let mut folders = Vec::new();

    for entry in std::fs::read_dir(dataset_dir)? {
        let path = entry?.path();
        if is_hidden(&path) || !path.is_dir() {
            continue;
        }

        let mut images = Vec::new();
        for file in std::fs::read_dir(&path)? {
            let file = file?.path();
            if file.is_file() && !is_hidden(&file) && is_image(&file) {
                images.push(file);
            }
        }
        images.sort();

        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        folders.push(ClassFolder { label, images });
    }

    if folders.is_empty() {
        return Err(CandleError::InvalidDataset(format!(
            "{} has no class directories",
            dataset_dir.display()
        )));
    }
    if folders.iter().all(|f| f.images.is_empty()) {
        return Err(CandleError::InvalidDataset(format!(
            "{} contains no images",
            dataset_dir.display()
        )));
    }

    folders.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(folders)
}

/// Decode, resize and flatten one image into `size * size * 3` values in `[0, 1]`
pub fn load_pixels(path: &Path, size: usize) -> Result<Vec<f32>> {
    let side = u32::try_from(size)
        .map_err(|_| CandleError::InvalidConfig(format!("image size {} is too large", size)))?;
    let rgb = image::open(path)?
        .resize_exact(side, side, FilterType::Triangle)
        .to_rgb8();
    Ok(rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect())
}

/// Stack every image of `folders` into a feature matrix `(n, dim)` and label vector `(n,)`.
///
/// Labels are looked up in `classes`; a folder whose label is unknown is rejected.
pub fn load_labeled(
    folders: &[ClassFolder],
    classes: &ClassIndexMap,
    size: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut features = Vec::new();
    let mut labels = Vec::new();

    for folder in folders {
        let index = classes.index_of(&folder.label).ok_or_else(|| {
            CandleError::InvalidDataset(format!(
                "class '{}' is not known to the model (known: {})",
                folder.label, classes
            ))
        })?;
        for image in &folder.images {
            features.extend(load_pixels(image, size)?);
            labels.push(index as u32);
        }
    }

    if labels.is_empty() {
        return Err(CandleError::InvalidDataset("dataset contains no images".to_string()));
    }

    let count = labels.len();
    let dim = features.len() / count;
    let features = Tensor::from_vec(features, (count, dim), device)?;
    let labels = Tensor::from_vec(labels, count, device)?;
    Ok((features, labels))
}
