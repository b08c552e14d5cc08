use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use scene_recon_core::{RgbGrid, View, validate_views};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Side lengths are cropped to a multiple of this.
const PATCH: u32 = 16;

/// How input images are brought to model resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoadOptions {
    /// Target length of the longer image side.
    pub long_side: u32,
    /// Keep square images square; otherwise they are cropped to 4:3.
    pub square_ok: bool,
}

impl Default for ImageLoadOptions {
    fn default() -> Self {
        Self {
            long_side: 512,
            square_ok: false,
        }
    }
}

/// Resize so the long side equals `opts.long_side`, then centre-crop both
/// sides to a multiple of 16.
///
/// # Errors
///
/// Returns an error if the result would be empty.
pub fn prepare_image(img: &RgbImage, opts: &ImageLoadOptions) -> Result<RgbImage> {
    let (w, h) = img.dimensions();
    ensure!(w > 0 && h > 0, "image is empty");
    let long = w.max(h) as f64;
    let scale = f64::from(opts.long_side) / long;
    let (w2, h2) = (
        ((f64::from(w) * scale).round() as u32).max(1),
        ((f64::from(h) * scale).round() as u32).max(1),
    );
    let filter = if scale < 1.0 {
        FilterType::Lanczos3
    } else {
        FilterType::CatmullRom
    };
    let resized = if (w2, h2) == (w, h) {
        img.clone()
    } else {
        imageops::resize(img, w2, h2, filter)
    };

    let (cx, cy) = (w2 / 2, h2 / 2);
    let half_w = (2 * cx / PATCH) * PATCH / 2;
    let mut half_h = (2 * cy / PATCH) * PATCH / 2;
    if !opts.square_ok && w2 == h2 {
        half_h = 3 * half_w / 4;
    }
    ensure!(
        half_w > 0 && half_h > 0,
        "image of {w}x{h} is too small to crop to multiples of {PATCH}"
    );
    Ok(imageops::crop_imm(&resized, cx - half_w, cy - half_h, 2 * half_w, 2 * half_h).to_image())
}

/// Decode one image file and prepare it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load_image(path: &Path, opts: &ImageLoadOptions) -> Result<RgbImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("failed to read image {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    prepare_image(&img, opts)
}

/// Image files in `dir` sorted by name, at most `limit` of them.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn list_images(dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    if let Some(n) = limit {
        paths.truncate(n);
    }
    Ok(paths)
}

/// Load `paths` as views `0..n`, named after their file names.
///
/// # Errors
///
/// Returns an error if no paths are given or any image fails to load.
pub fn load_views(paths: &[PathBuf], opts: &ImageLoadOptions) -> Result<Vec<View>> {
    ensure!(!paths.is_empty(), "no input images");
    let views = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let img = load_image(path, opts)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("view_{i}"));
            log::debug!("loaded {} as {}x{}", path.display(), img.width(), img.height());
            Ok(View::new(i, name, RgbGrid::from_rgb_image(&img)))
        })
        .collect::<Result<Vec<_>>>()?;
    validate_views(&views)?;
    log::info!("loaded {} images", views.len());
    Ok(views)
}
