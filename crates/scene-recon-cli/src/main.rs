use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use serde::{Deserialize, Serialize};

use scene_recon_pipeline::{
    ExportOptions, MstAligner, PrecomputedPairs, ReconstructionConfig, ReconstructionSession,
    Schedule, Topology, list_images, load_views, save_channels, save_points,
    save_poses, step_reconstruct,
};

/// Reconstruct a scene from a folder of images and export it.
#[derive(Debug, Parser)]
#[command(author, version, about = "Pairwise 3D reconstruction and export")]
struct Args {
    /// Scene name; images are read from `<data-dir>/<item>_images`.
    #[arg(long, default_value = "box")]
    item: String,

    /// Number of images to use (the first ones in name order).
    #[arg(long, default_value_t = 2)]
    views: usize,

    #[arg(long, default_value = "sfm_data")]
    data_dir: PathBuf,

    /// Directory of `pair_{a}_{b}.json` predictions. Defaults to
    /// `<data-dir>/<item>_predictions`.
    #[arg(long)]
    predictions: Option<PathBuf>,

    #[arg(long, default_value = "estimation")]
    out_dir: PathBuf,

    /// Optional JSON file with `reconstruction` and `export` sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scene graph: `complete`, `swin-<w>` or `oneref-<r>`.
    #[arg(long)]
    topology: Option<Topology>,

    /// Learning-rate schedule: `linear` or `cosine`.
    #[arg(long)]
    schedule: Option<Schedule>,

    #[arg(long)]
    iterations: Option<usize>,

    /// Also write RGB/depth/confidence images per view.
    #[arg(long)]
    diagnostics: bool,

    /// Write the session snapshot to this path.
    #[arg(long)]
    session: Option<PathBuf>,
}

/// Settings read from `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    reconstruction: ReconstructionConfig,
    export: ExportOptions,
}

impl Default for CliConfig {
    fn default() -> Self {
        let mut reconstruction = ReconstructionConfig::default();
        reconstruction.alignment.schedule = Schedule::Cosine;
        Self {
            reconstruction,
            export: ExportOptions::default(),
        }
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn effective_config(args: &Args) -> Result<CliConfig> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<CliConfig>(path)?,
        None => CliConfig::default(),
    };
    if let Some(topology) = args.topology {
        config.reconstruction.topology = topology;
    }
    if let Some(schedule) = args.schedule {
        config.reconstruction.alignment.schedule = schedule;
    }
    if let Some(iterations) = args.iterations {
        config.reconstruction.alignment.iterations = iterations;
    }
    config.export.validate()?;
    Ok(config)
}

/// Run the whole pipeline; returns the paths written.
fn run(args: &Args) -> Result<Vec<PathBuf>> {
    ensure!(args.views > 0, "--views must be at least 1");
    let config = effective_config(args)?;

    let images_dir = args.data_dir.join(format!("{}_images", args.item));
    let paths = list_images(&images_dir, Some(args.views))?;
    ensure!(!paths.is_empty(), "no images found in {}", images_dir.display());
    if paths.len() < args.views {
        log::warn!(
            "requested {} views but {} holds only {}",
            args.views,
            images_dir.display(),
            paths.len()
        );
    }
    let views = load_views(&paths, &config.reconstruction.images)?;

    let mut session =
        ReconstructionSession::with_description(format!("{} ({} views)", args.item, views.len()));
    session.set_config(config.reconstruction.clone())?;
    session.set_input(views)?;

    let predictions = args
        .predictions
        .clone()
        .unwrap_or_else(|| args.data_dir.join(format!("{}_predictions", args.item)));
    let mut model = PrecomputedPairs::new(predictions)?;
    step_reconstruct(&mut session, &mut model, &mut MstAligner::new())?;

    let mut written = Vec::new();
    for as_point_cloud in [false, true] {
        let opts = ExportOptions {
            as_point_cloud,
            ..config.export.clone()
        };
        if let Some(summary) = session.export_model(&args.out_dir, &args.item, &opts)? {
            written.push(summary.path);
        }
    }

    let scene = session.require_scene()?;
    // A lone input view is reconstructed as a duplicated pair; only the
    // original is written.
    let names: Vec<String> = session.views().iter().map(|v| v.name.clone()).collect();
    let poses_path = args.out_dir.join(format!("{}_poses.json", args.item));
    save_poses(&scene.poses()[..names.len()], &names, &poses_path)?;
    written.push(poses_path);

    let ply_path = args.out_dir.join(format!("{}_point_cloud.ply", args.item));
    save_points(&scene.all_points(), None, &ply_path)?;
    written.push(ply_path);

    if args.diagnostics {
        written.extend(save_channels(scene, &args.out_dir.join("diagnostics"), &args.item)?);
    }

    if let Some(path) = &args.session {
        fs::write(path, session.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path.clone());
    }
    Ok(written)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(written) => {
            for path in written {
                println!("{}", path.display());
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_recon_pipeline::test_utils::SyntheticScene;
    use scene_recon_pipeline::persistence::load_poses;
    use tempfile::TempDir;

    /// Two 64x32 images load as 32x16 views when `long_side` is 32.
    fn fixture(dir: &Path, item: &str) -> PathBuf {
        let images = dir.join(format!("{item}_images"));
        let preds = dir.join(format!("{item}_predictions"));
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&preds).unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            image::RgbImage::from_pixel(64, 32, image::Rgb([90, 120, 200]))
                .save(images.join(name))
                .unwrap();
        }
        let synth = SyntheticScene::orbit(3, 32, 16);
        for (a, b) in [(0, 1), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1)] {
            PrecomputedPairs::store(&preds, &synth.predict(a, b)).unwrap();
        }

        let mut config = CliConfig::default();
        config.reconstruction.images.long_side = 32;
        config.reconstruction.alignment.iterations = 5;
        let path = dir.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        path
    }

    fn args(dir: &Path, config: PathBuf, views: usize) -> Args {
        Args::parse_from([
            "scene-recon".to_string(),
            "--item".into(),
            "box".into(),
            "--views".into(),
            views.to_string(),
            "--data-dir".into(),
            dir.display().to_string(),
            "--out-dir".into(),
            dir.join("estimation").display().to_string(),
            "--config".into(),
            config.display().to_string(),
        ])
    }

    #[test]
    fn writes_the_four_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = fixture(dir.path(), "box");
        let written = run(&args(dir.path(), config, 2)).unwrap();
        let out = dir.path().join("estimation");
        for name in ["box_mesh.glb", "box_pointcloud.glb", "box_poses.json", "box_point_cloud.ply"] {
            assert!(written.contains(&out.join(name)), "missing {name}");
            assert!(out.join(name).exists());
        }
        let poses = load_poses(&out.join("box_poses.json")).unwrap();
        let names: Vec<_> = poses.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png"]);
    }

    #[test]
    fn single_view_writes_one_pose() {
        let dir = TempDir::new().unwrap();
        let config = fixture(dir.path(), "box");
        let mut a = args(dir.path(), config, 1);
        a.session = Some(dir.path().join("session.json"));
        run(&a).unwrap();
        let poses = load_poses(&dir.path().join("estimation").join("box_poses.json")).unwrap();
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].0, "a.png");
        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("session.json")).unwrap()).unwrap();
        assert_eq!(snapshot["mode"], "pair_viewer");
    }

    #[test]
    fn three_views_run_iteratively() {
        let dir = TempDir::new().unwrap();
        let config = fixture(dir.path(), "box");
        let mut a = args(dir.path(), config, 3);
        a.session = Some(dir.path().join("session.json"));
        run(&a).unwrap();
        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("session.json")).unwrap()).unwrap();
        assert_eq!(snapshot["mode"], "iterative");
        assert_eq!(snapshot["exports"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn flags_override_config() {
        let dir = TempDir::new().unwrap();
        let config = fixture(dir.path(), "box");
        let mut a = args(dir.path(), config, 2);
        a.topology = Some(Topology::OneReference { reference: 1 });
        a.schedule = Some(Schedule::Linear);
        let cfg = effective_config(&a).unwrap();
        assert_eq!(cfg.reconstruction.topology, Topology::OneReference { reference: 1 });
        assert_eq!(cfg.reconstruction.alignment.schedule, Schedule::Linear);
        assert_eq!(cfg.reconstruction.images.long_side, 32);
    }

    #[test]
    fn default_schedule_is_cosine() {
        assert_eq!(CliConfig::default().reconstruction.alignment.schedule, Schedule::Cosine);
        let parsed = Args::parse_from(["scene-recon", "--topology", "swin-2"]);
        assert_eq!(parsed.topology, Some(Topology::SlidingWindow { window: 2 }));
        assert_eq!(parsed.views, 2);
    }

    #[test]
    fn missing_images_fail() {
        let dir = TempDir::new().unwrap();
        let a = Args::parse_from([
            "scene-recon".to_string(),
            "--data-dir".into(),
            dir.path().display().to_string(),
        ]);
        assert!(run(&a).is_err());
    }
}
