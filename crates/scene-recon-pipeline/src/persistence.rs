//! Pose JSON and PLY point cloud files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use scene_recon_core::{Mat4, Pt3, Real, ReconError, Rgb, mat4_rows};

/// On-disk pose file: camera-to-world 4×4 matrices keyed by image name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFile {
    pub extrinsics: Map<String, Value>,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

/// Write `{"extrinsics": {name: [[row0], .., [row3]]}}` to `path`.
///
/// Later entries win when names repeat.
///
/// # Errors
///
/// Returns [`ReconError::CountMismatch`] if `poses` and `names` differ in
/// length (nothing is written), or an I/O error.
pub fn save_poses(poses: &[Mat4], names: &[String], path: &Path) -> Result<()> {
    if poses.len() != names.len() {
        return Err(ReconError::CountMismatch {
            left: "pose",
            left_len: poses.len(),
            right: "name",
            right_len: names.len(),
        }
        .into());
    }

    let mut extrinsics = Map::new();
    for (name, pose) in names.iter().zip(poses) {
        if extrinsics
            .insert(name.clone(), serde_json::to_value(mat4_rows(pose))?)
            .is_some()
        {
            log::warn!("duplicate image name '{name}' in pose file; keeping the last pose");
        }
    }

    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(&PoseFile { extrinsics })?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("saved {} camera poses to {}", poses.len(), path.display());
    Ok(())
}

/// Read a pose file written by [`save_poses`], in key order.
///
/// # Errors
///
/// Returns an error if the file is unreadable or a pose is not a 4×4 array.
pub fn load_poses(path: &Path) -> Result<Vec<(String, Mat4)>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file: PoseFile =
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    file.extrinsics
        .into_iter()
        .map(|(name, value)| {
            let rows: [[Real; 4]; 4] = serde_json::from_value(value)
                .with_context(|| format!("pose '{name}' is not a 4x4 matrix"))?;
            Ok((name, Mat4::from_fn(|r, c| rows[r][c])))
        })
        .collect()
}

/// Write an ASCII PLY with float XYZ and, when `colors` is given, uchar RGB.
///
/// # Errors
///
/// Returns an error if `colors` does not match `points` in length or the
/// writer fails.
pub fn write_ply<W: Write>(writer: &mut W, points: &[Pt3], colors: Option<&[Rgb]>) -> Result<()> {
    if let Some(colors) = colors.filter(|c| c.len() != points.len()) {
        return Err(ReconError::CountMismatch {
            left: "point",
            left_len: points.len(),
            right: "color",
            right_len: colors.len(),
        }
        .into());
    }

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", points.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }
    writeln!(writer, "end_header")?;

    for (i, p) in points.iter().enumerate() {
        write!(writer, "{} {} {}", p.x as f32, p.y as f32, p.z as f32)?;
        if let Some(colors) = colors {
            let [r, g, b] = colors[i];
            write!(writer, " {r} {g} {b}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Save points (and optional colours) as an ASCII PLY file.
///
/// # Errors
///
/// See [`write_ply`].
pub fn save_points(points: &[Pt3], colors: Option<&[Rgb]>, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_ply(&mut writer, points, colors)?;
    writer.flush()?;
    log::info!("saved {} points to {}", points.len(), path.display());
    Ok(())
}

/// Save rows of 3 or 4 numbers as an XYZ PLY file; a 4th column is dropped.
///
/// # Errors
///
/// Returns [`ReconError::InvalidPointColumns`] for a row of any other
/// width, or an I/O error.
pub fn save_point_cloud<R: AsRef<[Real]>>(rows: &[R], path: &Path) -> Result<()> {
    let points = rows
        .iter()
        .enumerate()
        .map(|(row, r)| match r.as_ref() {
            [x, y, z] | [x, y, z, _] => Ok(Pt3::new(*x, *y, *z)),
            other => Err(ReconError::InvalidPointColumns {
                row,
                columns: other.len(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    save_points(&points, None, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;
    use tempfile::TempDir;

    #[test]
    fn poses_round_trip_by_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/poses.json");
        let poses = [
            Mat4::identity(),
            Translation3::new(1.0, -2.0, 0.5).to_homogeneous(),
        ];
        let names = ["b.png".to_string(), "a.png".to_string()];
        save_poses(&poses, &names, &path).unwrap();

        let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["extrinsics"]["a.png"][0][3], 1.0);
        assert_eq!(json["extrinsics"]["b.png"][3][3], 1.0);

        let loaded = load_poses(&path).unwrap();
        assert_eq!(loaded[0].0, "a.png");
        assert_eq!(loaded[0].1, poses[1]);
    }

    #[test]
    fn pose_count_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("poses.json");
        let err = save_poses(&[Mat4::identity(); 3], &["a".into(), "b".into()], &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::CountMismatch { left_len: 3, right_len: 2, .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn ply_header_and_colours() {
        let mut buf = Vec::new();
        write_ply(
            &mut buf,
            &[Pt3::new(1.0, 2.0, 3.0)],
            Some(&[[10u8, 20, 30]][..]),
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "ply");
        assert_eq!(lines[2], "element vertex 1");
        assert!(lines.contains(&"property uchar red"));
        assert_eq!(*lines.last().unwrap(), "1 2 3 10 20 30");
    }

    #[test]
    fn fourth_column_is_dropped() {
        let dir = TempDir::new().unwrap();
        let three = dir.path().join("three.ply");
        let four = dir.path().join("four.ply");
        save_point_cloud(&[[0.5, 1.0, -2.0], [3.0, 4.0, 5.0]], &three).unwrap();
        save_point_cloud(&[[0.5, 1.0, -2.0, 9.0], [3.0, 4.0, 5.0, 1.0]], &four).unwrap();
        assert_eq!(fs::read(&three).unwrap(), fs::read(&four).unwrap());
    }

    #[test]
    fn bad_row_width_is_rejected() {
        let dir = TempDir::new().unwrap();
        let rows = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]];
        let err = save_point_cloud(&rows, &dir.path().join("x.ply")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReconError>(),
            Some(&ReconError::InvalidPointColumns { row: 1, columns: 2 })
        );
    }
}
