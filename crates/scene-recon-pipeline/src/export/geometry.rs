//! Exportable geometry built from masked per-view point maps.

use anyhow::{Result, ensure};

use scene_recon_core::{Grid, Mat4, Pt3, Rgb, RgbGrid, transform_point};

/// Coloured point set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub positions: Vec<Pt3>,
    pub colors: Vec<Rgb>,
}

impl PointCloud {
    /// Concatenate the valid points of every view, in view order.
    ///
    /// Non-finite points are skipped even when masked in.
    ///
    /// # Errors
    ///
    /// Returns an error if the per-view lists differ in length or a grid
    /// does not match its image.
    pub fn from_masked(points: &[Grid<Pt3>], images: &[RgbGrid], masks: &[Grid<bool>]) -> Result<Self> {
        check_views(points, images, masks)?;
        let mut cloud = Self::default();
        for ((pts, img), mask) in points.iter().zip(images).zip(masks) {
            for ((p, c), &valid) in pts.iter().zip(img.iter()).zip(mask.iter()) {
                if valid && is_finite(p) {
                    cloud.positions.push(*p);
                    cloud.colors.push(*c);
                }
            }
        }
        Ok(cloud)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn transform(&mut self, m: &Mat4) {
        for p in &mut self.positions {
            *p = transform_point(m, p);
        }
    }
}

/// Triangle mesh with per-vertex colours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Pt3>,
    pub colors: Vec<Rgb>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Triangulate one view's pixel grid.
    ///
    /// Each 2×2 cell `(tl, tr, bl, br)` contributes triangles `(tl, tr, bl)`
    /// and `(tr, bl, br)` together with their back faces. A face is kept only
    /// if all three pixels are valid and finite; only referenced vertices are
    /// emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the grids differ in size.
    pub fn from_grid(points: &Grid<Pt3>, image: &RgbGrid, mask: &Grid<bool>) -> Result<Self> {
        ensure!(
            points.same_size(image) && points.same_size(mask),
            "points {:?}, image {:?} and mask {:?} differ in size",
            points.size(),
            image.size(),
            mask.size()
        );
        let (w, h) = points.size();
        let mut remap: Vec<Option<u32>> = vec![None; w * h];
        let mut mesh = Mesh::default();
        let mut vertex = |mesh: &mut Mesh, i: usize| -> u32 {
            *remap[i].get_or_insert_with(|| {
                mesh.vertices.push(points.as_slice()[i]);
                mesh.colors.push(image.as_slice()[i]);
                (mesh.vertices.len() - 1) as u32
            })
        };

        let valid: Vec<bool> = mask
            .iter()
            .zip(points.iter())
            .map(|(&m, p)| m && is_finite(p))
            .collect();
        for y in 0..h.saturating_sub(1) {
            for x in 0..w.saturating_sub(1) {
                let tl = y * w + x;
                let (tr, bl, br) = (tl + 1, tl + w, tl + w + 1);
                for tri in [[tl, tr, bl], [bl, tr, tl], [tr, bl, br], [br, bl, tr]] {
                    if tri.iter().all(|&i| valid[i]) {
                        let face = tri.map(|i| vertex(&mut mesh, i));
                        mesh.faces.push(face);
                    }
                }
            }
        }
        Ok(mesh)
    }

    /// Merge meshes, offsetting face indices.
    pub fn concat(meshes: impl IntoIterator<Item = Mesh>) -> Mesh {
        let mut out = Mesh::default();
        for m in meshes {
            out.append(m);
        }
        out
    }

    pub fn append(&mut self, other: Mesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.colors.extend(other.colors);
        self.faces
            .extend(other.faces.into_iter().map(|f| f.map(|i| i + offset)));
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn transform(&mut self, m: &Mat4) {
        for p in &mut self.vertices {
            *p = transform_point(m, p);
        }
    }
}

fn is_finite(p: &Pt3) -> bool {
    p.coords.iter().all(|c| c.is_finite())
}

fn check_views(points: &[Grid<Pt3>], images: &[RgbGrid], masks: &[Grid<bool>]) -> Result<()> {
    ensure!(
        points.len() == masks.len() && masks.len() <= images.len(),
        "{} point maps, {} masks and {} images",
        points.len(),
        masks.len(),
        images.len()
    );
    for (v, ((p, i), m)) in points.iter().zip(images).zip(masks).enumerate() {
        ensure!(
            p.same_size(i) && p.same_size(m),
            "view {v}: points {:?}, image {:?}, mask {:?}",
            p.size(),
            i.size(),
            m.size()
        );
    }
    Ok(())
}

/// Triangulate every view and concatenate the results.
///
/// # Errors
///
/// Returns an error on mismatched per-view inputs.
pub fn mesh_from_views(points: &[Grid<Pt3>], images: &[RgbGrid], masks: &[Grid<bool>]) -> Result<Mesh> {
    check_views(points, images, masks)?;
    let meshes = points
        .iter()
        .zip(images)
        .zip(masks)
        .map(|((p, i), m)| Mesh::from_grid(p, i, m))
        .collect::<Result<Vec<_>>>()?;
    Ok(Mesh::concat(meshes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid3() -> (Grid<Pt3>, RgbGrid) {
        let pts = Grid::from_fn(3, 3, |x, y| Pt3::new(x as f64, y as f64, 1.0));
        let img = Grid::from_fn(3, 3, |x, y| [x as u8, y as u8, 0]);
        (pts, img)
    }

    #[test]
    fn full_grid_has_four_faces_per_cell() {
        let (pts, img) = grid3();
        let mesh = Mesh::from_grid(&pts, &img, &Grid::filled(3, 3, true)).unwrap();
        assert_eq!(mesh.num_faces(), 4 * 4);
        assert_eq!(mesh.vertices.len(), 9);
        assert!(mesh.faces.iter().flatten().all(|&i| (i as usize) < 9));
    }

    #[test]
    fn invalid_pixels_drop_their_faces_and_vertices() {
        let (pts, img) = grid3();
        let mut mask = Grid::filled(3, 3, true);
        mask[(1, 1)] = false;
        let mesh = Mesh::from_grid(&pts, &img, &mask).unwrap();
        // Only the top-left and bottom-right cells keep a triangle (and its back face).
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.vertices.len(), 6);
        assert!(!mesh.vertices.contains(&Pt3::new(1.0, 1.0, 1.0)));
        for (v, c) in mesh.vertices.iter().zip(&mesh.colors) {
            assert_eq!([v.x as u8, v.y as u8, 0], *c);
        }
    }

    #[test]
    fn empty_mask_gives_empty_mesh() {
        let (pts, img) = grid3();
        let mesh = Mesh::from_grid(&pts, &img, &Grid::filled(3, 3, false)).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.vertices.is_empty());
    }

    #[test]
    fn non_finite_points_are_never_exported() {
        let (mut pts, img) = grid3();
        pts[(1, 1)] = Pt3::new(f64::NAN, 0.0, 1.0);
        pts[(2, 2)] = Pt3::new(0.0, f64::INFINITY, 1.0);
        let all = Grid::filled(3, 3, true);

        let mesh = Mesh::from_grid(&pts, &img, &all).unwrap();
        // Only the top-left triangle and its back face avoid both bad pixels.
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.vertices.len(), 3);
        assert!(mesh.vertices.iter().all(is_finite));

        let cloud = PointCloud::from_masked(&[pts], &[img], &[all]).unwrap();
        assert_eq!(cloud.len(), 7);
        assert!(cloud.positions.iter().all(is_finite));
    }

    #[test]
    fn concat_offsets_indices() {
        let (pts, img) = grid3();
        let one = Mesh::from_grid(&pts, &img, &Grid::filled(3, 3, true)).unwrap();
        let two = Mesh::concat([one.clone(), one.clone()]);
        assert_eq!(two.vertices.len(), 18);
        assert_eq!(two.num_faces(), 32);
        assert_eq!(two.faces[16], one.faces[0].map(|i| i + 9));
    }

    #[test]
    fn point_cloud_keeps_masked_points_in_view_order() {
        let (pts, img) = grid3();
        let mut mask = Grid::filled(3, 3, false);
        mask[(2, 0)] = true;
        let cloud = PointCloud::from_masked(
            &[pts.clone(), pts],
            &[img.clone(), img],
            &[mask, Grid::filled(3, 3, true)],
        )
        .unwrap();
        assert_eq!(cloud.len(), 10);
        assert_eq!(cloud.positions[0], Pt3::new(2.0, 0.0, 1.0));
        assert_eq!(cloud.colors[0], [2, 0, 0]);
    }
}
