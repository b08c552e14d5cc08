use scene_recon_core::{Mat4, Pt3, Real, Rgb, transform_point};

use super::geometry::Mesh;

/// Pyramid marking a camera: apex at the camera centre, base a rectangle
/// with the image aspect ratio in front of the camera.
///
/// `camera_size` is the base width in world units. The base sits at
/// `max(camera_size / 10, focal * camera_size / width)` along the optical
/// axis, so longer focals give deeper frustums. Faces are emitted in both
/// windings.
pub fn camera_frustum(pose: &Mat4, focal: Real, image_size: (usize, usize), camera_size: Real, color: Rgb) -> Mesh {
    let (w, h) = image_size;
    let width = w.max(1) as Real;
    let half_w = camera_size / 2.0;
    let half_h = half_w * h as Real / width;
    let depth = (camera_size / 10.0).max(focal * camera_size / width);

    let local = [
        Pt3::origin(),
        Pt3::new(-half_w, -half_h, depth),
        Pt3::new(half_w, -half_h, depth),
        Pt3::new(half_w, half_h, depth),
        Pt3::new(-half_w, half_h, depth),
    ];
    let vertices: Vec<Pt3> = local.iter().map(|p| transform_point(pose, p)).collect();

    let mut faces = Vec::with_capacity(8);
    for i in 1..=4u32 {
        let next = i % 4 + 1;
        faces.push([0, i, next]);
        faces.push([0, next, i]);
    }

    Mesh {
        colors: vec![color; vertices.len()],
        vertices,
        faces,
    }
}
