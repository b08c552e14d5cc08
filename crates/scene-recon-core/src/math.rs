//! Mathematical utilities and type definitions.
//!
//! Poses are stored as homogeneous 4×4 camera-to-world matrices (`Mat4`),
//! which is also the layout written to pose JSON files. Helpers in this
//! module convert between that layout and nalgebra's structured transforms.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Axis convention flip from computer-vision camera axes (x right, y down,
/// z forward) to OpenGL camera axes (x right, y up, z backward).
pub fn opengl_flip() -> Mat4 {
    Mat4::from_diagonal(&nalgebra::Vector4::new(1.0, -1.0, -1.0, 1.0))
}

/// Homogeneous rotation of `degrees` about the vertical (y) axis.
pub fn rotation_y(degrees: Real) -> Mat4 {
    Rotation3::from_axis_angle(&Vec3::y_axis(), degrees.to_radians()).to_homogeneous()
}

/// Apply a homogeneous 4×4 transform to a 3D point.
///
/// The transform is assumed affine (last row `0 0 0 1`), so no perspective
/// division is performed.
pub fn transform_point(m: &Mat4, p: &Pt3) -> Pt3 {
    let r = m.fixed_view::<3, 3>(0, 0);
    let t = m.fixed_view::<3, 1>(0, 3);
    Pt3::from(r * p.coords + t)
}

/// Build a homogeneous matrix from a rotation, translation and uniform scale
/// applied before the rotation (`p' = s R p + t`).
pub fn similarity_matrix(rotation: &Rotation3<Real>, translation: &Vec3, scale: Real) -> Mat4 {
    let mut m = Mat4::identity();
    m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(rotation.matrix() * scale));
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Camera centre (translation column) of a camera-to-world pose.
pub fn pose_center(pose: &Mat4) -> Pt3 {
    Pt3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

/// Convert a rigid pose matrix into an isometry.
///
/// The rotation block is re-orthonormalized, so matrices carrying a small
/// amount of numerical drift are accepted.
pub fn mat4_to_iso3(pose: &Mat4) -> Iso3 {
    let r: Mat3 = pose.fixed_view::<3, 3>(0, 0).into_owned();
    let rot = Rotation3::from_matrix(&r);
    Iso3::from_parts(
        nalgebra::Translation3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)]),
        rot.into(),
    )
}

/// Row-major nested array view of a 4×4 matrix, as written to pose JSON.
pub fn mat4_rows(m: &Mat4) -> [[Real; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_y_180_flips_x_and_z() {
        let r = rotation_y(180.0);
        let p = transform_point(&r, &Pt3::new(1.0, 2.0, 3.0));
        assert!((p.x + 1.0).abs() < 1e-12);
        assert!((p.y - 2.0).abs() < 1e-12);
        assert!((p.z + 3.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_matrix_applies_scale_then_translation() {
        let rot = Rotation3::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let m = similarity_matrix(&rot, &Vec3::new(1.0, 0.0, 0.0), 2.0);
        let p = transform_point(&m, &Pt3::new(1.0, 0.0, 0.0));
        assert!((p - Pt3::new(1.0, 2.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn mat4_rows_is_row_major() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 5.0;
        let rows = mat4_rows(&m);
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 5.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn mat4_to_iso3_roundtrips_rigid_pose() {
        let iso = Iso3::new(Vec3::new(0.1, -0.2, 0.3), Vec3::new(0.2, 0.1, -0.4));
        let back = mat4_to_iso3(&iso.to_homogeneous());
        assert!((back.to_homogeneous() - iso.to_homogeneous()).norm() < 1e-12);
    }
}
