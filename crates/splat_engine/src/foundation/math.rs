//! Math utilities and types
//!
//! Thin aliases over `nalgebra` used by the camera and the point-cloud loader.

pub use nalgebra::{Vector3, Matrix4, Point3 as NPoint3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = NPoint3<f32>;

/// Convert a matrix into the column-major array layout GLSL expects for `mat4`
pub fn to_column_major(matrix: &Mat4) -> [[f32; 4]; 4] {
    let mut columns = [[0.0; 4]; 4];
    for (c, column) in columns.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    columns
}

/// Integer ceiling division for dispatch and tiling math
pub const fn div_ceil(value: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        return 0;
    }
    value.div_ceil(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_layout() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 7.0; // translation x lives in column 3
        let columns = to_column_major(&m);
        assert_eq!(columns[3][0], 7.0);
        assert_eq!(columns[0][3], 0.0);
    }

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(0, 256), 0);
        assert_eq!(div_ceil(1, 256), 1);
        assert_eq!(div_ceil(256, 256), 1);
        assert_eq!(div_ceil(257, 256), 2);
        assert_eq!(div_ceil(5, 0), 0);
    }
}
