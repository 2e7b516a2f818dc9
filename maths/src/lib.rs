use core::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::ops::Div;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn from_array(arr: &[f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    pub const fn to_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub const fn splat(value: f32) -> Self {
        Self::new(value, value, value)
    }

    pub fn length(&self) -> f32 {
        self.dot(*self).sqrt()
    }

    pub fn normalized(&self) -> Self {
        let length = self.length();
        if length == 0.0 {
            return Self::ZERO;
        }

        Self::new(self.x / length, self.y / length, self.z / length)
    }

    pub const fn dot(&self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub const fn cross(&self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            -(self.x * rhs.z - self.z * rhs.x),
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub const fn min(a: Self, b: Self) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
    }

    pub const fn max(a: Self, b: Self) -> Self {
        Self::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
    }

    pub const fn component(&self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub const fn extend(&self, w: f32) -> Vec4 {
        Vec4::new(self.x, self.y, self.z, w)
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vec3> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: Vec3) -> Self::Output {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl From<(f32, f32, f32)> for Vec3 {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        Self::new(x, y, z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub const fn from_array(arr: [f32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    pub const fn from_point(point: Vec3) -> Self {
        Self::new(point.x, point.y, point.z, 1.0)
    }

    pub const fn from_direction(vector: Vec3) -> Self {
        Self::new(vector.x, vector.y, vector.z, 0.0)
    }

    pub const fn to_array(&self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    pub const fn truncate(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub const fn dot(&self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }
}

impl Mul<f32> for Vec4 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs, self.w * rhs)
    }
}

impl Div<f32> for Vec4 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs, self.w / rhs)
    }
}

/// Column-major 4x4 matrix, the layout wgpu uniform data expects.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat4 {
    pub x_axis: Vec4,
    pub y_axis: Vec4,
    pub z_axis: Vec4,
    pub w_axis: Vec4,
}

impl Mat4 {
    pub const IDENTITY: Self = Self::from_cols(
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.0, 0.0, 0.0, 1.0),
    );

    pub const fn from_cols(x_axis: Vec4, y_axis: Vec4, z_axis: Vec4, w_axis: Vec4) -> Self {
        Self {
            x_axis,
            y_axis,
            z_axis,
            w_axis,
        }
    }

    pub const fn from_cols_array_2d(columns: [[f32; 4]; 4]) -> Self {
        Self::from_cols(
            Vec4::from_array(columns[0]),
            Vec4::from_array(columns[1]),
            Vec4::from_array(columns[2]),
            Vec4::from_array(columns[3]),
        )
    }

    pub const fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        [
            self.x_axis.to_array(),
            self.y_axis.to_array(),
            self.z_axis.to_array(),
            self.w_axis.to_array(),
        ]
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(translation.x, translation.y, translation.z, 1.0),
        )
    }

    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(scale.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, scale.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, scale.z, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        )
    }

    pub fn from_rotation_y(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::from_cols(
            Vec4::new(cos, 0.0, -sin, 0.0),
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(sin, 0.0, cos, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        )
    }

    pub const fn transpose(&self) -> Self {
        Self::from_cols(
            Vec4::new(self.x_axis.x, self.y_axis.x, self.z_axis.x, self.w_axis.x),
            Vec4::new(self.x_axis.y, self.y_axis.y, self.z_axis.y, self.w_axis.y),
            Vec4::new(self.x_axis.z, self.y_axis.z, self.z_axis.z, self.w_axis.z),
            Vec4::new(self.x_axis.w, self.y_axis.w, self.z_axis.w, self.w_axis.w),
        )
    }

    pub const fn determinant(&self) -> f32 {
        let m = self.to_cols_array_2d();

        m[0][0] * Self::minor(m, 0, 0) - m[1][0] * Self::minor(m, 1, 0)
            + m[2][0] * Self::minor(m, 2, 0)
            - m[3][0] * Self::minor(m, 3, 0)
    }

    /// Inverse by cofactor expansion; returns the identity for singular
    /// matrices, matching how degenerate transforms are treated elsewhere.
    pub fn inverse(&self) -> Self {
        let det = self.determinant();
        if det == 0.0 {
            return Self::IDENTITY;
        }

        let m = self.to_cols_array_2d();
        let mut cofactors = [[0.0f32; 4]; 4];
        for (col, cofactor_col) in cofactors.iter_mut().enumerate() {
            for (row, cofactor) in cofactor_col.iter_mut().enumerate() {
                let sign = if (col + row) % 2 == 0 { 1.0 } else { -1.0 };
                *cofactor = sign * Self::minor(m, col, row);
            }
        }

        // adjugate = transpose of the cofactor matrix
        let inv_det = 1.0 / det;
        Self::from_cols(
            Vec4::new(cofactors[0][0], cofactors[1][0], cofactors[2][0], cofactors[3][0]),
            Vec4::new(cofactors[0][1], cofactors[1][1], cofactors[2][1], cofactors[3][1]),
            Vec4::new(cofactors[0][2], cofactors[1][2], cofactors[2][2], cofactors[3][2]),
            Vec4::new(cofactors[0][3], cofactors[1][3], cofactors[2][3], cofactors[3][3]),
        ) * inv_det
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        (*self * Vec4::from_point(point)).truncate()
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        (*self * Vec4::from_direction(vector)).truncate()
    }

    /// 3x3 minor obtained by deleting column `col` and row `row`; `m` is in
    /// column-major [col][row] order.
    const fn minor(m: [[f32; 4]; 4], col: usize, row: usize) -> f32 {
        let mut sub = [[0.0f32; 3]; 3];
        let mut ci = 0;
        let mut c = 0;
        while c < 4 {
            if c != col {
                let mut ri = 0;
                let mut r = 0;
                while r < 4 {
                    if r != row {
                        sub[ci][ri] = m[c][r];
                        ri += 1;
                    }
                    r += 1;
                }
                ci += 1;
            }
            c += 1;
        }

        sub[0][0] * (sub[1][1] * sub[2][2] - sub[1][2] * sub[2][1])
            - sub[1][0] * (sub[0][1] * sub[2][2] - sub[0][2] * sub[2][1])
            + sub[2][0] * (sub[0][1] * sub[1][2] - sub[0][2] * sub[1][1])
    }
}

impl Mul<f32> for Mat4 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::from_cols(
            self.x_axis * rhs,
            self.y_axis * rhs,
            self.z_axis * rhs,
            self.w_axis * rhs,
        )
    }
}

impl Mul<Mat4> for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::from_cols(
            self * rhs.x_axis,
            self * rhs.y_axis,
            self * rhs.z_axis,
            self * rhs.w_axis,
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;

    fn mul(self, rhs: Vec4) -> Self::Output {
        Vec4::new(
            self.x_axis.x * rhs.x
                + self.y_axis.x * rhs.y
                + self.z_axis.x * rhs.z
                + self.w_axis.x * rhs.w,
            self.x_axis.y * rhs.x
                + self.y_axis.y * rhs.y
                + self.z_axis.y * rhs.z
                + self.w_axis.y * rhs.w,
            self.x_axis.z * rhs.x
                + self.y_axis.z * rhs.y
                + self.z_axis.z * rhs.z
                + self.w_axis.z * rhs.w,
            self.x_axis.w * rhs.x
                + self.y_axis.w * rhs.y
                + self.z_axis.w * rhs.z
                + self.w_axis.w * rhs.w,
        )
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted-infinite box; the union identity.
    pub const fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.grow(point);
        }
        bounds
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = Vec3::min(self.min, point);
        self.max = Vec3::max(self.max, point);
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Vec3::min(self.min, other.min),
            max: Vec3::max(self.max, other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Bounds of the box's eight corners under an affine transform.
    pub fn transform(&self, matrix: Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }

        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        Self::from_points(corners.into_iter().map(|corner| matrix.transform_point(corner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat_close(a: Mat4, b: Mat4) {
        let a = a.to_cols_array_2d();
        let b = b.to_cols_array_2d();
        for col in 0..4 {
            for row in 0..4 {
                assert!(
                    (a[col][row] - b[col][row]).abs() < 1e-5,
                    "mismatch at [{col}][{row}]: {} vs {}",
                    a[col][row],
                    b[col][row]
                );
            }
        }
    }

    #[test]
    fn inverse_round_trips() {
        let m = Mat4::from_translation(Vec3::new(1.0, -2.0, 3.0))
            * Mat4::from_rotation_y(0.7)
            * Mat4::from_scale(Vec3::new(2.0, 2.0, 2.0));

        assert_mat_close(m * m.inverse(), Mat4::IDENTITY);
        assert_mat_close(m.inverse() * m, Mat4::IDENTITY);
    }

    #[test]
    fn singular_inverse_is_identity() {
        let flat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(flat.inverse(), Mat4::IDENTITY);
    }

    #[test]
    fn transform_point_applies_translation() {
        let m = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(m.transform_point(Vec3::ZERO), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(m.transform_vector(Vec3::X), Vec3::X);
    }

    #[test]
    fn aabb_transform_covers_all_corners() {
        let unit = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = unit.transform(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(9.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, 1.0));

        // rotating the unit cube by 45 degrees widens x/z to sqrt(2)
        let rotated = unit.transform(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        assert!((rotated.max.x - 2.0f32.sqrt()).abs() < 1e-5);
        assert!((rotated.max.z - 2.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn empty_aabb_union_identity() {
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(Aabb::empty().union(&unit), unit);
        assert!(Aabb::empty().is_empty());
    }
}
