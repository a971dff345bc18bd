use glam::{DMat3, DQuat, DVec3};

use crate::linalg;

/// Maximum deviation of `R^T R` from identity (and of `|det R|` from one)
/// accepted for a rotation block.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Errors raised while building or decoding a [`Transform`].
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The rotation block is not orthonormal within [`ORTHONORMAL_TOLERANCE`].
    #[error("Rotation is not orthonormal (max deviation {deviation:.3e}, determinant {determinant:.6})")]
    NotOrthonormal {
        /// Largest absolute entry of `R^T R - I`.
        deviation: f64,
        /// Determinant of the rotation block.
        determinant: f64,
    },

    /// The rotation or translation contains NaN or infinite values.
    #[error("Transform contains non-finite values")]
    NonFinite,

    /// An axis or quaternion with (near) zero norm was given.
    #[error("Cannot compute a rotation from a zero-norm vector")]
    ZeroNorm,

    /// The last row of a homogeneous matrix is not `[0, 0, 0, 1]`.
    #[error("Homogeneous matrix has an invalid last row: {0:?}")]
    InvalidHomogeneousRow([f64; 4]),
}

/// A rigid 3D transform: `p' = R * p + t`.
///
/// The rotation is stored row-major and is guaranteed to be orthonormal
/// for every value built through the public constructors. Transforms are
/// named after the frames they connect, e.g. `cam_from_ego` maps points
/// expressed in the ego frame into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "TransformRecord")]
pub struct Transform {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

#[derive(serde::Deserialize)]
struct TransformRecord {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl TryFrom<TransformRecord> for Transform {
    type Error = TransformError;

    fn try_from(record: TransformRecord) -> Result<Self, Self::Error> {
        Transform::new(record.rotation, record.translation)
    }
}

pub(crate) fn mat3_from_rows(rows: &[[f64; 3]; 3]) -> DMat3 {
    // glam is column-major
    DMat3::from_cols_array_2d(rows).transpose()
}

pub(crate) fn mat3_to_rows(mat: &DMat3) -> [[f64; 3]; 3] {
    mat.transpose().to_cols_array_2d()
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Create a transform from a row-major rotation matrix and a translation.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::NotOrthonormal`] if the rotation is not
    /// orthonormal within [`ORTHONORMAL_TOLERANCE`], and
    /// [`TransformError::NonFinite`] if any entry is NaN or infinite.
    ///
    /// Example:
    ///
    /// ```
    /// use avframe_3d::transforms::Transform;
    ///
    /// let rotation = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
    /// let transform = Transform::new(rotation, [1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(transform.apply(&[1.0, 0.0, 0.0]), [1.0, 3.0, 3.0]);
    ///
    /// let skewed = [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    /// assert!(Transform::new(skewed, [0.0; 3]).is_err());
    /// ```
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Result<Self, TransformError> {
        let all_finite = rotation.iter().flatten().chain(translation.iter()).all(|v| v.is_finite());
        if !all_finite {
            return Err(TransformError::NonFinite);
        }

        let r = mat3_from_rows(&rotation);
        let gram = r.transpose() * r - DMat3::IDENTITY;
        let deviation = gram
            .to_cols_array()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let determinant = r.determinant();

        if deviation > ORTHONORMAL_TOLERANCE || (determinant.abs() - 1.0).abs() > ORTHONORMAL_TOLERANCE {
            return Err(TransformError::NotOrthonormal {
                deviation,
                determinant,
            });
        }

        Ok(Self {
            rotation,
            translation,
        })
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// A pure translation.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Create a transform from a rotation about `axis` by `angle` radians.
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Self::new(axis_angle_to_rotation_matrix(axis, angle)?, translation)
    }

    /// Create a transform from a `(w, x, y, z)` quaternion.
    ///
    /// The quaternion is normalized before conversion.
    pub fn from_quaternion(
        quaternion: &[f64; 4],
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Self::new(quaternion_to_rotation_matrix(quaternion)?, translation)
    }

    /// Create a transform from a row-major 4x4 homogeneous matrix.
    pub fn from_matrix4(matrix: &[[f64; 4]; 4]) -> Result<Self, TransformError> {
        let last = matrix[3];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| (a - b).abs() > ORTHONORMAL_TOLERANCE)
        {
            return Err(TransformError::InvalidHomogeneousRow(last));
        }

        let mut rotation = [[0.0; 3]; 3];
        let mut translation = [0.0; 3];
        for (i, row) in matrix.iter().take(3).enumerate() {
            rotation[i].copy_from_slice(&row[..3]);
            translation[i] = row[3];
        }
        Self::new(rotation, translation)
    }

    /// The row-major rotation block.
    #[inline]
    pub fn rotation(&self) -> &[[f64; 3]; 3] {
        &self.rotation
    }

    /// The translation vector.
    #[inline]
    pub fn translation(&self) -> &[f64; 3] {
        &self.translation
    }

    pub(crate) fn rotation_mat(&self) -> DMat3 {
        mat3_from_rows(&self.rotation)
    }

    pub(crate) fn translation_vec(&self) -> DVec3 {
        DVec3::from_array(self.translation)
    }

    /// Compose two transforms: the result applies `other` first, then `self`.
    ///
    /// `R = R_self * R_other`, `t = R_self * t_other + t_self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        let r_self = self.rotation_mat();
        let rotation = r_self * other.rotation_mat();
        let translation = r_self * other.translation_vec() + self.translation_vec();
        Transform {
            rotation: mat3_to_rows(&rotation),
            translation: translation.to_array(),
        }
    }

    /// Invert the transform: `R' = R^T`, `t' = -R^T * t`.
    pub fn inverse(&self) -> Transform {
        let r_inv = self.rotation_mat().transpose();
        let t_inv = -(r_inv * self.translation_vec());
        Transform {
            rotation: mat3_to_rows(&r_inv),
            translation: t_inv.to_array(),
        }
    }

    /// Apply the transform to a single point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        (self.rotation_mat() * DVec3::from_array(*point) + self.translation_vec()).to_array()
    }

    /// Apply the transform to a batch of points, preserving their order.
    pub fn apply_many(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut dst_points = vec![[0.0; 3]; points.len()];
        linalg::transform_points(points, &self.rotation, &self.translation, &mut dst_points);
        dst_points
    }

    /// The row-major 4x4 homogeneous matrix `[R | t; 0 0 0 1]`.
    pub fn as_matrix(&self) -> [[f64; 4]; 4] {
        let mut matrix = [[0.0; 4]; 4];
        for (i, row) in matrix.iter_mut().take(3).enumerate() {
            row[..3].copy_from_slice(&self.rotation[i]);
            row[3] = self.translation[i];
        }
        matrix[3][3] = 1.0;
        matrix
    }

    /// Entry-wise comparison of rotation and translation within `epsilon`.
    pub fn abs_diff_eq(&self, other: &Transform, epsilon: f64) -> bool {
        self.rotation_mat()
            .abs_diff_eq(other.rotation_mat(), epsilon)
            && self
                .translation_vec()
                .abs_diff_eq(other.translation_vec(), epsilon)
    }
}

impl bincode::enc::Encode for Transform {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.rotation, encoder)?;
        bincode::Encode::encode(&self.translation, encoder)?;
        Ok(())
    }
}

impl<C> bincode::de::Decode<C> for Transform {
    fn decode<D: bincode::de::Decoder<Context = C>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let rotation = bincode::Decode::decode(decoder)?;
        let translation = bincode::Decode::decode(decoder)?;
        Transform::new(rotation, translation)
            .map_err(|e| bincode::error::DecodeError::OtherString(format!("Transform error: {e}")))
    }
}

impl<'de, C> bincode::BorrowDecode<'de, C> for Transform {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = C>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        bincode::Decode::decode(decoder)
    }
}

/// Compute the rotation matrix from an axis and angle.
///
/// The axis does not need to be normalized.
///
/// Example:
///
/// ```
/// use avframe_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 2.0], std::f64::consts::PI).unwrap();
/// assert!((rotation[0][0] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    let axis = DVec3::from_array(*axis);
    if axis.length() < 1e-10 {
        return Err(TransformError::ZeroNorm);
    }
    let rotation = DMat3::from_quat(DQuat::from_axis_angle(axis.normalize(), angle));
    Ok(mat3_to_rows(&rotation))
}

/// Compute the rotation matrix from a `(w, x, y, z)` quaternion.
///
/// Quaternion records from datasets are often stored with limited precision,
/// so the quaternion is normalized first.
pub fn quaternion_to_rotation_matrix(quaternion: &[f64; 4]) -> Result<[[f64; 3]; 3], TransformError> {
    let [w, x, y, z] = *quaternion;
    let q = DQuat::from_xyzw(x, y, z, w);
    if !q.is_finite() {
        return Err(TransformError::NonFinite);
    }
    if q.length() < 1e-10 {
        return Err(TransformError::ZeroNorm);
    }
    Ok(mat3_to_rows(&DMat3::from_quat(q.normalize())))
}
