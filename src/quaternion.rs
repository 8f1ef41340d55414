//! Quaternion helpers shared by the orientation filters.
//!
//! Quaternions are stored in filter state vectors in `(w, x, y, z)` order and
//! describe the rotation from the body frame to the navigation frame.

use nalgebra::{Matrix3, Quaternion, SMatrix, SVector, UnitQuaternion, Vector3, Vector4};

use crate::error::TrackerError;

/// Normalizes `q`, failing with [`TrackerError::DegenerateQuaternion`] if its
/// norm is zero (or not finite).
pub fn normalize(q: &Quaternion<f64>) -> Result<UnitQuaternion<f64>, TrackerError> {
    let norm = q.norm();
    if norm == 0.0 || !norm.is_finite() {
        return Err(TrackerError::DegenerateQuaternion);
    }

    Ok(UnitQuaternion::new_unchecked(Quaternion::from(q.coords / norm)))
}

/// Builds a quaternion from a `(w, x, y, z)` vector.
#[must_use]
pub fn from_wxyz(v: &Vector4<f64>) -> Quaternion<f64> {
    Quaternion::new(v[0], v[1], v[2], v[3])
}

/// Returns the `(w, x, y, z)` components of `q`.
#[must_use]
pub fn to_wxyz(q: &Quaternion<f64>) -> Vector4<f64> {
    Vector4::new(q.w, q.i, q.j, q.k)
}

/// The body-to-navigation rotation matrix of a unit quaternion.
///
/// $$
/// R(q) = \begin{bmatrix}
/// 1 - 2(y^2 + z^2) & 2(xy - wz) & 2(xz + wy) \\\\
/// 2(xy + wz) & 1 - 2(x^2 + z^2) & 2(yz - wx) \\\\
/// 2(xz - wy) & 2(yz + wx) & 1 - 2(x^2 + y^2)
/// \end{bmatrix}
/// $$
#[must_use]
pub fn to_rotation_matrix(q: &UnitQuaternion<f64>) -> Matrix3<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);

    Matrix3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        1.0 - 2.0 * (x * x + y * y),
    )
}

/// Roll, pitch and yaw (intrinsic Z-Y-X) of `q`, in radians.
#[must_use]
pub fn euler_angles(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    Vector3::new(roll, pitch, yaw)
}

/// Wraps an angle into `[-pi, pi]`.
#[must_use]
pub fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};

    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid maps exactly PI to -PI, keep the sign of the input
    if wrapped == -PI && angle > 0.0 {
        PI
    } else {
        wrapped
    }
}

/// Jacobian of `h` with respect to the `(w, x, y, z)` components of `q`, by
/// symmetric central differences with step `eps`.
///
/// Every perturbed quaternion is renormalized before `h` is evaluated, so the
/// result is the sensitivity of `h` on the unit sphere.
pub fn central_difference<const M: usize>(
    q: &Vector4<f64>,
    eps: f64,
    h: impl Fn(&UnitQuaternion<f64>) -> SVector<f64, M>,
) -> SMatrix<f64, M, 4> {
    let mut jacobian = SMatrix::<f64, M, 4>::zeros();

    for i in 0..4 {
        let mut dq = Vector4::zeros();
        dq[i] = eps;

        let plus = UnitQuaternion::from_quaternion(from_wxyz(&(q + dq)));
        let minus = UnitQuaternion::from_quaternion(from_wxyz(&(q - dq)));

        jacobian.set_column(i, &((h(&plus) - h(&minus)) / (2.0 * eps)));
    }

    jacobian
}
