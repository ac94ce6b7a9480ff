// tests/common/mod.rs — Helpers shared by the integration suites.

use nalgebra::Rotation3;

/// Frobenius distance between two rotation matrices, about √2 times the
/// angle between them for small angles.
///
/// `Rotation3::angle_to` goes through `acos` of the trace, which returns
/// NaN when rounding pushes its argument just above 1 for equal rotations.
#[allow(dead_code)]
pub fn rotation_error(a: &Rotation3<f64>, b: &Rotation3<f64>) -> f64 {
    (a.matrix() - b.matrix()).norm()
}
