//! Math type re-exports and small vector helpers shared by host shading code.
//!
//! Host-side light transport runs in double precision; the device works in
//! `f32`. Conversions between the two live here.

pub use glam::{DVec3, DVec4, IVec3, UVec3, Vec3, Vec4};

/// Build an orthonormal basis `(tangent, bitangent)` around a unit normal.
///
/// Branchless construction (Duff et al. 2017).
#[inline]
pub fn orthonormal_basis(n: DVec3) -> (DVec3, DVec3) {
    let sign = 1.0f64.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let t = DVec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bt = DVec3::new(b, sign + n.y * n.y * a, -n.y);
    (t, bt)
}

/// Mirror `d` around the unit normal `n`.
#[inline]
pub fn reflect(d: DVec3, n: DVec3) -> DVec3 {
    d - 2.0 * d.dot(n) * n
}

/// Narrow a host vector to the device's precision.
#[inline]
pub fn to_f32(v: DVec3) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

/// RGB part of an RGBA color.
#[inline]
pub fn rgb(c: DVec4) -> DVec3 {
    DVec3::new(c.x, c.y, c.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_is_orthonormal() {
        for n in [DVec3::X, DVec3::Y, DVec3::Z, -DVec3::Z, DVec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-12);
            assert!(b.dot(n).abs() < 1e-12);
            assert!(t.dot(b).abs() < 1e-12);
            assert!((t.length() - 1.0).abs() < 1e-12);
            assert!((b.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reflect() {
        let d = DVec3::new(1.0, -1.0, 0.0);
        assert_eq!(reflect(d, DVec3::Y), DVec3::new(1.0, 1.0, 0.0));
    }
}
