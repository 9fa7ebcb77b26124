// This file is part of Limbrad.
//
// Limbrad is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Limbrad is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Limbrad.  If not, see <http://www.gnu.org/licenses/>.
use crate::constants::RE;
use nalgebra::Vector3;

/// Find the bracketing interval for `x` on a monotonic axis.
///
/// Returns `ilo` such that `xx[ilo]..xx[ilo+1]` brackets `x`, clamped to
/// `[0, n-2]` so that the terminal interval is used for out-of-range queries.
/// The axis may be ascending or descending; it must have at least two points.
pub fn locate(xx: &[f64], x: f64) -> usize {
    debug_assert!(xx.len() >= 2);
    let mut ilo = 0;
    let mut ihi = xx.len() - 1;
    if xx[0] < xx[xx.len() - 1] {
        while ihi > ilo + 1 {
            let i = (ihi + ilo) >> 1;
            if xx[i] < x {
                ilo = i;
            } else {
                ihi = i;
            }
        }
    } else {
        while ihi > ilo + 1 {
            let i = (ihi + ilo) >> 1;
            if xx[i] > x {
                ilo = i;
            } else {
                ihi = i;
            }
        }
    }
    ilo
}

/// Same bracket search for the ascending `f32` payload axes of the
/// emissivity tables.
pub fn locate_f32(xx: &[f32], x: f64) -> usize {
    debug_assert!(xx.len() >= 2);
    let mut ilo = 0;
    let mut ihi = xx.len() - 1;
    while ihi > ilo + 1 {
        let i = (ihi + ilo) >> 1;
        if f64::from(xx[i]) > x {
            ihi = i;
        } else {
            ilo = i;
        }
    }
    ilo
}

/// Two-point linear interpolation (extrapolates beyond the bracket).
pub fn lin(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    y0 + (y1 - y0) / (x1 - x0) * (x - x0)
}

/// Two-point interpolation, linear in log(y). Falls back to linear when
/// either ordinate is non-positive.
pub fn exp_interp(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    if y0 > 0.0 && y1 > 0.0 {
        y0 * ((y1 / y0).ln() / (x1 - x0) * (x - x0)).exp()
    } else {
        lin(x0, y0, x1, y1, x)
    }
}

/// Convert altitude [km], longitude [deg], latitude [deg] to Earth-centered
/// Cartesian coordinates [km] on a spherical Earth.
pub fn geo2cart(z: f64, lon: f64, lat: f64) -> Vector3<f64> {
    let radius = z + RE;
    let latr = lat.to_radians();
    let lonr = lon.to_radians();
    Vector3::new(
        radius * latr.cos() * lonr.cos(),
        radius * latr.cos() * lonr.sin(),
        radius * latr.sin(),
    )
}

/// Inverse of [`geo2cart`]: Cartesian [km] to (z [km], lon [deg], lat [deg]).
pub fn cart2geo(x: &Vector3<f64>) -> (f64, f64, f64) {
    let radius = x.norm();
    let lat = (x[2] / radius).asin().to_degrees();
    let lon = x[1].atan2(x[0]).to_degrees();
    (radius - RE, lon, lat)
}

/// Unit vector from the Earth's center toward the Sun in the rotating
/// Earth-fixed frame. `time` counts seconds since 2000-01-01T00:00Z.
///
/// Low-precision ephemeris (a fraction of a degree); good enough to set the
/// scattering angle of the single-scatter source, nothing else.
pub fn sun_direction(time: f64) -> Vector3<f64> {
    // Days since J2000.0 (the epoch sits at 12:00Z).
    let n = time / 86400.0 - 0.5;

    let l = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let g = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
    let lambda = (l + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let obliquity = (23.439 - 4.0e-7 * n).to_radians();

    // Equatorial-frame unit vector.
    let xe = lambda.cos();
    let ye = obliquity.cos() * lambda.sin();
    let ze = obliquity.sin() * lambda.sin();

    // Spin into the Earth-fixed frame.
    let gmst = (280.460_618_37 + 360.985_647_366_29 * n)
        .rem_euclid(360.0)
        .to_radians();
    Vector3::new(
        gmst.cos() * xe + gmst.sin() * ye,
        -gmst.sin() * xe + gmst.cos() * ye,
        ze,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn locate_brackets_ascending_and_descending() {
        let up = [0.0, 1.0, 2.0, 4.0, 8.0];
        assert_eq!(locate(&up, -1.0), 0);
        assert_eq!(locate(&up, 0.5), 0);
        assert_eq!(locate(&up, 3.0), 2);
        assert_eq!(locate(&up, 100.0), 3);

        let down = [8.0, 4.0, 2.0, 1.0, 0.0];
        assert_eq!(locate(&down, 100.0), 0);
        assert_eq!(locate(&down, 3.0), 1);
        assert_eq!(locate(&down, -1.0), 3);
    }

    #[test]
    fn lin_interpolates_and_extrapolates() {
        assert_abs_diff_eq!(lin(0.0, 0.0, 2.0, 4.0, 1.0), 2.0);
        assert_abs_diff_eq!(lin(0.0, 0.0, 2.0, 4.0, 3.0), 6.0);
    }

    #[test]
    fn exp_interp_matches_exponential_profile() {
        // p(z) = 1000 exp(-z/7)
        let p = |z: f64| 1000.0 * (-z / 7.0).exp();
        let got = exp_interp(0.0, p(0.0), 10.0, p(10.0), 4.0);
        assert_abs_diff_eq!(got, p(4.0), epsilon = 1e-9);
    }

    #[test]
    fn geo_cart_round_trip() {
        let x = geo2cart(12.5, -33.0, 47.0);
        let (z, lon, lat) = cart2geo(&x);
        assert_abs_diff_eq!(z, 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(lon, -33.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lat, 47.0, epsilon = 1e-9);
    }

    #[test]
    fn sun_direction_is_a_unit_vector_near_the_equatorial_plane() {
        // 2000-03-20 (equinox): declination within a degree of zero.
        let t = 79.0 * 86400.0;
        let s = sun_direction(t);
        assert_abs_diff_eq!(s.norm(), 1.0, epsilon = 1e-12);
        assert!(s[2].abs() < 0.03);
    }
}
