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
use crate::planck::planck;
use atmos::{
    constants::{OMEGA_SUN, T_SUN},
    control::Control,
    math::sun_direction,
    AerosolLayer,
};
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Single-order solar scattering source [W/(m^2 sr cm^-1)] of an aerosol
/// layer, per channel. `dx` is the local propagation direction of the beam
/// (central difference of neighbouring path points). The incoming solar
/// path is taken as unattenuated.
pub fn source_scatter(
    ctl: &Control,
    layer: &AerosolLayer,
    time: f64,
    dx: &Vector3<f64>,
    src: &mut [f64],
) {
    debug_assert_eq!(src.len(), ctl.nd);
    let norm = dx.norm();
    if norm <= 0.0 {
        src.iter_mut().for_each(|s| *s = 0.0);
        return;
    }
    let sun = sun_direction(time);
    let cos_theta = (dx / norm).dot(&sun);

    for id in 0..ctl.nd {
        let g = layer.g[id];
        let phase =
            (1.0 - g * g) / (4.0 * PI * (1.0 + g * g - 2.0 * g * cos_theta).powf(1.5));
        src[id] = planck(T_SUN, ctl.nu[id]) * OMEGA_SUN * phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use atmos::control::ControlFile;

    fn test_layer(g: f64) -> AerosolLayer {
        AerosolLayer {
            bottom: 10.0,
            top: 14.0,
            transition: 0.0,
            beta_e: vec![1e-2],
            beta_a: vec![5e-3],
            beta_s: vec![5e-3],
            g: vec![g],
        }
    }

    #[test]
    fn isotropic_phase_integrates_out_of_the_source() {
        let cf = ControlFile::from_text("ND = 1\nNU[0] = 950\n");
        let ctl = Control::from_control_file(&cf).unwrap();
        let layer = test_layer(0.0);
        let mut src = [0.0];
        source_scatter(&ctl, &layer, 0.0, &Vector3::new(1.0, 0.0, 0.0), &mut src);
        let expect = planck(T_SUN, 950.0) * OMEGA_SUN / (4.0 * PI);
        assert_relative_eq!(src[0], expect, max_relative = 1e-12);
    }

    #[test]
    fn forward_peaked_phase_depends_on_the_beam_direction() {
        let cf = ControlFile::from_text("ND = 1\nNU[0] = 950\n");
        let ctl = Control::from_control_file(&cf).unwrap();
        let layer = test_layer(0.8);
        let sun = sun_direction(0.0);
        let mut toward = [0.0];
        let mut away = [0.0];
        source_scatter(&ctl, &layer, 0.0, &sun, &mut toward);
        source_scatter(&ctl, &layer, 0.0, &(-sun), &mut away);
        assert!(toward[0] > away[0]);
        assert!(away[0] > 0.0);
    }
}
