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
use anyhow::{ensure, Result};
use atmos::{
    constants::NFOV,
    control::Control,
    math::{lin, locate},
    Observations, Shape,
};

/// Convolve the pencil-beam results with the instrument field of view.
///
/// For each ray, the rays of the same scan (same timestamp, within `NFOV`
/// index positions) form an altitude profile of radiance and transmittance;
/// the profile is sampled at the tangent altitude offsets of the FOV shape
/// and averaged with the shape weights. Reads come from a snapshot taken
/// before the pass, so the convolution is order-independent.
pub fn convolve(ctl: &Control, shape: &Shape, obs: &mut Observations) -> Result<()> {
    let rad2 = obs.rad.clone();
    let tau2 = obs.tau.clone();

    for ir in 0..obs.nr() {
        let lo = ir.saturating_sub(NFOV);
        let hi = (ir + 1 + NFOV).min(obs.nr());
        let mut z = Vec::with_capacity(hi - lo);
        let mut rays = Vec::with_capacity(hi - lo);
        for ir2 in lo..hi {
            if obs.time[ir2] == obs.time[ir] {
                z.push(obs.vpz[ir2]);
                rays.push(ir2);
            }
        }
        ensure!(
            z.len() >= 2,
            "cannot apply FOV convolution: ray {} has no scan neighbours",
            ir
        );

        let mut acc_rad = vec![0.0; ctl.nd];
        let mut acc_tau = vec![0.0; ctl.nd];
        let mut wsum = 0.0;
        for (&dz, &w) in shape.x.iter().zip(&shape.y) {
            let zfov = obs.vpz[ir] + dz;
            let i = locate(&z, zfov);
            for id in 0..ctl.nd {
                acc_rad[id] += w * lin(
                    z[i],
                    rad2[id][rays[i]],
                    z[i + 1],
                    rad2[id][rays[i + 1]],
                    zfov,
                );
                acc_tau[id] += w * lin(
                    z[i],
                    tau2[id][rays[i]],
                    z[i + 1],
                    tau2[id][rays[i + 1]],
                    zfov,
                );
            }
            wsum += w;
        }
        for id in 0..ctl.nd {
            obs.rad[id][ir] = acc_rad[id] / wsum;
            obs.tau[id][ir] = acc_tau[id] / wsum;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use atmos::control::ControlFile;

    fn test_ctl() -> Control {
        let cf = ControlFile::from_text("ND = 1\nNU[0] = 792\n");
        Control::from_control_file(&cf).unwrap()
    }

    fn scan(ctl: &Control, n: usize) -> Observations {
        let mut obs = Observations::new(ctl.nd);
        for i in 0..n {
            let vpz = 10.0 + 2.0 * i as f64;
            // Radiance linear in tangent altitude.
            obs.push_ray(0.0, 600.0, 0.0, 0.0, vpz, 0.0, 0.0, &[1e-4 * vpz], &[1.0]);
        }
        obs
    }

    #[test]
    fn symmetric_fov_preserves_a_linear_profile() {
        let ctl = test_ctl();
        let mut obs = scan(&ctl, 7);
        let shape = Shape {
            x: vec![-1.0, 0.0, 1.0],
            y: vec![0.25, 0.5, 0.25],
        };
        convolve(&ctl, &shape, &mut obs).unwrap();
        // Interior rays: symmetric weights on a linear profile change nothing.
        for ir in 1..6 {
            let vpz = 10.0 + 2.0 * ir as f64;
            assert_relative_eq!(obs.rad[0][ir], 1e-4 * vpz, max_relative = 1e-12);
            assert_relative_eq!(obs.tau[0][ir], 1.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn a_lonely_ray_is_an_error() {
        let ctl = test_ctl();
        let mut obs = Observations::new(ctl.nd);
        obs.push_ray(0.0, 600.0, 0.0, 0.0, 10.0, 0.0, 0.0, &[1e-4], &[1.0]);
        obs.push_ray(60.0, 600.0, 0.0, 0.0, 12.0, 0.0, 0.0, &[1e-4], &[1.0]);
        let shape = Shape {
            x: vec![0.0],
            y: vec![1.0],
        };
        assert!(convolve(&ctl, &shape, &mut obs).is_err());
    }
}
