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

// The forward model: given an atmospheric state and observation geometry,
// compute the radiances a spectrometer would measure. Pencil beams run in
// parallel on a work-stealing pool; the tables they share live in an
// explicitly-constructed, immutable ForwardContext.

pub mod continuum;
mod fov;
mod pencil;
mod planck;
mod scatter;

pub use pencil::{formod_pencil, PencilBeam};
pub use planck::{brightness, planck, SourceTable};
pub use scatter::source_scatter;

use anyhow::{Context, Result};
use atmos::{control::Control, hydrostatic, Aerosol, Atmosphere, Observations, Shape};
use egt::TableSet;
use rayon::prelude::*;

/// Everything the forward model reads but never writes: emissivity tables,
/// the Planck source table, and the FOV shape. Built once per run, before
/// any pencil beam is computed, and shared by reference across rays.
pub struct ForwardContext {
    pub tables: TableSet,
    pub source: SourceTable,
    pub fov: Option<Shape>,
}

impl ForwardContext {
    pub fn new(ctl: &Control) -> Result<Self> {
        let tables = TableSet::load(ctl).context("loading emissivity tables")?;
        let source = SourceTable::load(ctl).context("loading filter functions")?;
        let fov = match &ctl.fov {
            Some(path) => Some(Shape::from_file(path).context("loading FOV shape")?),
            None => None,
        };
        Ok(Self {
            tables,
            source,
            fov,
        })
    }

    pub fn from_parts(tables: TableSet, source: SourceTable, fov: Option<Shape>) -> Self {
        Self {
            tables,
            source,
            fov,
        }
    }
}

/// Run the forward model: overwrite `obs.rad` and `obs.tau` for every
/// (channel, ray). Input NaN radiances mark masked samples and are restored
/// on return. Rebalances the atmosphere hydrostatically first when enabled.
pub fn formod(
    ctx: &ForwardContext,
    ctl: &Control,
    atm: &mut Atmosphere,
    obs: &mut Observations,
    aero: &Aerosol,
) -> Result<()> {
    let mask: Vec<Vec<bool>> = obs
        .rad
        .iter()
        .map(|col| col.iter().map(|r| !r.is_finite()).collect())
        .collect();

    hydrostatic(ctl, atm);

    // Rays are independent; gather per-ray results and write back in order.
    let atm_ro: &Atmosphere = atm;
    let obs_ro: &Observations = obs;
    let beams = (0..obs_ro.nr())
        .into_par_iter()
        .map(|ir| formod_pencil(ctx, ctl, atm_ro, obs_ro, aero, ctl.sca_mult, ir))
        .collect::<Result<Vec<_>>>()?;
    for (ir, beam) in beams.iter().enumerate() {
        for id in 0..ctl.nd {
            obs.rad[id][ir] = beam.rad[id];
            obs.tau[id][ir] = beam.tau[id];
        }
    }

    if let Some(shape) = &ctx.fov {
        fov::convolve(ctl, shape, obs)?;
    }

    if ctl.write_bbt {
        for (id, col) in obs.rad.iter_mut().enumerate() {
            for rad in col.iter_mut() {
                *rad = brightness(*rad, ctl.nu[id]);
            }
        }
    }

    for (mcol, col) in mask.iter().zip(obs.rad.iter_mut()) {
        for (&masked, rad) in mcol.iter().zip(col.iter_mut()) {
            if masked {
                *rad = f64::NAN;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use atmos::constants::RE;
    use atmos::control::{ControlFile, ExtinctionBasis};
    use egt::GasTable;
    use raypath::raytrace;

    const SIGMA: f64 = 3e-21;

    fn slab_ctl() -> Control {
        let cf = ControlFile::from_text(
            "NG = 1\nEMITTER[0] = TEST\nND = 1\nNU[0] = 792\nNW = 0\n\
             CTM_CO2 = 0\nCTM_H2O = 0\nCTM_N2 = 0\nCTM_O2 = 0\n\
             RAYDS = 10\nRAYDZ = 0.5\n",
        );
        Control::from_control_file(&cf).unwrap()
    }

    fn beer_cell(sigma: f64, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut u = Vec::with_capacity(n);
        let mut eps = Vec::with_capacity(n);
        for i in 0..n {
            let uu = 10f64.powf(13.0 + 9.0 * i as f64 / (n - 1) as f64);
            u.push(uu as f32);
            eps.push((1.0 - (-sigma * uu).exp()) as f32);
        }
        (u, eps)
    }

    fn beer_context(ctl: &Control, sigma: f64) -> ForwardContext {
        let p = vec![1e-3, 1e4];
        let t = vec![vec![150.0, 350.0], vec![150.0, 350.0]];
        let cells = vec![
            vec![beer_cell(sigma, 500), beer_cell(sigma, 500)],
            vec![beer_cell(sigma, 500), beer_cell(sigma, 500)],
        ];
        let tables =
            TableSet::from_tables(vec![vec![GasTable::from_parts(p, t, cells).unwrap()]]);
        let filters: Vec<Shape> = ctl
            .nu
            .iter()
            .map(|&nu| Shape {
                x: vec![nu],
                y: vec![1.0],
            })
            .collect();
        ForwardContext::from_parts(tables, SourceTable::from_shapes(&filters), None)
    }

    /// 10-km slab, uniform temperature and mixing ratio.
    fn slab_atm(ctl: &Control, t_bottom: f64, t_above: f64) -> Atmosphere {
        let mut atm = Atmosphere::new(ctl.ng, ctl.nw);
        for iz in 0..11 {
            let z = iz as f64;
            let t = if iz == 0 { t_bottom } else { t_above };
            atm.push_point(0.0, z, 0.0, 0.0, 1013.25 * (-z / 7.0).exp(), t, &[1e-6], &[]);
        }
        atm
    }

    fn limb_ray(ctl: &Control, tangent_z: f64) -> Observations {
        let mut obs = Observations::new(ctl.nd);
        let theta = ((RE + tangent_z) / (RE + 600.0)).acos().to_degrees();
        obs.push_ray(0.0, 600.0, 0.0, 0.0, tangent_z, theta, 0.0, &[0.0], &[1.0]);
        obs
    }

    fn total_column(ctl: &Control, atm: &Atmosphere, obs: &Observations) -> f64 {
        let los = raytrace(ctl, atm, obs, &Aerosol::empty(), 0).unwrap();
        los.u.iter().map(|u| u[0]).sum()
    }

    #[test]
    fn isothermal_slab_follows_beer_lambert() {
        let ctl = slab_ctl();
        let ctx = beer_context(&ctl, SIGMA);
        let mut atm = slab_atm(&ctl, 250.0, 250.0);
        let mut obs = limb_ray(&ctl, 5.0);

        let u_total = total_column(&ctl, &atm, &obs);
        formod(&ctx, &ctl, &mut atm, &mut obs, &Aerosol::empty()).unwrap();

        let tau = obs.tau[0][0];
        assert_relative_eq!(tau, (-SIGMA * u_total).exp(), max_relative = 2e-2);

        // Isothermal emission telescopes exactly to B * (1 - tau).
        let b = planck(250.0, ctl.nu[0]);
        assert_relative_eq!(obs.rad[0][0], b * (1.0 - tau), max_relative = 1e-10);
    }

    #[test]
    fn cold_space_ray_keeps_zero_radiance_and_unit_transmittance() {
        let ctl = slab_ctl();
        let ctx = beer_context(&ctl, SIGMA);
        let mut atm = slab_atm(&ctl, 250.0, 250.0);
        let mut obs = Observations::new(ctl.nd);
        obs.push_ray(0.0, 600.0, 0.0, 0.0, 700.0, 0.0, 0.0, &[0.0], &[1.0]);

        formod(&ctx, &ctl, &mut atm, &mut obs, &Aerosol::empty()).unwrap();
        assert_abs_diff_eq!(obs.rad[0][0], 0.0);
        assert_abs_diff_eq!(obs.tau[0][0], 1.0);
    }

    #[test]
    fn surface_emission_dominates_a_thin_atmosphere() {
        let ctl = slab_ctl();
        let sigma = 5e-22;
        let ctx = beer_context(&ctl, sigma);
        let mut atm = slab_atm(&ctl, 290.0, 250.0);
        let mut obs = Observations::new(ctl.nd);
        obs.push_ray(0.0, 600.0, 0.0, 0.0, 0.0, 0.0, 0.0, &[0.0], &[1.0]);

        formod(&ctx, &ctl, &mut atm, &mut obs, &Aerosol::empty()).unwrap();
        let tau = obs.tau[0][0];
        assert!(tau > 0.9, "expected a thin atmosphere, tau = {}", tau);
        let expect =
            planck(290.0, ctl.nu[0]) * tau + planck(250.0, ctl.nu[0]) * (1.0 - tau);
        assert_relative_eq!(obs.rad[0][0], expect, max_relative = 5e-2);
    }

    #[test]
    fn scattering_flag_is_a_no_op_without_aerosol() {
        let base = slab_ctl();
        let ctx = beer_context(&base, SIGMA);

        let mut ctl_off = base.clone();
        ctl_off.sca_mult = 0;
        let mut ctl_on = base.clone();
        ctl_on.sca_mult = 1;

        let mut atm0 = slab_atm(&base, 250.0, 250.0);
        let mut obs0 = limb_ray(&base, 5.0);
        formod(&ctx, &ctl_off, &mut atm0, &mut obs0, &Aerosol::empty()).unwrap();

        let mut atm1 = slab_atm(&base, 250.0, 250.0);
        let mut obs1 = limb_ray(&base, 5.0);
        formod(&ctx, &ctl_on, &mut atm1, &mut obs1, &Aerosol::empty()).unwrap();

        assert_eq!(obs0.rad[0][0].to_bits(), obs1.rad[0][0].to_bits());
        assert_eq!(obs0.tau[0][0].to_bits(), obs1.tau[0][0].to_bits());
    }

    #[test]
    fn input_nan_mask_survives_the_forward_model() {
        let ctl = slab_ctl();
        let ctx = beer_context(&ctl, SIGMA);
        let mut atm = slab_atm(&ctl, 250.0, 250.0);

        let mut obs = limb_ray(&ctl, 5.0);
        let second = limb_ray(&ctl, 7.0);
        obs.push_ray(
            second.time[0],
            second.obsz[0],
            second.obslon[0],
            second.obslat[0],
            second.vpz[0],
            second.vplon[0],
            second.vplat[0],
            &[0.0],
            &[1.0],
        );
        obs.rad[0][0] = f64::NAN; // masked sample
        formod(&ctx, &ctl, &mut atm, &mut obs, &Aerosol::empty()).unwrap();

        assert!(obs.rad[0][0].is_nan());
        assert!(obs.rad[0][1].is_finite());
        assert!(obs.rad[0][1] > 0.0);
        // Transmittances are computed regardless of the mask.
        assert!(obs.tau[0][0] > 0.0 && obs.tau[0][0] <= 1.0);
    }

    #[test]
    fn brightness_temperature_output_matches_the_radiance_run() {
        let base = slab_ctl();
        let ctx = beer_context(&base, SIGMA);

        let mut atm0 = slab_atm(&base, 250.0, 250.0);
        let mut obs0 = limb_ray(&base, 5.0);
        formod(&ctx, &base, &mut atm0, &mut obs0, &Aerosol::empty()).unwrap();

        let mut ctl_bbt = base.clone();
        ctl_bbt.write_bbt = true;
        let mut atm1 = slab_atm(&base, 250.0, 250.0);
        let mut obs1 = limb_ray(&base, 5.0);
        formod(&ctx, &ctl_bbt, &mut atm1, &mut obs1, &Aerosol::empty()).unwrap();

        assert_relative_eq!(
            obs1.rad[0][0],
            brightness(obs0.rad[0][0], base.nu[0]),
            max_relative = 1e-12
        );
        // An optically thin isothermal slab is colder than its gas.
        assert!(obs1.rad[0][0] < 250.0);
    }

    #[test]
    fn without_fov_the_driver_equals_the_pencil_results() {
        let ctl = slab_ctl();
        let ctx = beer_context(&ctl, SIGMA);
        let mut atm = slab_atm(&ctl, 250.0, 250.0);

        let mut obs = limb_ray(&ctl, 4.0);
        let more = limb_ray(&ctl, 8.0);
        obs.push_ray(
            more.time[0],
            more.obsz[0],
            more.obslon[0],
            more.obslat[0],
            more.vpz[0],
            more.vplon[0],
            more.vplat[0],
            &[0.0],
            &[1.0],
        );

        let mut driven = obs.clone();
        formod(&ctx, &ctl, &mut atm, &mut driven, &Aerosol::empty()).unwrap();
        for ir in 0..obs.nr() {
            let beam =
                formod_pencil(&ctx, &ctl, &atm, &obs, &Aerosol::empty(), ctl.sca_mult, ir)
                    .unwrap();
            assert_eq!(driven.rad[0][ir].to_bits(), beam.rad[0].to_bits());
            assert_eq!(driven.tau[0][ir].to_bits(), beam.tau[0].to_bits());
        }
    }

    #[test]
    fn extinction_basis_beta_a_key_attenuates_with_the_full_extinction() {
        // An absorption-free layer separates the two bases: under
        // ExtinctionBasis::Extinction (control key "beta_a") the beam is
        // attenuated with beta_e, under Absorption with beta_a alone.
        let aero = Aerosol {
            layers: vec![atmos::AerosolLayer {
                bottom: 3.0,
                top: 8.0,
                transition: 0.5,
                beta_e: vec![1e-2],
                beta_a: vec![0.0],
                beta_s: vec![0.0],
                g: vec![0.0],
            }],
        };

        let mut ctl_ext = slab_ctl();
        ctl_ext.sca_n = 1;
        ctl_ext.sca_mult = 0;
        ctl_ext.sca_ext = ExtinctionBasis::Extinction;
        let mut ctl_abs = ctl_ext.clone();
        ctl_abs.sca_ext = ExtinctionBasis::Absorption;

        let ctx = beer_context(&ctl_ext, SIGMA);
        let mut atm = slab_atm(&ctl_ext, 250.0, 250.0);

        let mut with_ext = limb_ray(&ctl_ext, 5.0);
        formod(&ctx, &ctl_ext, &mut atm, &mut with_ext, &aero).unwrap();
        let mut with_abs = limb_ray(&ctl_abs, 5.0);
        formod(&ctx, &ctl_abs, &mut atm, &mut with_abs, &aero).unwrap();
        let mut clear = limb_ray(&ctl_abs, 5.0);
        formod(&ctx, &ctl_abs, &mut atm, &mut clear, &Aerosol::empty()).unwrap();

        assert!(with_ext.tau[0][0] < with_abs.tau[0][0]);
        // With beta_a = 0 the absorption basis reduces to the clear-sky path.
        assert_eq!(with_abs.tau[0][0].to_bits(), clear.tau[0][0].to_bits());
        assert_eq!(with_abs.rad[0][0].to_bits(), clear.rad[0][0].to_bits());
    }

    #[test]
    fn an_aerosol_layer_dims_the_beam_and_scattering_adds_source() {
        let ctl = slab_ctl();
        let ctx = beer_context(&ctl, SIGMA);
        let aero = Aerosol {
            layers: vec![atmos::AerosolLayer {
                bottom: 3.0,
                top: 8.0,
                transition: 0.5,
                beta_e: vec![5e-3],
                beta_a: vec![4e-3],
                beta_s: vec![1e-3],
                g: vec![0.7],
            }],
        };

        let mut atm = slab_atm(&ctl, 250.0, 250.0);
        let mut clear = limb_ray(&ctl, 5.0);
        formod(&ctx, &ctl, &mut atm, &mut clear, &Aerosol::empty()).unwrap();

        let mut cloudy = limb_ray(&ctl, 5.0);
        formod(&ctx, &ctl, &mut atm, &mut cloudy, &aero).unwrap();

        assert!(cloudy.tau[0][0] < clear.tau[0][0]);
        assert!(cloudy.rad[0][0].is_finite() && cloudy.rad[0][0] > 0.0);
    }
}
