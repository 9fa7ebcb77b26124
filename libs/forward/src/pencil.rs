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
use crate::{continuum::continua, scatter::source_scatter, ForwardContext};
use anyhow::Result;
use atmos::{
    control::{Control, ExtinctionBasis},
    math::geo2cart,
    Aerosol, Atmosphere, Observations,
};
use egt::PathTransmittance;
use raypath::raytrace;

/// Radiance and transmittance of one pencil beam, per channel.
#[derive(Debug, Clone)]
pub struct PencilBeam {
    pub rad: Vec<f64>,
    pub tau: Vec<f64>,
}

/// Integrate radiative transfer along ray `ir`: raytrace, then accumulate
/// emission and attenuation segment by segment from the observer outward,
/// and finally add surface emission if the path ends on the ground.
pub fn formod_pencil(
    ctx: &ForwardContext,
    ctl: &Control,
    atm: &Atmosphere,
    obs: &Observations,
    aero: &Aerosol,
    scattering: u32,
    ir: usize,
) -> Result<PencilBeam> {
    let mut rad = vec![0.0; ctl.nd];
    let mut tau = vec![1.0; ctl.nd];

    let los = raytrace(ctl, atm, obs, aero, ir)?;

    let mut state = PathTransmittance::new(ctl.ng, ctl.nd);
    let mut tau_seg = vec![0.0; ctl.nd];
    let mut beta_ctm = vec![0.0; ctl.nd];
    let mut src_planck = vec![0.0; ctl.nd];
    let mut src_sca = vec![0.0; ctl.nd];

    for ip in 0..los.np() {
        state.segment(&ctx.tables, los.p[ip], los.t[ip], &los.u[ip], &mut tau_seg);
        continua(ctl, &los, ip, &mut beta_ctm);
        ctx.source.sample(los.t[ip], &mut src_planck);

        let af = los.aerofac[ip];
        let ds = los.ds[ip];

        if af > 0.0 && scattering > 0 {
            let layer = &aero.layers[los.aeroi[ip]];

            // Local propagation direction from the neighbouring path points.
            let ip0 = ip.saturating_sub(1);
            let ip1 = (ip + 1).min(los.np() - 1);
            let x0 = geo2cart(los.z[ip0], los.lon[ip0], los.lat[ip0]);
            let x1 = geo2cart(los.z[ip1], los.lon[ip1], los.lat[ip1]);
            source_scatter(ctl, layer, obs.time[ir], &(x1 - x0), &mut src_sca);

            for id in 0..ctl.nd {
                if tau_seg[id] > 0.0 {
                    let beta_ext =
                        -tau_seg[id].ln() / ds + beta_ctm[id] + af * layer.beta_e[id];
                    let eps =
                        1.0 - tau_seg[id] * (-(beta_ctm[id] + af * layer.beta_a[id]) * ds).exp();
                    rad[id] += tau[id] * (eps * src_planck[id] + layer.beta_s[id] * src_sca[id]);
                    tau[id] *= (-beta_ext * ds).exp();
                }
            }
        } else {
            for id in 0..ctl.nd {
                if tau_seg[id] > 0.0 {
                    let (beta_a, beta_e) = if af > 0.0 {
                        let layer = &aero.layers[los.aeroi[ip]];
                        (layer.beta_a[id], layer.beta_e[id])
                    } else {
                        (0.0, 0.0)
                    };

                    if ctl.sca_n == 0 {
                        let eps = 1.0 - tau_seg[id] * (-beta_ctm[id] * ds).exp();
                        rad[id] += src_planck[id] * eps * tau[id];
                        tau[id] *= 1.0 - eps;
                    } else if ctl.sca_ext == ExtinctionBasis::Absorption {
                        let eps =
                            1.0 - tau_seg[id] * (-(beta_ctm[id] + af * beta_a) * ds).exp();
                        rad[id] += src_planck[id] * eps * tau[id];
                        tau[id] *= (1.0 - eps) * (-af * beta_a * ds).exp();
                    } else {
                        let eps =
                            1.0 - tau_seg[id] * (-(beta_ctm[id] + af * beta_e) * ds).exp();
                        rad[id] += src_planck[id] * eps * tau[id];
                        tau[id] *= (1.0 - eps) * (-af * beta_e * ds).exp();
                    }
                }
            }
        }
    }

    if los.tsurf > 0.0 {
        ctx.source.sample(los.tsurf, &mut src_planck);
        for id in 0..ctl.nd {
            rad[id] += src_planck[id] * tau[id];
        }
    }

    Ok(PencilBeam { rad, tau })
}
