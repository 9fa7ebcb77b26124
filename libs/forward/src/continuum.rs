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

// Continuum extinction: gray aerosol/cloud window extinction carried on the
// grid plus compact band-envelope fits for the CO2, H2O, N2, and O2
// continua. The fits trade spectroscopic fidelity for closed form; they are
// real-valued, non-negative, and additive per the interface contract.

use atmos::control::Control;
use raypath::LineOfSight;

const P0: f64 = 1013.25;

/// Total continuum extinction [1/km] per channel for segment `ip`.
pub fn continua(ctl: &Control, los: &LineOfSight, ip: usize, beta: &mut [f64]) {
    debug_assert_eq!(beta.len(), ctl.nd);

    for (id, b) in beta.iter_mut().enumerate() {
        *b = if ctl.nw > 0 {
            los.k[ip][ctl.window[id]]
        } else {
            0.0
        };
    }

    if ctl.ctm_co2 {
        if let Some(ig) = ctl.ig_co2 {
            for (id, b) in beta.iter_mut().enumerate() {
                *b += ctm_co2(ctl.nu[id], los.p[ip], los.t[ip], los.u[ip][ig]) / los.ds[ip];
            }
        }
    }

    if ctl.ctm_h2o {
        if let Some(ig) = ctl.ig_h2o {
            for (id, b) in beta.iter_mut().enumerate() {
                *b += ctm_h2o(
                    ctl.nu[id],
                    los.p[ip],
                    los.t[ip],
                    los.q[ip][ig],
                    los.u[ip][ig],
                ) / los.ds[ip];
            }
        }
    }

    if ctl.ctm_n2 {
        for (id, b) in beta.iter_mut().enumerate() {
            *b += ctm_n2(ctl.nu[id], los.p[ip], los.t[ip]);
        }
    }

    if ctl.ctm_o2 {
        for (id, b) in beta.iter_mut().enumerate() {
            *b += ctm_o2(ctl.nu[id], los.p[ip], los.t[ip]);
        }
    }
}

/// CO2 far-wing continuum: optical depth of a segment with column density
/// `u` [molec/cm^2]. Exponential wings of the nu2 and nu3 band heads.
fn ctm_co2(nu: f64, p: f64, t: f64, u: f64) -> f64 {
    let wings = (-(nu - 667.4).abs() / 40.0).exp() + (-(nu - 2349.1).abs() / 33.0).exp();
    let sigma = 3.1e-24 * wings * (p / P0) * (296.0 / t).powf(1.7);
    sigma * u
}

/// H2O self and foreign continuum: optical depth of a segment with water
/// column density `u` [molec/cm^2] and mixing ratio `q`.
fn ctm_h2o(nu: f64, p: f64, t: f64, q: f64, u: f64) -> f64 {
    let pe = q * p;
    let theta = 296.0 / t;
    let envelope = (-nu / 540.0).exp();
    let c_self = 1.8e-23 * theta.powf(4.25) * (pe / P0);
    let c_foreign = 1.2e-25 * theta.powf(2.0) * ((p - pe).max(0.0) / P0);
    (c_self + c_foreign) * envelope * u
}

/// N2 collision-induced fundamental near 2330/cm: extinction [1/km].
fn ctm_n2(nu: f64, p: f64, t: f64) -> f64 {
    let x = (nu - 2330.0) / 80.0;
    1.1e-4 / (1.0 + x * x) * (p / P0).powi(2) * (273.0 / t).powi(2)
}

/// O2 collision-induced fundamental near 1556/cm: extinction [1/km].
fn ctm_o2(nu: f64, p: f64, t: f64) -> f64 {
    let x = (nu - 1556.0) / 60.0;
    6.0e-5 / (1.0 + x * x) * (p / P0).powi(2) * (273.0 / t).powi(2)
}
