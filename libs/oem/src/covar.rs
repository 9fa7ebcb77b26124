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
use crate::pack::{Quantity, StateMap};
use anyhow::Result;
use atmos::{
    control::{Control, ControlFile},
    math::geo2cart,
    Atmosphere, Observations,
};
use nalgebra::{DMatrix, DVector};

/// Retrieval tuning read from the control file: iteration limits, residual
/// filtering, and the per-quantity a-priori error model.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Recompute the kernel every this many outer iterations.
    pub kernel_recomp: usize,
    pub conv_itmax: usize,
    pub conv_dmin: f64,
    /// Radiance residual threshold [%]; non-positive disables filtering.
    pub resmax: f64,
    pub err_ana: bool,
    /// Forward model error [%] per channel.
    pub err_formod: Vec<f64>,
    /// Noise error [W/(m^2 sr cm^-1)] per channel.
    pub err_noise: Vec<f64>,
    /// Pressure error [%] and its correlation lengths [km].
    pub err_press: f64,
    pub err_press_cz: f64,
    pub err_press_ch: f64,
    /// Temperature error [K] and its correlation lengths [km].
    pub err_temp: f64,
    pub err_temp_cz: f64,
    pub err_temp_ch: f64,
    /// Mixing ratio errors [%] and correlation lengths [km], per gas.
    pub err_q: Vec<f64>,
    pub err_q_cz: Vec<f64>,
    pub err_q_ch: Vec<f64>,
    /// Extinction errors [1/km] and correlation lengths [km], per window.
    pub err_k: Vec<f64>,
    pub err_k_cz: Vec<f64>,
    pub err_k_ch: Vec<f64>,
}

impl RetrievalSettings {
    pub fn from_control_file(cf: &ControlFile, ctl: &Control) -> Result<Self> {
        let mut err_formod = Vec::with_capacity(ctl.nd);
        let mut err_noise = Vec::with_capacity(ctl.nd);
        for id in 0..ctl.nd {
            err_formod.push(cf.parse_indexed_or("ERR_FORMOD", id, 0.0)?);
            err_noise.push(cf.parse_indexed_or("ERR_NOISE", id, 0.0)?);
        }
        let mut err_q = Vec::with_capacity(ctl.ng);
        let mut err_q_cz = Vec::with_capacity(ctl.ng);
        let mut err_q_ch = Vec::with_capacity(ctl.ng);
        for ig in 0..ctl.ng {
            err_q.push(cf.parse_indexed_or("ERR_Q", ig, 0.0)?);
            err_q_cz.push(cf.parse_indexed_or("ERR_Q_CZ", ig, -999.0)?);
            err_q_ch.push(cf.parse_indexed_or("ERR_Q_CH", ig, -999.0)?);
        }
        let mut err_k = Vec::with_capacity(ctl.nw);
        let mut err_k_cz = Vec::with_capacity(ctl.nw);
        let mut err_k_ch = Vec::with_capacity(ctl.nw);
        for iw in 0..ctl.nw {
            err_k.push(cf.parse_indexed_or("ERR_K", iw, 0.0)?);
            err_k_cz.push(cf.parse_indexed_or("ERR_K_CZ", iw, -999.0)?);
            err_k_ch.push(cf.parse_indexed_or("ERR_K_CH", iw, -999.0)?);
        }
        Ok(Self {
            kernel_recomp: cf.parse_or("KERNEL_RECOMP", 1usize)?.max(1),
            conv_itmax: cf.parse_or("CONV_ITMAX", 20usize)?,
            conv_dmin: cf.parse_or("CONV_DMIN", 0.1)?,
            resmax: cf.parse_or("RESMAX", -999.0)?,
            err_ana: cf.parse_or("ERR_ANA", 1i64)? != 0,
            err_formod,
            err_noise,
            err_press: cf.parse_or("ERR_PRESS", 0.0)?,
            err_press_cz: cf.parse_or("ERR_PRESS_CZ", -999.0)?,
            err_press_ch: cf.parse_or("ERR_PRESS_CH", -999.0)?,
            err_temp: cf.parse_or("ERR_TEMP", 0.0)?,
            err_temp_cz: cf.parse_or("ERR_TEMP_CZ", -999.0)?,
            err_temp_ch: cf.parse_or("ERR_TEMP_CH", -999.0)?,
            err_q,
            err_q_cz,
            err_q_ch,
            err_k,
            err_k_cz,
            err_k_ch,
        })
    }

    fn sigma(&self, q: Quantity, x_a: f64) -> f64 {
        match q {
            Quantity::Pressure => self.err_press / 100.0 * x_a,
            Quantity::Temperature => self.err_temp,
            Quantity::Gas(ig) => self.err_q[ig] / 100.0 * x_a,
            Quantity::Window(iw) => self.err_k[iw],
        }
    }

    fn correlation_lengths(&self, q: Quantity) -> (f64, f64) {
        match q {
            Quantity::Pressure => (self.err_press_cz, self.err_press_ch),
            Quantity::Temperature => (self.err_temp_cz, self.err_temp_ch),
            Quantity::Gas(ig) => (self.err_q_cz[ig], self.err_q_ch[ig]),
            Quantity::Window(iw) => (self.err_k_cz[iw], self.err_k_ch[iw]),
        }
    }
}

// Correlation between two grid points: exponential decay with horizontal
// chord distance and vertical separation.
fn correlation(
    z0: f64,
    lon0: f64,
    lat0: f64,
    z1: f64,
    lon1: f64,
    lat1: f64,
    cz: f64,
    ch: f64,
) -> f64 {
    let x0 = geo2cart(0.0, lon0, lat0);
    let x1 = geo2cart(0.0, lon1, lat1);
    (-(x1 - x0).norm() / ch - (z0 - z1).abs() / cz).exp()
}

/// A-priori covariance: per-quantity variances on the diagonal,
/// exponentially-decaying spatial correlation within each quantity when the
/// correlation lengths are configured.
pub fn apriori_covariance(
    set: &RetrievalSettings,
    atm: &Atmosphere,
    x_a: &DVector<f64>,
    map: &StateMap,
) -> DMatrix<f64> {
    let n = map.len();
    let sig: Vec<f64> = (0..n).map(|i| set.sigma(map.iqa[i], x_a[i])).collect();

    let mut s_a = DMatrix::zeros(n, n);
    for i in 0..n {
        s_a[(i, i)] = sig[i] * sig[i];
    }
    for i in 0..n {
        for j in 0..n {
            if i == j || map.iqa[i] != map.iqa[j] {
                continue;
            }
            let (cz, ch) = set.correlation_lengths(map.iqa[i]);
            if cz > 0.0 && ch > 0.0 {
                let (pi, pj) = (map.ipa[i], map.ipa[j]);
                s_a[(i, j)] = sig[i]
                    * sig[j]
                    * correlation(
                        atm.z[pi],
                        atm.lon[pi],
                        atm.lat[pi],
                        atm.z[pj],
                        atm.lon[pj],
                        atm.lat[pj],
                        cz,
                        ch,
                    );
            }
        }
    }
    s_a
}

/// Diagonal measurement errors aligned with the measurement vector: noise,
/// forward-model error, and the combined inverse standard deviation.
pub fn measurement_errors(
    set: &RetrievalSettings,
    ctl: &Control,
    obs: &Observations,
) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
    let mut noise = Vec::new();
    let mut formod_err = Vec::new();
    for ir in 0..obs.nr() {
        for id in 0..ctl.nd {
            let rad = obs.rad[id][ir];
            if rad.is_finite() {
                noise.push(set.err_noise[id]);
                formod_err.push((set.err_formod[id] / 100.0 * rad).abs());
            }
        }
    }
    let eps_inv: Vec<f64> = noise
        .iter()
        .zip(&formod_err)
        .map(|(&sn, &sf)| 1.0 / (sn * sn + sf * sf).sqrt())
        .collect();
    (
        DVector::from_vec(noise),
        DVector::from_vec(formod_err),
        DVector::from_vec(eps_inv),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::atm2x;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::Cholesky;

    fn setup() -> (Control, RetrievalSettings, Atmosphere) {
        let cf = ControlFile::from_text(
            "NG = 1\nEMITTER[0] = CO2\nND = 1\nNU[0] = 792\nNW = 0\n\
             RETT_ZMIN = 0\nRETT_ZMAX = 40\n\
             ERR_TEMP = 2\nERR_TEMP_CZ = 5\nERR_TEMP_CH = 100\n\
             ERR_NOISE[0] = 1e-5\nERR_FORMOD[0] = 10\n",
        );
        let ctl = Control::from_control_file(&cf).unwrap();
        let set = RetrievalSettings::from_control_file(&cf, &ctl).unwrap();
        let mut atm = Atmosphere::new(ctl.ng, ctl.nw);
        for iz in 0..5 {
            let z = 10.0 * iz as f64;
            atm.push_point(0.0, z, 0.0, 0.0, 1013.25 * (-z / 7.0).exp(), 250.0, &[3.7e-4], &[]);
        }
        (ctl, set, atm)
    }

    #[test]
    fn apriori_covariance_is_spd_with_decaying_correlation()
    {
        let (ctl, set, atm) = setup();
        let (x_a, map) = atm2x(&ctl, &atm);
        let s_a = apriori_covariance(&set, &atm, &x_a, &map);

        assert_abs_diff_eq!(s_a[(0, 0)], 4.0);
        // Same column, 10 km apart vertically: exp(-2) decay.
        assert_relative_eq!(s_a[(0, 1)], 4.0 * (-2.0f64).exp(), max_relative = 1e-9);
        assert_relative_eq!(s_a[(0, 1)], s_a[(1, 0)], max_relative = 1e-12);
        assert!(s_a[(0, 4)] < s_a[(0, 1)]);
        assert!(Cholesky::new(s_a).is_some());
    }

    #[test]
    fn measurement_errors_combine_noise_and_forward_model_terms() {
        let (ctl, set, _) = setup();
        let mut obs = Observations::new(ctl.nd);
        obs.push_ray(0.0, 600.0, 0.0, 0.0, 10.0, 0.0, 0.0, &[2e-4], &[1.0]);
        obs.push_ray(0.0, 600.0, 0.0, 0.0, 20.0, 0.0, 0.0, &[f64::NAN], &[1.0]);
        let (noise, formod_err, eps_inv) = measurement_errors(&set, &ctl, &obs);
        assert_eq!(noise.len(), 1);
        assert_abs_diff_eq!(noise[0], 1e-5);
        assert_abs_diff_eq!(formod_err[0], 2e-5);
        assert_relative_eq!(
            eps_inv[0],
            1.0 / (1e-10f64 + 4e-10).sqrt(),
            max_relative = 1e-12
        );
    }
}
