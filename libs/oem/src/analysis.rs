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

// Post-retrieval error budget: retrieval covariance, gain matrix, averaging
// kernels, and the per-quantity contribution and resolution diagnostics.

use crate::{
    matrix::{write_matrix, MatrixAxis, MatrixOrder},
    pack::{x2atm, Quantity, StateMap},
    retrieval::weighted_normal_matrix,
};
use anyhow::{Context, Result};
use atmos::{control::Control, Atmosphere, Observations};
use nalgebra::{Cholesky, DMatrix, DVector};
use std::path::Path;

// G diag(sig^2) G^T: scale the gain columns, then form the outer product.
fn weighted_outer(gain: &DMatrix<f64>, sig: &DVector<f64>) -> DMatrix<f64> {
    let mut gw = gain.clone();
    for i in 0..gw.nrows() {
        for j in 0..gw.ncols() {
            gw[(i, j)] *= sig[j];
        }
    }
    let gwt = gw.transpose();
    gw * gwt
}

fn quantity_field_mut(atm: &mut Atmosphere, q: Quantity) -> &mut Vec<f64> {
    match q {
        Quantity::Pressure => &mut atm.p,
        Quantity::Temperature => &mut atm.t,
        Quantity::Gas(ig) => &mut atm.q[ig],
        Quantity::Window(iw) => &mut atm.k[iw],
    }
}

// Map the square root of a covariance diagonal back onto the grid and write
// it as an atmosphere table.
fn write_stddev(
    quantity: &str,
    ctl: &Control,
    dir: &Path,
    atm: &Atmosphere,
    cov: &DMatrix<f64>,
) -> Result<()> {
    let n = cov.nrows();
    let x_aux = DVector::from_fn(n, |i, _| cov[(i, i)].max(0.0).sqrt());
    let mut atm_aux = atm.clone();
    atm_aux.clear_quantities();
    x2atm(ctl, &x_aux, &mut atm_aux);
    atm_aux.write(ctl, &dir.join(format!("err_{}.tab", quantity)))
}

// Contribution (averaging-kernel row sums within the quantity's sub-block)
// and resolution (inverse diagonal) per retrieval target, written as
// auxiliary atmospheres.
fn analyze_avk(
    ctl: &Control,
    dir: &Path,
    atm: &Atmosphere,
    map: &StateMap,
    avk: &DMatrix<f64>,
) -> Result<()> {
    let mut atm_cont = atm.clone();
    atm_cont.clear_quantities();
    let mut atm_res = atm.clone();
    atm_res.clear_quantities();

    let n = map.len();
    let mut i0 = 0;
    while i0 < n {
        let q = map.iqa[i0];
        let mut i1 = i0 + 1;
        while i1 < n && map.iqa[i1] == q {
            i1 += 1;
        }
        for i in i0..i1 {
            let ip = map.ipa[i];
            let cont: f64 = (i0..i1).map(|j| avk[(i, j)]).sum();
            quantity_field_mut(&mut atm_cont, q)[ip] += cont;
            quantity_field_mut(&mut atm_res, q)[ip] = 1.0 / avk[(i, i)];
        }
        i0 = i1;
    }

    atm_cont.write(ctl, &dir.join("atm_cont.tab"))?;
    atm_res.write(ctl, &dir.join("atm_res.tab"))
}

/// Full error analysis of a converged retrieval.
#[allow(clippy::too_many_arguments)]
pub fn error_analysis(
    ctl: &Control,
    dir: &Path,
    atm: &Atmosphere,
    obs: &Observations,
    k: &DMatrix<f64>,
    s_a_inv: &DMatrix<f64>,
    sig_eps_inv: &DVector<f64>,
    sig_noise: &DVector<f64>,
    sig_formod: &DVector<f64>,
    map: &StateMap,
) -> Result<()> {
    let n = map.len();
    let m = sig_eps_inv.len();

    // Retrieval covariance: (S_a^-1 + K^T S_eps^-1 K)^-1.
    let cov_inv = weighted_normal_matrix(k, sig_eps_inv) + s_a_inv;
    let cov = Cholesky::new(cov_inv)
        .context("retrieval covariance is not positive definite")?
        .inverse();
    write_matrix(
        dir,
        "matrix_cov_ret.tab",
        ctl,
        &cov,
        atm,
        obs,
        map,
        MatrixAxis::State,
        MatrixAxis::State,
        MatrixOrder::RowMajor,
    )?;
    write_stddev("total", ctl, dir, atm, &cov)?;

    // Gain: G = S K^T S_eps^-1.
    let mut auxnm = DMatrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            auxnm[(i, j)] = k[(j, i)] * sig_eps_inv[j] * sig_eps_inv[j];
        }
    }
    let gain = &cov * auxnm;
    write_matrix(
        dir,
        "matrix_gain.tab",
        ctl,
        &gain,
        atm,
        obs,
        map,
        MatrixAxis::State,
        MatrixAxis::Measurement,
        MatrixOrder::ColumnMajor,
    )?;

    // Error propagation through the gain.
    let noise_cov = weighted_outer(&gain, sig_noise);
    write_stddev("noise", ctl, dir, atm, &noise_cov)?;
    let formod_cov = weighted_outer(&gain, sig_formod);
    write_stddev("formod", ctl, dir, atm, &formod_cov)?;

    // Averaging kernel: A = G K.
    let avk = &gain * k;
    write_matrix(
        dir,
        "matrix_avk.tab",
        ctl,
        &avk,
        atm,
        obs,
        map,
        MatrixAxis::State,
        MatrixAxis::State,
        MatrixOrder::RowMajor,
    )?;
    analyze_avk(ctl, dir, atm, map, &avk)
}
