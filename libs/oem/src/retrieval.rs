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
use crate::{
    analysis::error_analysis,
    covar::{apriori_covariance, measurement_errors, RetrievalSettings},
    kernel::kernel,
    matrix::{write_matrix, MatrixAxis, MatrixOrder},
    pack::{atm2x, obs2y, x2atm},
};
use anyhow::{ensure, Context, Result};
use atmos::{control::Control, Aerosol, Atmosphere, Observations};
use forward::{formod, ForwardContext};
use log::{error, info};
use nalgebra::{Cholesky, DMatrix, DVector};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// K^T S_eps^-1 K: scale the kernel rows by the inverse sigmas, then form
/// the normal matrix.
pub(crate) fn weighted_normal_matrix(k: &DMatrix<f64>, sig_eps_inv: &DVector<f64>) -> DMatrix<f64> {
    let mut kw = k.clone();
    for i in 0..kw.nrows() {
        for j in 0..kw.ncols() {
            kw[(i, j)] *= sig_eps_inv[i];
        }
    }
    kw.transpose() * kw
}

// Normalized cost function; every evaluation is appended to costs.tab.
fn cost_function(
    out: &mut impl Write,
    it: usize,
    dx: &DVector<f64>,
    dy: &DVector<f64>,
    s_a_inv: &DMatrix<f64>,
    sig_eps_inv: &DVector<f64>,
) -> Result<f64> {
    let m = dy.len();
    let n = dx.len();

    let chisq_m = dy
        .iter()
        .zip(sig_eps_inv.iter())
        .map(|(&d, &s)| (d * s) * (d * s))
        .sum::<f64>()
        / m as f64;
    let chisq_a = dx.dot(&(s_a_inv * dx)) / m as f64;
    let chisq = chisq_m + chisq_a;

    info!(
        "it = {} / chi^2/m = {} (meas: {} / apr: {})",
        it, chisq, chisq_m, chisq_a
    );

    if it == 0 {
        writeln!(
            out,
            "# $1 = iteration number\n\
             # $2 = normalized cost function: total\n\
             # $3 = normalized cost function: measurements\n\
             # $4 = normalized cost function: a priori\n\
             # $5 = number of measurements\n\
             # $6 = number of state vector elements\n"
        )?;
    }
    writeln!(out, "{} {} {} {} {} {}", it, chisq, chisq_m, chisq_a, m, n)?;
    Ok(chisq)
}

// Clamp the tentative state into physical bounds after each step.
fn clamp_state(ctl: &Control, atm: &mut Atmosphere) {
    for ip in 0..atm.np() {
        atm.p[ip] = atm.p[ip].clamp(5e-7, 5e4);
        atm.t[ip] = atm.t[ip].clamp(100.0, 400.0);
        for ig in 0..ctl.ng {
            atm.q[ig][ip] = atm.q[ig][ip].clamp(0.0, 1.0);
        }
        for iw in 0..ctl.nw {
            atm.k[iw][ip] = atm.k[iw][ip].max(0.0);
        }
    }
}

/// Levenberg-Marquardt optimal estimation: fit the atmospheric state to the
/// measured radiances, starting from and regularized by the a-priori state.
/// Writes the result tables into `dir` and returns the fitted
/// (atmosphere, observations) pair.
pub fn optimal_estimation(
    set: &RetrievalSettings,
    ctl: &Control,
    ctx: &ForwardContext,
    dir: &Path,
    atm_apr: &Atmosphere,
    obs_meas: &Observations,
    aero: &Aerosol,
) -> Result<(Atmosphere, Observations)> {
    let (x_a, map) = atm2x(ctl, atm_apr);
    let n = map.len();
    let m = obs_meas.valid_measurements();
    ensure!(m > 0 && n > 0, "check problem definition (m = {}, n = {})", m, n);
    info!("Problem size: m = {} / n = {}", m, n);

    // Forward-model the a-priori state.
    let mut atm_i = atm_apr.clone();
    let mut obs_i = obs_meas.clone();
    formod(ctx, ctl, &mut atm_i, &mut obs_i, aero)?;

    let (mut x_i, _) = atm2x(ctl, &atm_i);
    let y_m = obs2y(ctl, obs_meas);
    let mut y_i = obs2y(ctl, &obs_i);

    let s_a = apriori_covariance(set, atm_apr, &x_a, &map);
    write_matrix(
        dir,
        "matrix_cov_apr.tab",
        ctl,
        &s_a,
        &atm_i,
        &obs_i,
        &map,
        MatrixAxis::State,
        MatrixAxis::State,
        MatrixOrder::RowMajor,
    )?;
    let s_a_inv = Cholesky::new(s_a)
        .context("a priori covariance is not positive definite")?
        .inverse();

    let (sig_noise, sig_formod, sig_eps_inv) = measurement_errors(set, ctl, obs_meas);

    let costs_path = dir.join("costs.tab");
    let mut costs = BufWriter::new(
        File::create(&costs_path)
            .with_context(|| format!("cannot create cost function file {}", costs_path.display()))?,
    );

    let mut dx = &x_i - &x_a;
    let mut dy = &y_m - &y_i;
    let mut chisq = cost_function(&mut costs, 0, &dx, &dy, &s_a_inv, &sig_eps_inv)?;
    if !chisq.is_finite() {
        error!("Retrieval failed!");
        return Ok((atm_i, obs_i));
    }

    let mut k_i = kernel(ctx, ctl, &atm_i, &obs_i, aero, &x_i, &map)?;
    let mut h = DMatrix::zeros(n, n);
    let mut x_step = DVector::zeros(n);
    let mut b = DVector::zeros(n);
    let mut lmpar = 0.001;

    for it in 1..=set.conv_itmax {
        let chisq_old = chisq;

        if it % set.kernel_recomp == 0 && !(set.kernel_recomp == 1 && it == 1) {
            k_i = kernel(ctx, ctl, &atm_i, &obs_i, aero, &x_i, &map)?;
        }
        if it % set.kernel_recomp == 0 || it == 1 {
            h = weighted_normal_matrix(&k_i, &sig_eps_inv);
        }

        dx = &x_i - &x_a;
        dy = &y_m - &y_i;

        // b = K^T S_eps^-1 dy - S_a^-1 dx
        let y_aux = DVector::from_fn(dy.len(), |i, _| dy[i] * sig_eps_inv[i] * sig_eps_inv[i]);
        b = k_i.transpose() * y_aux - &s_a_inv * &dx;

        for _attempt in 0..20 {
            // A = (1 + lambda) S_a^-1 + K^T S_eps^-1 K
            let mut a = s_a_inv.clone() * (1.0 + lmpar);
            a += &h;
            let chol =
                Cholesky::new(a).context("normal equations are not positive definite")?;
            x_step = chol.solve(&b);

            x_i += &x_step;
            atm_i = atm_apr.clone();
            obs_i = obs_meas.clone();
            x2atm(ctl, &x_i, &mut atm_i);
            clamp_state(ctl, &mut atm_i);

            formod(ctx, ctl, &mut atm_i, &mut obs_i, aero)?;
            y_i = obs2y(ctl, &obs_i);

            dx = &x_i - &x_a;
            dy = &y_m - &y_i;
            chisq = cost_function(&mut costs, it, &dx, &dy, &s_a_inv, &sig_eps_inv)?;

            if chisq > chisq_old {
                lmpar *= 10.0;
                x_i -= &x_step;
            } else {
                lmpar /= 10.0;
                break;
            }
        }

        // Normalized step size in state space.
        let disq = x_step.dot(&b) / n as f64;
        if disq < set.conv_dmin {
            break;
        }
    }

    costs.flush()?;
    drop(costs);

    obs_i.write(ctl, &dir.join("obs_final.tab"))?;
    atm_i.write(ctl, &dir.join("atm_final.tab"))?;
    write_matrix(
        dir,
        "matrix_kernel.tab",
        ctl,
        &k_i,
        &atm_i,
        &obs_i,
        &map,
        MatrixAxis::Measurement,
        MatrixAxis::State,
        MatrixOrder::RowMajor,
    )?;

    if set.err_ana {
        error_analysis(
            ctl,
            dir,
            &atm_i,
            &obs_i,
            &k_i,
            &s_a_inv,
            &sig_eps_inv,
            &sig_noise,
            &sig_formod,
            &map,
        )?;
    }

    Ok((atm_i, obs_i))
}
