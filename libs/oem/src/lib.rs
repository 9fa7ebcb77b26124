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

// Optimal-estimation retrieval: wraps the forward model as y = F(x) with a
// numerical Jacobian and fits the atmospheric state to measured radiances
// by Levenberg-Marquardt, regularized by an a-priori covariance.

mod analysis;
mod covar;
mod kernel;
mod matrix;
mod pack;
mod retrieval;

pub use covar::{apriori_covariance, measurement_errors, RetrievalSettings};
pub use kernel::kernel;
pub use matrix::{write_matrix, MatrixAxis, MatrixOrder};
pub use pack::{atm2x, measurement_map, obs2y, x2atm, Quantity, StateMap};
pub use retrieval::optimal_estimation;

use atmos::{control::Control, Observations};

/// Mask measurements whose relative residual `|1 - model/measured|` exceeds
/// `resmax` percent, in both the measured and modeled sets. Returns how many
/// samples were newly masked; the caller reruns the retrieval while this is
/// positive and measurements remain.
pub fn residual_filter(
    set: &RetrievalSettings,
    ctl: &Control,
    obs_meas: &mut Observations,
    obs_mod: &mut Observations,
) -> usize {
    if set.resmax <= 0.0 {
        return 0;
    }
    let mut nbad = 0;
    for id in 0..ctl.nd {
        for ir in 0..obs_meas.nr() {
            let meas = obs_meas.rad[id][ir];
            let model = obs_mod.rad[id][ir];
            if meas.is_finite() && model.is_finite() && (1.0 - model / meas).abs() >= set.resmax / 100.0
            {
                obs_meas.rad[id][ir] = f64::NAN;
                obs_mod.rad[id][ir] = f64::NAN;
                nbad += 1;
            }
        }
    }
    nbad
}
