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
use crate::pack::{obs2y, x2atm, Quantity, StateMap};
use anyhow::Result;
use atmos::{control::Control, Aerosol, Atmosphere, Observations};
use forward::{formod, ForwardContext};
use log::info;
use nalgebra::{DMatrix, DVector};

/// Jacobian K = dF/dx by forward differences, one forward-model run per
/// state element. `obs` must already hold F(x) for the current state.
pub fn kernel(
    ctx: &ForwardContext,
    ctl: &Control,
    atm: &Atmosphere,
    obs: &Observations,
    aero: &Aerosol,
    x: &DVector<f64>,
    map: &StateMap,
) -> Result<DMatrix<f64>> {
    let y0 = obs2y(ctl, obs);
    let m = y0.len();
    let n = x.len();
    info!("Compute kernel matrix ({} x {})...", m, n);

    let mut k = DMatrix::zeros(m, n);
    for j in 0..n {
        let h = match map.iqa[j] {
            Quantity::Pressure => (0.01 * x[j].abs()).max(1e-7),
            Quantity::Temperature => 1.0,
            Quantity::Gas(_) => (0.01 * x[j].abs()).max(1e-15),
            Quantity::Window(_) => 1e-4,
        };

        let mut x1 = x.clone();
        x1[j] += h;
        let mut atm1 = atm.clone();
        let mut obs1 = obs.clone();
        x2atm(ctl, &x1, &mut atm1);
        formod(ctx, ctl, &mut atm1, &mut obs1, aero)?;
        let y1 = obs2y(ctl, &obs1);

        for i in 0..m {
            k[(i, j)] = (y1[i] - y0[i]) / h;
        }
    }
    Ok(k)
}
