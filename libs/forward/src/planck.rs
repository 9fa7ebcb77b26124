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
use anyhow::{Context, Result};
use atmos::{
    constants::{C1, C2, NPLANCK, TPLANCK_MAX, TPLANCK_MIN},
    control::Control,
    math::{lin, locate},
    Shape,
};
use log::info;
use std::path::PathBuf;

/// Planck radiance [W/(m^2 sr cm^-1)] at temperature `t` [K] and wavenumber
/// `nu` [cm^-1].
pub fn planck(t: f64, nu: f64) -> f64 {
    C1 * nu.powi(3) / (C2 * nu / t).exp_m1()
}

/// Brightness temperature [K] of radiance `rad` at wavenumber `nu`.
pub fn brightness(rad: f64, nu: f64) -> f64 {
    C2 * nu / (C1 * nu.powi(3) / rad).ln_1p()
}

/// Filter-weighted Planck radiance per channel, tabulated over temperature
/// so the pencil integrator can sample it with a single interpolation.
#[derive(Debug, Clone)]
pub struct SourceTable {
    temp: Vec<f64>,
    rad: Vec<Vec<f64>>,
}

impl SourceTable {
    /// Tabulate from one filter shape (wavenumber vs response) per channel.
    pub fn from_shapes(filters: &[Shape]) -> Self {
        let temp: Vec<f64> = (0..NPLANCK)
            .map(|it| {
                lin(
                    0.0,
                    TPLANCK_MIN,
                    (NPLANCK - 1) as f64,
                    TPLANCK_MAX,
                    it as f64,
                )
            })
            .collect();
        let rad = filters
            .iter()
            .map(|filter| {
                let fsum: f64 = filter.y.iter().sum();
                temp.iter()
                    .map(|&t| {
                        let s: f64 = filter
                            .x
                            .iter()
                            .zip(&filter.y)
                            .map(|(&nu, &f)| f * planck(t, nu))
                            .sum();
                        s / fsum
                    })
                    .collect()
            })
            .collect();
        Self { temp, rad }
    }

    /// Load the per-channel filter files `{tblbase}_{nu:.4}.filt`.
    pub fn load(ctl: &Control) -> Result<Self> {
        info!("Initialize source function table...");
        let mut filters = Vec::with_capacity(ctl.nd);
        for id in 0..ctl.nd {
            let path = PathBuf::from(format!("{}_{:.4}.filt", ctl.tblbase, ctl.nu[id]));
            filters.push(
                Shape::from_file(&path)
                    .with_context(|| format!("filter function of channel {}", id))?,
            );
        }
        Ok(Self::from_shapes(&filters))
    }

    /// Interpolate the source function of every channel at temperature `t`.
    pub fn sample(&self, t: f64, src: &mut [f64]) {
        debug_assert_eq!(src.len(), self.rad.len());
        let it = locate(&self.temp, t);
        for (out, col) in src.iter_mut().zip(&self.rad) {
            *out = lin(self.temp[it], col[it], self.temp[it + 1], col[it + 1], t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn brightness_inverts_planck() {
        for nu in [700.0, 1000.0, 2000.0] {
            for it in 0..=20 {
                let t = 150.0 + 10.0 * it as f64;
                assert_abs_diff_eq!(brightness(planck(t, nu), nu), t, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn monochromatic_filter_reproduces_planck() {
        let filter = Shape {
            x: vec![792.0],
            y: vec![1.0],
        };
        let table = SourceTable::from_shapes(&[filter]);
        let mut src = [0.0];
        for t in [150.0, 231.7, 250.0, 333.3] {
            table.sample(t, &mut src);
            assert_relative_eq!(src[0], planck(t, 792.0), max_relative = 1e-6);
        }
    }

    #[test]
    fn filter_weighting_averages_the_band() {
        let filter = Shape {
            x: vec![790.0, 792.0, 794.0],
            y: vec![0.5, 1.0, 0.5],
        };
        let table = SourceTable::from_shapes(&[filter]);
        let mut src = [0.0];
        table.sample(250.0, &mut src);
        let expect = (0.5 * planck(250.0, 790.0)
            + planck(250.0, 792.0)
            + 0.5 * planck(250.0, 794.0))
            / 2.0;
        assert_relative_eq!(src[0], expect, max_relative = 1e-6);
    }
}
