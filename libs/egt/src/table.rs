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

// Emissivity growth tables: for one (gas, channel) pair, emissivity as a
// function of column density, tabulated per pressure level and temperature.
// Axes are f64; the (u, eps) payload stays f32 and lives in one flat buffer
// with per-cell offset views.

use anyhow::{ensure, Context, Result};
use atmos::constants::{TBLNPMAX, TBLNTMAX, TBLNUMAX};
use atmos::control::Control;
use atmos::math::locate_f32;
use byteorder::{LittleEndian, ReadBytesExt};
use log::{info, warn};
use std::{fs, io::Cursor, path::PathBuf};

/// The (u, eps) samples of one (pressure, temperature) cell.
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a> {
    pub u: &'a [f32],
    pub eps: &'a [f32],
}

/// Emissivity table for one gas in one channel. Empty tables (no file found)
/// contribute no absorption.
#[derive(Debug, Clone, Default)]
pub struct GasTable {
    p: Vec<f64>,
    t: Vec<Vec<f64>>,
    cell_start: Vec<Vec<usize>>,
    cell_len: Vec<Vec<usize>>,
    u: Vec<f32>,
    eps: Vec<f32>,
}

impl GasTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn np(&self) -> usize {
        self.p.len()
    }

    pub fn nt(&self, ip: usize) -> usize {
        self.t[ip].len()
    }

    pub fn p_axis(&self) -> &[f64] {
        &self.p
    }

    pub fn t_axis(&self, ip: usize) -> &[f64] {
        &self.t[ip]
    }

    pub fn cell_len(&self, ip: usize, it: usize) -> usize {
        self.cell_len[ip][it]
    }

    pub fn cell(&self, ip: usize, it: usize) -> CellView {
        let start = self.cell_start[ip][it];
        let len = self.cell_len[ip][it];
        CellView {
            u: &self.u[start..start + len],
            eps: &self.eps[start..start + len],
        }
    }

    /// Forward lookup: emissivity of column density `u` in cell (ip, it).
    /// Linear off the table ends.
    pub fn eps_of_u(&self, ip: usize, it: usize, u: f64) -> f64 {
        let c = self.cell(ip, it);
        let i = locate_f32(c.u, u);
        interp(c.u[i], c.eps[i], c.u[i + 1], c.eps[i + 1], u)
    }

    /// Inverse lookup: column density at emissivity `eps` in cell (ip, it).
    pub fn u_of_eps(&self, ip: usize, it: usize, eps: f64) -> f64 {
        let c = self.cell(ip, it);
        let i = locate_f32(c.eps, eps);
        interp(c.eps[i], c.u[i], c.eps[i + 1], c.u[i + 1], eps)
    }

    /// Assemble a table from per-cell sample vectors; used by the loaders
    /// and by synthetic-table tests. Enforces the axis invariants.
    pub fn from_parts(
        p: Vec<f64>,
        t: Vec<Vec<f64>>,
        cells: Vec<Vec<(Vec<f32>, Vec<f32>)>>,
    ) -> Result<Self> {
        ensure!(t.len() == p.len() && cells.len() == p.len(), "ragged table shape mismatch");
        let mut cell_start = Vec::with_capacity(p.len());
        let mut cell_len = Vec::with_capacity(p.len());
        let mut u = Vec::new();
        let mut eps = Vec::new();
        for (row_t, row_cells) in t.iter().zip(&cells) {
            ensure!(
                row_t.len() == row_cells.len(),
                "ragged table shape mismatch"
            );
            let mut starts = Vec::with_capacity(row_cells.len());
            let mut lens = Vec::with_capacity(row_cells.len());
            for (cu, ce) in row_cells {
                ensure!(cu.len() == ce.len(), "u/eps sample count mismatch");
                starts.push(u.len());
                lens.push(cu.len());
                u.extend_from_slice(cu);
                eps.extend(ce.iter().map(|&e| e.clamp(0.0, 1.0)));
            }
            cell_start.push(starts);
            cell_len.push(lens);
        }
        let tbl = Self {
            p,
            t,
            cell_start,
            cell_len,
            u,
            eps,
        };
        tbl.validate()?;
        Ok(tbl)
    }

    fn validate(&self) -> Result<()> {
        for w in self.p.windows(2) {
            ensure!(w[0] < w[1], "pressure axis not ascending");
        }
        for (ip, row) in self.t.iter().enumerate() {
            for w in row.windows(2) {
                ensure!(w[0] < w[1], "temperature axis not ascending at level {}", ip);
            }
            for it in 0..row.len() {
                let c = self.cell(ip, it);
                for w in c.u.windows(2) {
                    ensure!(
                        w[0] <= w[1],
                        "column density axis not monotonic in cell ({}, {})",
                        ip,
                        it
                    );
                }
                for w in c.eps.windows(2) {
                    ensure!(
                        w[0] <= w[1],
                        "emissivity axis not monotonic in cell ({}, {})",
                        ip,
                        it
                    );
                }
            }
        }
        Ok(())
    }

    /// Binary table layout: little-endian
    /// `np, p[np], nt[np], { t[nt], nu[nt], { u[nu], eps[nu] } }`.
    /// Axis counts above the compile-time caps are fatal.
    pub fn from_bin(bytes: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(bytes);
        let np = rdr.read_i32::<LittleEndian>()? as usize;
        ensure!(np <= TBLNPMAX, "too many pressure levels ({})", np);

        let mut p = vec![0f64; np];
        rdr.read_f64_into::<LittleEndian>(&mut p)?;
        let mut nt = vec![0i32; np];
        rdr.read_i32_into::<LittleEndian>(&mut nt)?;

        let mut t = Vec::with_capacity(np);
        let mut cells = Vec::with_capacity(np);
        for &ntl in &nt {
            let ntl = ntl as usize;
            ensure!(ntl <= TBLNTMAX, "too many temperatures ({})", ntl);
            let mut row_t = vec![0f64; ntl];
            rdr.read_f64_into::<LittleEndian>(&mut row_t)?;
            let mut nu = vec![0i32; ntl];
            rdr.read_i32_into::<LittleEndian>(&mut nu)?;
            let mut row_cells = Vec::with_capacity(ntl);
            for &nul in &nu {
                let nul = nul as usize;
                ensure!(nul <= TBLNUMAX, "too many column densities ({})", nul);
                let mut cu = vec![0f32; nul];
                rdr.read_f32_into::<LittleEndian>(&mut cu)?;
                let mut ce = vec![0f32; nul];
                rdr.read_f32_into::<LittleEndian>(&mut ce)?;
                row_cells.push((cu, ce));
            }
            t.push(row_t);
            cells.push(row_cells);
        }
        Self::from_parts(p, t, cells)
    }

    /// ASCII fallback: `p T u eps` per line, grouped by p, then T, then u.
    /// Axis boundaries are detected by value change. Within a cell a row is
    /// appended only while both u and eps keep growing; otherwise it
    /// replaces the last row. Rows beyond the cell cap are dropped.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut p: Vec<f64> = Vec::new();
        let mut t: Vec<Vec<f64>> = Vec::new();
        let mut cells: Vec<Vec<(Vec<f32>, Vec<f32>)>> = Vec::new();
        let mut last_eps = -999.0;
        let mut last_u = -999.0;

        for line in text.lines() {
            let mut it = line.split_whitespace().map(|tok| tok.parse::<f64>());
            let (Some(Ok(press)), Some(Ok(temp)), Some(Ok(u)), Some(Ok(eps))) =
                (it.next(), it.next(), it.next(), it.next())
            else {
                continue;
            };

            if p.last() != Some(&press) {
                ensure!(p.len() < TBLNPMAX, "too many pressure levels");
                p.push(press);
                t.push(Vec::new());
                cells.push(Vec::new());
            }
            let row_t = t.last_mut().unwrap();
            let row_cells = cells.last_mut().unwrap();
            if row_t.last() != Some(&temp) {
                ensure!(row_t.len() < TBLNTMAX, "too many temperatures");
                row_t.push(temp);
                row_cells.push((Vec::new(), Vec::new()));
            }
            let (cu, ce) = row_cells.last_mut().unwrap();
            if (eps > last_eps && u > last_u) || cu.is_empty() {
                last_eps = eps;
                last_u = u;
                if cu.len() >= TBLNUMAX {
                    continue;
                }
                cu.push(u as f32);
                ce.push(eps as f32);
            } else {
                *cu.last_mut().unwrap() = u as f32;
                *ce.last_mut().unwrap() = eps as f32;
            }
        }
        Self::from_parts(p, t, cells)
    }
}

// Two-point interpolation over f32 samples; flat brackets return the left
// ordinate instead of dividing by zero.
fn interp(x0: f32, y0: f32, x1: f32, y1: f32, x: f64) -> f64 {
    let (x0, y0, x1, y1) = (f64::from(x0), f64::from(y0), f64::from(x1), f64::from(y1));
    if x1 == x0 {
        y0
    } else {
        y0 + (y1 - y0) / (x1 - x0) * (x - x0)
    }
}

/// All emissivity tables of a run, indexed `[gas][channel]`.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<Vec<GasTable>>,
    ng: usize,
    nd: usize,
}

impl TableSet {
    pub fn from_tables(tables: Vec<Vec<GasTable>>) -> Self {
        let ng = tables.len();
        let nd = tables.first().map_or(0, Vec::len);
        Self { tables, ng, nd }
    }

    pub fn ng(&self) -> usize {
        self.ng
    }

    pub fn nd(&self) -> usize {
        self.nd
    }

    pub fn get(&self, ig: usize, id: usize) -> &GasTable {
        &self.tables[ig][id]
    }

    /// Load `{tblbase}_{nu:.4}_{emitter}.bin` per (gas, channel), falling
    /// back to the `.tab` ASCII spelling. A missing file leaves the entry
    /// empty: the gas has no absorption in that channel.
    pub fn load(ctl: &Control) -> Result<Self> {
        let mut tables = Vec::with_capacity(ctl.ng);
        for ig in 0..ctl.ng {
            let mut row = Vec::with_capacity(ctl.nd);
            for id in 0..ctl.nd {
                row.push(Self::load_one(ctl, ig, id)?);
            }
            tables.push(row);
        }
        Ok(Self::from_tables(tables))
    }

    fn load_one(ctl: &Control, ig: usize, id: usize) -> Result<GasTable> {
        let bin = PathBuf::from(format!(
            "{}_{:.4}_{}.bin",
            ctl.tblbase, ctl.nu[id], ctl.emitter[ig]
        ));
        if let Ok(bytes) = fs::read(&bin) {
            info!("Read emissivity table: {}", bin.display());
            return GasTable::from_bin(&bytes).with_context(|| format!("in {}", bin.display()));
        }

        let tab = PathBuf::from(format!(
            "{}_{:.4}_{}.tab",
            ctl.tblbase, ctl.nu[id], ctl.emitter[ig]
        ));
        match fs::read_to_string(&tab) {
            Ok(text) => {
                info!("Read emissivity table: {}", tab.display());
                GasTable::from_text(&text).with_context(|| format!("in {}", tab.display()))
            }
            Err(_) => {
                warn!("Missing emissivity table: {}", tab.display());
                Ok(GasTable::empty())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Beer-Lambert cell: eps(u) = 1 - exp(-sigma u) on a log-spaced u grid.
    pub(crate) fn beer_cell(sigma: f64, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut u = Vec::with_capacity(n);
        let mut eps = Vec::with_capacity(n);
        for i in 0..n {
            // u from 1e14 to 1e22 molec/cm^2
            let uu = 10f64.powf(14.0 + 8.0 * i as f64 / (n - 1) as f64);
            u.push(uu as f32);
            eps.push((1.0 - (-sigma * uu).exp()) as f32);
        }
        (u, eps)
    }

    pub(crate) fn beer_table(sigma: f64) -> GasTable {
        let p = vec![1e-3, 1e4];
        let t = vec![vec![150.0, 350.0], vec![150.0, 350.0]];
        let cells = vec![
            vec![beer_cell(sigma, 400), beer_cell(sigma, 400)],
            vec![beer_cell(sigma, 400), beer_cell(sigma, 400)],
        ];
        GasTable::from_parts(p, t, cells).unwrap()
    }

    #[test]
    fn forward_and_inverse_lookups_are_consistent() {
        let tbl = beer_table(1e-19);
        for exp10 in [15.0, 17.0, 19.0, 20.5] {
            let u = 10f64.powf(exp10);
            let eps = tbl.eps_of_u(0, 0, u);
            let back = tbl.u_of_eps(0, 0, eps);
            assert_relative_eq!(back, u, max_relative = 1e-2);
        }
    }

    #[test]
    fn non_monotonic_axes_are_rejected() {
        let p = vec![10.0, 1.0];
        let t = vec![vec![200.0], vec![200.0]];
        let cells = vec![
            vec![(vec![1.0], vec![0.1])],
            vec![(vec![1.0], vec![0.1])],
        ];
        assert!(GasTable::from_parts(p, t, cells).is_err());

        let p = vec![1.0];
        let t = vec![vec![200.0]];
        let cells = vec![vec![(vec![2.0f32, 1.0], vec![0.1f32, 0.2])]];
        assert!(GasTable::from_parts(p, t, cells).is_err());
    }

    #[test]
    fn ascii_grouping_by_value_change() {
        let text = "\
1.0 200.0 1.0 0.10
1.0 200.0 2.0 0.20
1.0 220.0 1.0 0.05
1.0 220.0 2.0 0.15
5.0 200.0 1.0 0.08
5.0 200.0 2.0 0.18
";
        let tbl = GasTable::from_text(text).unwrap();
        assert_eq!(tbl.np(), 2);
        assert_eq!(tbl.nt(0), 2);
        assert_eq!(tbl.nt(1), 1);
        assert_eq!(tbl.cell_len(0, 1), 2);
        assert_abs_diff_eq!(tbl.cell(1, 0).eps[1], 0.18f32, epsilon = 1e-6);
    }

    #[test]
    fn ascii_replaces_rows_that_stop_growing() {
        // The third row neither grows u nor eps, so it overwrites the second.
        let text = "\
1.0 200.0 1.0 0.10
1.0 200.0 2.0 0.20
1.0 200.0 2.0 0.20
1.0 200.0 4.0 0.40
";
        let tbl = GasTable::from_text(text).unwrap();
        assert_eq!(tbl.cell_len(0, 0), 3);
        assert_abs_diff_eq!(tbl.cell(0, 0).u[2], 4.0f32);
    }

    #[test]
    fn binary_round_trip() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(2).unwrap();
        for p in [1.0f64, 10.0] {
            bytes.write_f64::<LittleEndian>(p).unwrap();
        }
        for nt in [1i32, 1] {
            bytes.write_i32::<LittleEndian>(nt).unwrap();
        }
        for _ip in 0..2 {
            bytes.write_f64::<LittleEndian>(225.0).unwrap();
            bytes.write_i32::<LittleEndian>(3).unwrap();
            for u in [1.0f32, 2.0, 3.0] {
                bytes.write_f32::<LittleEndian>(u).unwrap();
            }
            for eps in [0.1f32, 0.2, 0.3] {
                bytes.write_f32::<LittleEndian>(eps).unwrap();
            }
        }
        let tbl = GasTable::from_bin(&bytes).unwrap();
        assert_eq!(tbl.np(), 2);
        assert_eq!(tbl.cell_len(1, 0), 3);
        assert_abs_diff_eq!(tbl.cell(1, 0).eps[2], 0.3f32);
    }

    #[test]
    fn binary_over_cap_is_fatal() {
        let mut bytes = Vec::new();
        bytes
            .write_i32::<LittleEndian>(TBLNPMAX as i32 + 1)
            .unwrap();
        assert!(GasTable::from_bin(&bytes).is_err());
    }
}
