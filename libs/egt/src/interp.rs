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
use crate::table::TableSet;
use atmos::math::{lin, locate};

/// Per-ray interpolation state: the cumulative gas transmittance of the
/// extended path, per (gas, channel).
///
/// Emissivity is non-linear in column density, so per-segment increments
/// cannot simply be summed. For each new segment the inverse table converts
/// the accumulated path emissivity back into an equivalent column, the
/// geometric column of the segment is added, and the forward table yields
/// the emissivity of the extended path.
#[derive(Debug, Clone)]
pub struct PathTransmittance {
    tau_path: Vec<Vec<f64>>,
    ng: usize,
    nd: usize,
}

impl PathTransmittance {
    pub fn new(ng: usize, nd: usize) -> Self {
        Self {
            tau_path: vec![vec![1.0; nd]; ng],
            ng,
            nd,
        }
    }

    pub fn tau_path(&self, ig: usize, id: usize) -> f64 {
        self.tau_path[ig][id]
    }

    /// Advance the path by one segment at (p, t) with per-gas column
    /// increments `u`, writing the per-channel segment transmittance (the
    /// product over gases) into `tau_seg`.
    pub fn segment(&mut self, tables: &TableSet, p: f64, t: f64, u: &[f64], tau_seg: &mut [f64]) {
        debug_assert_eq!(u.len(), self.ng);
        debug_assert_eq!(tau_seg.len(), self.nd);
        for id in 0..self.nd {
            tau_seg[id] = 1.0;
            for ig in 0..self.ng {
                let eps = self.segment_emissivity(tables, ig, id, p, t, u[ig]);
                self.tau_path[ig][id] *= 1.0 - eps;
                tau_seg[id] *= 1.0 - eps;
            }
        }
    }

    fn segment_emissivity(
        &self,
        tables: &TableSet,
        ig: usize,
        id: usize,
        p: f64,
        t: f64,
        du: f64,
    ) -> f64 {
        let tbl = tables.get(ig, id);
        if tbl.np() < 2 {
            return 0.0;
        }
        let tau_path = self.tau_path[ig][id];
        if tau_path < 1e-9 {
            // Extended path saturated; the segment absorbs everything left.
            return 1.0;
        }

        let ipr = locate(tbl.p_axis(), p);
        if tbl.nt(ipr) < 2 || tbl.nt(ipr + 1) < 2 {
            return 0.0;
        }
        let it0 = locate(tbl.t_axis(ipr), t);
        let it1 = locate(tbl.t_axis(ipr + 1), t);
        if tbl.cell_len(ipr, it0) < 2
            || tbl.cell_len(ipr, it0 + 1) < 2
            || tbl.cell_len(ipr + 1, it1) < 2
            || tbl.cell_len(ipr + 1, it1 + 1) < 2
        {
            return 0.0;
        }

        // Extended-path emissivity at the four (p, T) corners.
        let corner = |ip: usize, it: usize| {
            let u_acc = tbl.u_of_eps(ip, it, 1.0 - tau_path);
            tbl.eps_of_u(ip, it, u_acc + du).clamp(0.0, 1.0)
        };
        let eps00 = corner(ipr, it0);
        let eps01 = corner(ipr, it0 + 1);
        let eps10 = corner(ipr + 1, it1);
        let eps11 = corner(ipr + 1, it1 + 1);

        let t_lo = tbl.t_axis(ipr);
        let t_hi = tbl.t_axis(ipr + 1);
        let eps_lo = lin(t_lo[it0], eps00, t_lo[it0 + 1], eps01, t).clamp(0.0, 1.0);
        let eps_hi = lin(t_hi[it1], eps10, t_hi[it1 + 1], eps11, t).clamp(0.0, 1.0);
        let eps_ext = lin(tbl.p_axis()[ipr], eps_lo, tbl.p_axis()[ipr + 1], eps_hi, p)
            .clamp(0.0, 1.0);

        1.0 - (1.0 - eps_ext) / tau_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::beer_table;
    use crate::table::GasTable;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const SIGMA: f64 = 1e-19;

    fn beer_set() -> TableSet {
        TableSet::from_tables(vec![vec![beer_table(SIGMA)]])
    }

    #[test]
    fn a_uniform_path_reproduces_beer_lambert() {
        let tables = beer_set();
        let mut state = PathTransmittance::new(1, 1);
        let mut tau_seg = [0.0];

        let du = 2e18;
        let mut total = 1.0;
        for _ in 0..10 {
            state.segment(&tables, 100.0, 250.0, &[du], &mut tau_seg);
            total *= tau_seg[0];
        }
        let expect = (-SIGMA * du * 10.0).exp();
        assert_relative_eq!(total, expect, max_relative = 1e-2);
        assert_relative_eq!(state.tau_path(0, 0), expect, max_relative = 1e-2);
    }

    #[test]
    fn splitting_a_segment_leaves_the_path_transmittance_unchanged() {
        let tables = beer_set();
        let mut tau_seg = [0.0];

        let mut one = PathTransmittance::new(1, 1);
        one.segment(&tables, 100.0, 250.0, &[4e18], &mut tau_seg);
        let tau_one = one.tau_path(0, 0);

        let mut two = PathTransmittance::new(1, 1);
        two.segment(&tables, 100.0, 250.0, &[2e18], &mut tau_seg);
        two.segment(&tables, 100.0, 250.0, &[2e18], &mut tau_seg);
        let tau_two = two.tau_path(0, 0);

        assert_relative_eq!(tau_one, tau_two, max_relative = 1e-3);
    }

    #[test]
    fn empty_table_means_no_absorption() {
        let tables = TableSet::from_tables(vec![vec![GasTable::empty()]]);
        let mut state = PathTransmittance::new(1, 1);
        let mut tau_seg = [0.0];
        state.segment(&tables, 100.0, 250.0, &[1e20], &mut tau_seg);
        assert_abs_diff_eq!(tau_seg[0], 1.0);
        assert_abs_diff_eq!(state.tau_path(0, 0), 1.0);
    }

    #[test]
    fn a_saturated_path_absorbs_the_whole_segment() {
        let tables = beer_set();
        let mut state = PathTransmittance::new(1, 1);
        let mut tau_seg = [0.0];
        // Drive the path deep into saturation, then add one more segment.
        for _ in 0..40 {
            state.segment(&tables, 100.0, 250.0, &[5e19], &mut tau_seg);
        }
        assert!(state.tau_path(0, 0) < 1e-9);
        state.segment(&tables, 100.0, 250.0, &[1e15], &mut tau_seg);
        assert_abs_diff_eq!(tau_seg[0], 0.0);
    }

    #[test]
    fn transmittances_stay_in_bounds_and_decrease() {
        let tables = beer_set();
        let mut state = PathTransmittance::new(1, 1);
        let mut tau_seg = [0.0];
        let mut prev = 1.0;
        for i in 0..50 {
            let du = 1e17 * (1 + i % 7) as f64;
            state.segment(&tables, 80.0 + i as f64, 200.0 + i as f64, &[du], &mut tau_seg);
            let tp = state.tau_path(0, 0);
            assert!((0.0..=1.0 + 1e-12).contains(&tau_seg[0]));
            assert!((0.0..=1.0 + 1e-12).contains(&tp));
            assert!(tp <= prev + 1e-12);
            prev = tp;
        }
    }
}
