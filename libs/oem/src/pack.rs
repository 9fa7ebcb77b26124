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

// State and measurement vector packing. The state vector walks the
// atmosphere in a fixed quantity order (pressure, temperature, mixing
// ratios, window extinctions), taking the grid points inside each
// quantity's retrieval altitude range; unpacking is the exact inverse.

use atmos::{control::Control, Atmosphere, Observations};
use nalgebra::DVector;

/// Tag of a retrieved quantity in the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Pressure,
    Temperature,
    Gas(usize),
    Window(usize),
}

/// Parallel index maps of the state vector: quantity tag and source grid
/// point per element.
#[derive(Debug, Clone, Default)]
pub struct StateMap {
    pub iqa: Vec<Quantity>,
    pub ipa: Vec<usize>,
}

impl StateMap {
    pub fn len(&self) -> usize {
        self.iqa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iqa.is_empty()
    }
}

fn walk(ctl: &Control, z: &[f64], mut visit: impl FnMut(Quantity, usize)) {
    for (ip, &zp) in z.iter().enumerate() {
        if ctl.ret_p.contains(zp) {
            visit(Quantity::Pressure, ip);
        }
    }
    for (ip, &zp) in z.iter().enumerate() {
        if ctl.ret_t.contains(zp) {
            visit(Quantity::Temperature, ip);
        }
    }
    for (ig, range) in ctl.ret_q.iter().enumerate() {
        for (ip, &zp) in z.iter().enumerate() {
            if range.contains(zp) {
                visit(Quantity::Gas(ig), ip);
            }
        }
    }
    for (iw, range) in ctl.ret_k.iter().enumerate() {
        for (ip, &zp) in z.iter().enumerate() {
            if range.contains(zp) {
                visit(Quantity::Window(iw), ip);
            }
        }
    }
}

/// Pack the retrieved quantities of `atm` into a flat state vector with its
/// index maps.
pub fn atm2x(ctl: &Control, atm: &Atmosphere) -> (DVector<f64>, StateMap) {
    let mut vals = Vec::new();
    let mut map = StateMap::default();
    walk(ctl, &atm.z, |q, ip| {
        vals.push(match q {
            Quantity::Pressure => atm.p[ip],
            Quantity::Temperature => atm.t[ip],
            Quantity::Gas(ig) => atm.q[ig][ip],
            Quantity::Window(iw) => atm.k[iw][ip],
        });
        map.iqa.push(q);
        map.ipa.push(ip);
    });
    (DVector::from_vec(vals), map)
}

/// Write a state vector back into the atmosphere; fields outside the packed
/// channels are left untouched.
pub fn x2atm(ctl: &Control, x: &DVector<f64>, atm: &mut Atmosphere) {
    let z = atm.z.clone();
    let mut i = 0;
    walk(ctl, &z, |q, ip| {
        let v = x[i];
        i += 1;
        match q {
            Quantity::Pressure => atm.p[ip] = v,
            Quantity::Temperature => atm.t[ip] = v,
            Quantity::Gas(ig) => atm.q[ig][ip] = v,
            Quantity::Window(iw) => atm.k[iw][ip] = v,
        }
    });
    debug_assert_eq!(i, x.len());
}

/// Pack the finite radiances into the measurement vector, rays outermost.
pub fn obs2y(ctl: &Control, obs: &Observations) -> DVector<f64> {
    let mut vals = Vec::new();
    for ir in 0..obs.nr() {
        for id in 0..ctl.nd {
            let r = obs.rad[id][ir];
            if r.is_finite() {
                vals.push(r);
            }
        }
    }
    DVector::from_vec(vals)
}

/// (ray, channel) source of every measurement vector element.
pub fn measurement_map(ctl: &Control, obs: &Observations) -> Vec<(usize, usize)> {
    let mut map = Vec::new();
    for ir in 0..obs.nr() {
        for id in 0..ctl.nd {
            if obs.rad[id][ir].is_finite() {
                map.push((ir, id));
            }
        }
    }
    map
}
