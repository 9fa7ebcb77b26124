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

// Line-of-sight construction: march a straight pencil beam from the
// observer toward the view point through the atmospheric grid, sampling the
// state and accumulating per-gas column densities segment by segment.

use anyhow::{ensure, Result};
use atmos::{
    constants::{KB, NLOSMAX, RE},
    control::Control,
    math::{cart2geo, geo2cart},
    Aerosol, Atmosphere, Observations,
};

/// One pencil beam, ordered from the observer outward. `q[ip]`, `k[ip]`, and
/// `u[ip]` hold the per-gas mixing ratios, per-window extinctions, and
/// per-gas column densities [molec/cm^2] of segment `ip`; `ds[ip]` is its
/// length [km]. `tsurf > 0` marks a surface-terminated path.
#[derive(Debug, Clone)]
pub struct LineOfSight {
    pub z: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub p: Vec<f64>,
    pub t: Vec<f64>,
    pub q: Vec<Vec<f64>>,
    pub k: Vec<Vec<f64>>,
    pub u: Vec<Vec<f64>>,
    pub ds: Vec<f64>,
    pub aeroi: Vec<usize>,
    pub aerofac: Vec<f64>,
    pub tsurf: f64,
}

impl LineOfSight {
    fn new() -> Self {
        Self {
            z: Vec::new(),
            lon: Vec::new(),
            lat: Vec::new(),
            p: Vec::new(),
            t: Vec::new(),
            q: Vec::new(),
            k: Vec::new(),
            u: Vec::new(),
            ds: Vec::new(),
            aeroi: Vec::new(),
            aerofac: Vec::new(),
            tsurf: -999.0,
        }
    }

    pub fn np(&self) -> usize {
        self.z.len()
    }
}

/// Build the line of sight of ray `ir`.
///
/// The beam leaves the observer toward the view point. An observer outside
/// the grid top is advanced to atmosphere entry first; a beam that misses
/// the grid entirely yields an empty path (cold space: radiance 0,
/// transmittance 1). A beam reaching the grid bottom terminates with the
/// surface temperature interpolated there.
pub fn raytrace(
    ctl: &Control,
    atm: &Atmosphere,
    obs: &Observations,
    aero: &Aerosol,
    ir: usize,
) -> Result<LineOfSight> {
    let mut los = LineOfSight::new();

    let zmin = atm.zmin();
    let zmax = atm.zmax();

    let mut x = geo2cart(obs.obsz[ir], obs.obslon[ir], obs.obslat[ir]);
    let xvp = geo2cart(obs.vpz[ir], obs.vplon[ir], obs.vplat[ir]);
    let dir = (xvp - x).normalize();

    // Advance to atmosphere entry when the observer sits above the grid.
    if obs.obsz[ir] > zmax {
        let rtop = RE + zmax;
        let b = x.dot(&dir);
        let disc = b * b - (x.norm_squared() - rtop * rtop);
        if disc < 0.0 {
            return Ok(los); // misses the atmosphere
        }
        let entry = -b - disc.sqrt();
        if entry < 0.0 {
            return Ok(los); // atmosphere behind the observer
        }
        x += dir * (entry + 1e-4);
    }

    loop {
        let (z, lon, lat) = cart2geo(&x);
        if z > zmax {
            break;
        }
        if z < zmin {
            los.tsurf = atm.sample(zmin).t;
            break;
        }

        // Limit the step so a single segment never jumps more than raydz
        // in altitude.
        let dzds = x.dot(&dir) / x.norm();
        let ds = if dzds.abs() > 1e-10 {
            ctl.rayds.min(ctl.raydz / dzds.abs())
        } else {
            ctl.rayds
        };

        let s = atm.sample(z);
        let u = s
            .q
            .iter()
            .map(|&q| 10.0 * q * s.p / (KB * s.t) * ds)
            .collect();
        let (aeroi, aerofac) = aero.locate(z).unwrap_or((0, 0.0));

        los.z.push(z);
        los.lon.push(lon);
        los.lat.push(lat);
        los.p.push(s.p);
        los.t.push(s.t);
        los.q.push(s.q);
        los.k.push(s.k);
        los.u.push(u);
        los.ds.push(ds);
        los.aeroi.push(aeroi);
        los.aerofac.push(aerofac);
        ensure!(los.np() <= NLOSMAX, "too many points along the line of sight");

        x += dir * ds;
    }

    Ok(los)
}
