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
    constants::{G0, MAIR, RGAS},
    control::Control,
    math::{exp_interp, lin, locate},
};
use anyhow::{ensure, Context, Result};
use log::info;
use std::{fmt::Write as _, fs, path::Path};

/// Atmospheric state on an ordered grid. Points are stored column-wise;
/// `q[ig][ip]` and `k[iw][ip]` follow the emitter and window order of the
/// control structure. Altitudes are ascending within each constant-time
/// block.
#[derive(Debug, Clone)]
pub struct Atmosphere {
    pub time: Vec<f64>,
    pub z: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub p: Vec<f64>,
    pub t: Vec<f64>,
    pub q: Vec<Vec<f64>>,
    pub k: Vec<Vec<f64>>,
}

/// Atmosphere interpolated to a single altitude.
#[derive(Debug, Clone)]
pub struct Sample {
    pub p: f64,
    pub t: f64,
    pub q: Vec<f64>,
    pub k: Vec<f64>,
}

impl Atmosphere {
    pub fn new(ng: usize, nw: usize) -> Self {
        Self {
            time: Vec::new(),
            z: Vec::new(),
            lon: Vec::new(),
            lat: Vec::new(),
            p: Vec::new(),
            t: Vec::new(),
            q: vec![Vec::new(); ng],
            k: vec![Vec::new(); nw],
        }
    }

    pub fn np(&self) -> usize {
        self.z.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_point(
        &mut self,
        time: f64,
        z: f64,
        lon: f64,
        lat: f64,
        p: f64,
        t: f64,
        q: &[f64],
        k: &[f64],
    ) {
        debug_assert_eq!(q.len(), self.q.len());
        debug_assert_eq!(k.len(), self.k.len());
        self.time.push(time);
        self.z.push(z);
        self.lon.push(lon);
        self.lat.push(lat);
        self.p.push(p);
        self.t.push(t);
        for (col, &v) in self.q.iter_mut().zip(q) {
            col.push(v);
        }
        for (col, &v) in self.k.iter_mut().zip(k) {
            col.push(v);
        }
    }

    pub fn zmin(&self) -> f64 {
        self.z.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn zmax(&self) -> f64 {
        self.z.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Interpolate the state to altitude `z`: pressure log-linearly,
    /// everything else linearly.
    pub fn sample(&self, z: f64) -> Sample {
        let np = self.np();
        debug_assert!(np > 0);
        if np == 1 {
            return Sample {
                p: self.p[0],
                t: self.t[0],
                q: self.q.iter().map(|col| col[0]).collect(),
                k: self.k.iter().map(|col| col[0]).collect(),
            };
        }
        let ip = locate(&self.z, z);
        let (z0, z1) = (self.z[ip], self.z[ip + 1]);
        Sample {
            p: exp_interp(z0, self.p[ip], z1, self.p[ip + 1], z),
            t: lin(z0, self.t[ip], z1, self.t[ip + 1], z),
            q: self
                .q
                .iter()
                .map(|col| lin(z0, col[ip], z1, col[ip + 1], z))
                .collect(),
            k: self
                .k
                .iter()
                .map(|col| lin(z0, col[ip], z1, col[ip + 1], z))
                .collect(),
        }
    }

    /// Zero all retrievable quantities, keeping the grid coordinates.
    pub fn clear_quantities(&mut self) {
        self.p.iter_mut().for_each(|v| *v = 0.0);
        self.t.iter_mut().for_each(|v| *v = 0.0);
        for col in self.q.iter_mut().chain(self.k.iter_mut()) {
            col.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    pub fn from_text(ctl: &Control, text: &str) -> Result<Self> {
        let mut atm = Self::new(ctl.ng, ctl.nw);
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("");
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<Result<_, _>>()
                .with_context(|| format!("malformed atmosphere data in line {}", lineno + 1))?;
            if fields.is_empty() {
                continue;
            }
            ensure!(
                fields.len() == 6 + ctl.ng + ctl.nw,
                "expected {} columns in atmosphere data line {}, found {}",
                6 + ctl.ng + ctl.nw,
                lineno + 1,
                fields.len()
            );
            atm.push_point(
                fields[0],
                fields[1],
                fields[2],
                fields[3],
                fields[4],
                fields[5],
                &fields[6..6 + ctl.ng],
                &fields[6 + ctl.ng..],
            );
        }
        ensure!(atm.np() > 0, "no data points in atmosphere data");
        Ok(atm)
    }

    pub fn from_file(ctl: &Control, path: &Path) -> Result<Self> {
        info!("Read atmospheric data: {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open atmosphere {}", path.display()))?;
        Self::from_text(ctl, &text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_text(&self, ctl: &Control) -> String {
        let mut out = String::new();
        out.push_str(
            "# $1 = time [s]\n\
             # $2 = altitude [km]\n\
             # $3 = longitude [deg]\n\
             # $4 = latitude [deg]\n\
             # $5 = pressure [hPa]\n\
             # $6 = temperature [K]\n",
        );
        for (ig, name) in ctl.emitter.iter().enumerate() {
            let _ = writeln!(out, "# ${} = {} volume mixing ratio", 7 + ig, name);
        }
        for iw in 0..ctl.nw {
            let _ = writeln!(out, "# ${} = window {} extinction [1/km]", 7 + ctl.ng + iw, iw);
        }
        for ip in 0..self.np() {
            if ip == 0 || self.time[ip] != self.time[ip - 1] {
                out.push('\n');
            }
            let _ = write!(
                out,
                "{} {} {} {} {} {}",
                self.time[ip], self.z[ip], self.lon[ip], self.lat[ip], self.p[ip], self.t[ip]
            );
            for col in &self.q {
                let _ = write!(out, " {}", col[ip]);
            }
            for col in &self.k {
                let _ = write!(out, " {}", col[ip]);
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, ctl: &Control, path: &Path) -> Result<()> {
        info!("Write atmospheric data: {}", path.display());
        fs::write(path, self.to_text(ctl))
            .with_context(|| format!("cannot create atmosphere {}", path.display()))
    }
}

/// Rebalance pressures to hydrostatic equilibrium within each constant-time
/// block, holding the level nearest the reference altitude fixed. A negative
/// reference altitude disables rebalancing.
pub fn hydrostatic(ctl: &Control, atm: &mut Atmosphere) {
    if ctl.hydz < 0.0 {
        return;
    }
    let np = atm.np();
    let mut i0 = 0;
    while i0 < np {
        let mut i1 = i0 + 1;
        while i1 < np && atm.time[i1] == atm.time[i0] {
            i1 += 1;
        }

        let mut ipr = i0;
        for ip in i0..i1 {
            if (atm.z[ip] - ctl.hydz).abs() < (atm.z[ipr] - ctl.hydz).abs() {
                ipr = ip;
            }
        }

        for ip in ipr + 1..i1 {
            let tm = 0.5 * (atm.t[ip] + atm.t[ip - 1]);
            let dz = (atm.z[ip] - atm.z[ip - 1]) * 1e3;
            atm.p[ip] = atm.p[ip - 1] * (-dz * MAIR * G0 / (RGAS * tm)).exp();
        }
        for ip in (i0..ipr).rev() {
            let tm = 0.5 * (atm.t[ip] + atm.t[ip + 1]);
            let dz = (atm.z[ip + 1] - atm.z[ip]) * 1e3;
            atm.p[ip] = atm.p[ip + 1] * (dz * MAIR * G0 / (RGAS * tm)).exp();
        }

        i0 = i1;
    }
}
