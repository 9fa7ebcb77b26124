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
use crate::control::Control;
use anyhow::{ensure, Context, Result};
use log::info;
use std::{fmt::Write as _, fs, path::Path};

/// Observation geometry and per-channel radiance/transmittance for a set of
/// pencil beams. `rad[id][ir]` and `tau[id][ir]` are indexed channel-major.
/// A NaN radiance marks a masked or unobserved sample; the forward model
/// preserves the mask.
#[derive(Debug, Clone)]
pub struct Observations {
    pub time: Vec<f64>,
    pub obsz: Vec<f64>,
    pub obslon: Vec<f64>,
    pub obslat: Vec<f64>,
    pub vpz: Vec<f64>,
    pub vplon: Vec<f64>,
    pub vplat: Vec<f64>,
    pub rad: Vec<Vec<f64>>,
    pub tau: Vec<Vec<f64>>,
}

impl Observations {
    pub fn new(nd: usize) -> Self {
        Self {
            time: Vec::new(),
            obsz: Vec::new(),
            obslon: Vec::new(),
            obslat: Vec::new(),
            vpz: Vec::new(),
            vplon: Vec::new(),
            vplat: Vec::new(),
            rad: vec![Vec::new(); nd],
            tau: vec![Vec::new(); nd],
        }
    }

    pub fn nr(&self) -> usize {
        self.time.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_ray(
        &mut self,
        time: f64,
        obsz: f64,
        obslon: f64,
        obslat: f64,
        vpz: f64,
        vplon: f64,
        vplat: f64,
        rad: &[f64],
        tau: &[f64],
    ) {
        debug_assert_eq!(rad.len(), self.rad.len());
        debug_assert_eq!(tau.len(), self.tau.len());
        self.time.push(time);
        self.obsz.push(obsz);
        self.obslon.push(obslon);
        self.obslat.push(obslat);
        self.vpz.push(vpz);
        self.vplon.push(vplon);
        self.vplat.push(vplat);
        for (col, &v) in self.rad.iter_mut().zip(rad) {
            col.push(v);
        }
        for (col, &v) in self.tau.iter_mut().zip(tau) {
            col.push(v);
        }
    }

    /// Count of finite (unmasked) radiance samples.
    pub fn valid_measurements(&self) -> usize {
        self.rad
            .iter()
            .map(|col| col.iter().filter(|r| r.is_finite()).count())
            .sum()
    }

    pub fn from_text(ctl: &Control, text: &str) -> Result<Self> {
        let mut obs = Self::new(ctl.nd);
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("");
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<Result<_, _>>()
                .with_context(|| format!("malformed observation data in line {}", lineno + 1))?;
            if fields.is_empty() {
                continue;
            }
            ensure!(
                fields.len() == 7 + 2 * ctl.nd,
                "expected {} columns in observation data line {}, found {}",
                7 + 2 * ctl.nd,
                lineno + 1,
                fields.len()
            );
            obs.push_ray(
                fields[0],
                fields[1],
                fields[2],
                fields[3],
                fields[4],
                fields[5],
                fields[6],
                &fields[7..7 + ctl.nd],
                &fields[7 + ctl.nd..],
            );
        }
        ensure!(obs.nr() > 0, "no rays in observation data");
        Ok(obs)
    }

    pub fn from_file(ctl: &Control, path: &Path) -> Result<Self> {
        info!("Read observation data: {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open observations {}", path.display()))?;
        Self::from_text(ctl, &text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_text(&self, ctl: &Control) -> String {
        let mut out = String::new();
        out.push_str(
            "# $1 = time [s]\n\
             # $2 = observer altitude [km]\n\
             # $3 = observer longitude [deg]\n\
             # $4 = observer latitude [deg]\n\
             # $5 = view point altitude [km]\n\
             # $6 = view point longitude [deg]\n\
             # $7 = view point latitude [deg]\n",
        );
        for id in 0..ctl.nd {
            let _ = writeln!(
                out,
                "# ${} = channel {:.4}/cm: radiance [W/(m^2 sr cm^-1)]",
                8 + id,
                ctl.nu[id]
            );
        }
        for id in 0..ctl.nd {
            let _ = writeln!(
                out,
                "# ${} = channel {:.4}/cm: transmittance",
                8 + ctl.nd + id,
                ctl.nu[id]
            );
        }
        for ir in 0..self.nr() {
            if ir == 0 || self.time[ir] != self.time[ir - 1] {
                out.push('\n');
            }
            let _ = write!(
                out,
                "{} {} {} {} {} {} {}",
                self.time[ir],
                self.obsz[ir],
                self.obslon[ir],
                self.obslat[ir],
                self.vpz[ir],
                self.vplon[ir],
                self.vplat[ir]
            );
            for col in &self.rad {
                let _ = write!(out, " {}", col[ir]);
            }
            for col in &self.tau {
                let _ = write!(out, " {}", col[ir]);
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, ctl: &Control, path: &Path) -> Result<()> {
        info!("Write observation data: {}", path.display());
        fs::write(path, self.to_text(ctl))
            .with_context(|| format!("cannot create observations {}", path.display()))
    }
}
