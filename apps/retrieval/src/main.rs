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
    control::{Control, ControlFile},
    Aerosol, Atmosphere, Observations,
};
use forward::ForwardContext;
use log::info;
use oem::{optimal_estimation, residual_filter, RetrievalSettings};
use std::{fs, path::PathBuf};
use structopt::StructOpt;

/// Optimal-estimation retrieval over a list of measurement directories.
///
/// Each directory must contain atm_apr.tab and obs_meas.tab; the fitted
/// state, simulated radiances, cost log, and diagnostic matrices are
/// written back into it.
#[derive(Debug, StructOpt)]
struct Opt {
    /// Control file with forward-model and retrieval parameters.
    ctl: PathBuf,

    /// File listing one measurement directory per line.
    dirlist: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let cf = ControlFile::from_file(&opt.ctl)?;
    let ctl = Control::from_control_file(&cf)?;
    let set = RetrievalSettings::from_control_file(&cf, &ctl)?;
    let ctx = ForwardContext::new(&ctl)?;

    let dirlist = fs::read_to_string(&opt.dirlist)
        .with_context(|| format!("cannot open directory list {}", opt.dirlist.display()))?;

    for dir in dirlist.split_whitespace() {
        let dir = PathBuf::from(dir);
        info!("Retrieve in directory {}...", dir.display());

        let atm_apr = Atmosphere::from_file(&ctl, &dir.join("atm_apr.tab"))?;
        let mut obs_meas = Observations::from_file(&ctl, &dir.join("obs_meas.tab"))?;
        let aero = Aerosol::empty();

        // Rerun the fit while the residual filter keeps finding
        // inconsistent measurements.
        loop {
            let (_atm_i, mut obs_i) =
                optimal_estimation(&set, &ctl, &ctx, &dir, &atm_apr, &obs_meas, &aero)?;
            let nbad = residual_filter(&set, &ctl, &mut obs_meas, &mut obs_i);
            if nbad > 0 && obs_meas.valid_measurements() > 0 {
                info!("Found {} bad measurements. Redo retrieval...", nbad);
            } else {
                break;
            }
        }
    }

    info!("Retrieval done...");
    Ok(())
}
