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
use anyhow::Result;
use atmos::{
    control::{Control, ControlFile},
    Aerosol, Atmosphere, Observations,
};
use forward::{formod, ForwardContext};
use std::path::PathBuf;
use structopt::StructOpt;

/// Run the forward model once: simulate the radiances and transmittances a
/// spectrometer would measure for a given atmosphere and viewing geometry.
#[derive(Debug, StructOpt)]
struct Opt {
    /// Control file with forward-model parameters.
    ctl: PathBuf,

    /// Atmosphere table.
    atm: PathBuf,

    /// Observation geometry table.
    obs: PathBuf,

    /// Output observation table.
    out: PathBuf,

    /// Optional aerosol layer table.
    #[structopt(long)]
    aero: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let cf = ControlFile::from_file(&opt.ctl)?;
    let ctl = Control::from_control_file(&cf)?;
    let ctx = ForwardContext::new(&ctl)?;

    let mut atm = Atmosphere::from_file(&ctl, &opt.atm)?;
    let mut obs = Observations::from_file(&ctl, &opt.obs)?;
    let aero = match &opt.aero {
        Some(path) => Aerosol::from_file(&ctl, path)?,
        None => Aerosol::empty(),
    };

    formod(&ctx, &ctl, &mut atm, &mut obs, &aero)?;
    obs.write(&ctl, &opt.out)?;

    Ok(())
}
