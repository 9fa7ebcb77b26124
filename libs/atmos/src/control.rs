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
use anyhow::{bail, Context, Result};
use std::{collections::HashMap, fs, path::Path, path::PathBuf, str::FromStr};

/// Raw `KEY = value` pairs from a control file. Indexed keys are spelled
/// `KEY[i]`. Everything after `#` on a line is a comment.
#[derive(Debug, Clone, Default)]
pub struct ControlFile {
    values: HashMap<String, String>,
}

impl ControlFile {
    pub fn from_text(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("");
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            values.insert(key.trim().to_owned(), value.trim().to_owned());
        }
        Self { values }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open control file {}", path.display()))?;
        Ok(Self::from_text(&text))
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        match self.values.get(key) {
            Some(v) => Ok(v.as_str()),
            None => bail!("missing control parameter {}", key),
        }
    }

    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.values.get(key) {
            Some(v) => v
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("malformed control parameter {} = {}", key, v)),
            None => Ok(default),
        }
    }

    pub fn parse_indexed_or<T: FromStr>(&self, key: &str, index: usize, default: T) -> Result<T> {
        self.parse_or(&format!("{}[{}]", key, index), default)
    }

    pub fn require_indexed(&self, key: &str, index: usize) -> Result<&str> {
        self.require(&format!("{}[{}]", key, index))
    }
}

/// Which aerosol coefficient attenuates the beam in the non-scattering
/// branch of the pencil integrator.
///
/// The control key `SCA_EXT = beta_a` maps to `Extinction` (the update uses
/// the full extinction coefficient β_e); every other value maps to
/// `Absorption` (the update uses β_a alone). This mapping reproduces the
/// long-standing behavior of the table-driven forward model and is pinned
/// by tests here and in the pencil integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtinctionBasis {
    Absorption,
    Extinction,
}

impl ExtinctionBasis {
    pub fn from_key(value: &str) -> Self {
        if value == "beta_a" {
            ExtinctionBasis::Extinction
        } else {
            ExtinctionBasis::Absorption
        }
    }
}

/// Altitude range over which a quantity is retrieved. Disabled unless
/// `zmin >= 0`.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRange {
    pub zmin: f64,
    pub zmax: f64,
}

impl RetrievalRange {
    pub fn contains(&self, z: f64) -> bool {
        self.zmin >= 0.0 && z >= self.zmin && z <= self.zmax
    }

    pub fn enabled(&self) -> bool {
        self.zmin >= 0.0
    }
}

/// Immutable per-run forward-model configuration.
#[derive(Debug, Clone)]
pub struct Control {
    /// Emitters (trace gases) with emissivity tables.
    pub ng: usize,
    pub emitter: Vec<String>,
    /// Radiometric channels and their center wavenumbers [cm^-1].
    pub nd: usize,
    pub nu: Vec<f64>,
    /// Extinction windows and the window used by each channel.
    pub nw: usize,
    pub window: Vec<usize>,

    /// Base path of the emissivity table and filter files.
    pub tblbase: String,

    /// Reference altitude for hydrostatic rebalancing [km]; negative = off.
    pub hydz: f64,

    /// Continuum switches.
    pub ctm_co2: bool,
    pub ctm_h2o: bool,
    pub ctm_n2: bool,
    pub ctm_o2: bool,

    /// Raytracing step controls [km].
    pub rayds: f64,
    pub raydz: f64,

    /// Field-of-view shape file; `None` = infinitesimal FOV.
    pub fov: Option<PathBuf>,

    /// Scattering: source order, number of aerosol models, attenuation basis.
    pub sca_mult: u32,
    pub sca_n: usize,
    pub sca_ext: ExtinctionBasis,

    /// Emit brightness temperatures instead of radiances.
    pub write_bbt: bool,

    /// Retrieval altitude ranges per quantity.
    pub ret_p: RetrievalRange,
    pub ret_t: RetrievalRange,
    pub ret_q: Vec<RetrievalRange>,
    pub ret_k: Vec<RetrievalRange>,

    /// Emitter indices of the continuum gases, when present.
    pub ig_co2: Option<usize>,
    pub ig_h2o: Option<usize>,
}

impl Control {
    pub fn from_control_file(cf: &ControlFile) -> Result<Self> {
        let ng: usize = cf.parse_or("NG", 0)?;
        let mut emitter = Vec::with_capacity(ng);
        for ig in 0..ng {
            emitter.push(cf.require_indexed("EMITTER", ig)?.to_owned());
        }

        let nd: usize = cf.parse_or("ND", 0)?;
        let mut nu = Vec::with_capacity(nd);
        for id in 0..nd {
            nu.push(
                cf.require_indexed("NU", id)?
                    .parse::<f64>()
                    .context("malformed channel wavenumber")?,
            );
        }

        let nw: usize = cf.parse_or("NW", 0)?;
        let mut window = Vec::with_capacity(nd);
        for id in 0..nd {
            let iw: usize = cf.parse_indexed_or("WINDOW", id, 0)?;
            if nw > 0 && iw >= nw {
                bail!("WINDOW[{}] = {} out of range (NW = {})", id, iw, nw);
            }
            window.push(iw);
        }

        let mut ret_q = Vec::with_capacity(ng);
        for ig in 0..ng {
            ret_q.push(RetrievalRange {
                zmin: cf.parse_indexed_or("RETQ_ZMIN", ig, -999.0)?,
                zmax: cf.parse_indexed_or("RETQ_ZMAX", ig, -999.0)?,
            });
        }
        let mut ret_k = Vec::with_capacity(nw);
        for iw in 0..nw {
            ret_k.push(RetrievalRange {
                zmin: cf.parse_indexed_or("RETK_ZMIN", iw, -999.0)?,
                zmax: cf.parse_indexed_or("RETK_ZMAX", iw, -999.0)?,
            });
        }

        let fov = match cf.str_or("FOV", "-").as_str() {
            "-" => None,
            path => Some(PathBuf::from(path)),
        };

        let ig_co2 = emitter.iter().position(|e| e.eq_ignore_ascii_case("CO2"));
        let ig_h2o = emitter.iter().position(|e| e.eq_ignore_ascii_case("H2O"));

        Ok(Self {
            ig_co2,
            ig_h2o,
            ng,
            emitter,
            nd,
            nu,
            nw,
            window,
            tblbase: cf.str_or("TBLBASE", "-"),
            hydz: cf.parse_or("HYDZ", -999.0)?,
            ctm_co2: cf.parse_or("CTM_CO2", 1i64)? != 0,
            ctm_h2o: cf.parse_or("CTM_H2O", 1i64)? != 0,
            ctm_n2: cf.parse_or("CTM_N2", 1i64)? != 0,
            ctm_o2: cf.parse_or("CTM_O2", 1i64)? != 0,
            rayds: cf.parse_or("RAYDS", 10.0)?,
            raydz: cf.parse_or("RAYDZ", 0.5)?,
            fov,
            sca_mult: cf.parse_or("SCA_MULT", 1u32)?,
            sca_n: cf.parse_or("SCA_N", 0usize)?,
            sca_ext: ExtinctionBasis::from_key(&cf.str_or("SCA_EXT", "beta_a")),
            write_bbt: cf.parse_or("WRITE_BBT", 0i64)? != 0,
            ret_p: RetrievalRange {
                zmin: cf.parse_or("RETP_ZMIN", -999.0)?,
                zmax: cf.parse_or("RETP_ZMAX", -999.0)?,
            },
            ret_t: RetrievalRange {
                zmin: cf.parse_or("RETT_ZMIN", -999.0)?,
                zmax: cf.parse_or("RETT_ZMAX", -999.0)?,
            },
            ret_q,
            ret_k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTL: &str = "\
# channels
ND = 2
NU[0] = 792.0000   # CO2 laser line
NU[1] = 832.0000
NG = 2
EMITTER[0] = CO2
EMITTER[1] = O3
NW = 1
WINDOW[0] = 0
WINDOW[1] = 0
TBLBASE = tables/clim
RETT_ZMIN = 10
RETT_ZMAX = 60
";

    #[test]
    fn parses_keys_and_defaults() {
        let cf = ControlFile::from_text(CTL);
        let ctl = Control::from_control_file(&cf).unwrap();
        assert_eq!(ctl.nd, 2);
        assert_eq!(ctl.nu, vec![792.0, 832.0]);
        assert_eq!(ctl.emitter, vec!["CO2", "O3"]);
        assert_eq!(ctl.ig_co2, Some(0));
        assert_eq!(ctl.ig_h2o, None);
        assert!(ctl.fov.is_none());
        assert!(ctl.ctm_co2);
        assert!(!ctl.write_bbt);
        assert!(ctl.ret_t.contains(30.0));
        assert!(!ctl.ret_t.contains(5.0));
        assert!(!ctl.ret_p.enabled());
        assert_eq!(ctl.sca_n, 0);
    }

    #[test]
    fn missing_indexed_key_is_an_error() {
        let cf = ControlFile::from_text("ND = 1\n");
        assert!(Control::from_control_file(&cf).is_err());
    }

    #[test]
    fn window_out_of_range_is_an_error() {
        let cf = ControlFile::from_text("ND = 1\nNU[0] = 800\nNW = 1\nWINDOW[0] = 3\n");
        assert!(Control::from_control_file(&cf).is_err());
    }

    #[test]
    fn extinction_basis_key_mapping() {
        // The literal key beta_a selects the beta_e-based update; anything
        // else selects the beta_a-based update.
        assert_eq!(
            ExtinctionBasis::from_key("beta_a"),
            ExtinctionBasis::Extinction
        );
        assert_eq!(
            ExtinctionBasis::from_key("beta_e"),
            ExtinctionBasis::Absorption
        );
        assert_eq!(ExtinctionBasis::from_key(""), ExtinctionBasis::Absorption);
    }
}
