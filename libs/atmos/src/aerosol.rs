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
use std::{fs, path::Path};

/// One aerosol or cloud layer with per-channel optical coefficients [1/km]
/// and a Henyey-Greenstein asymmetry parameter per channel.
#[derive(Debug, Clone)]
pub struct AerosolLayer {
    pub bottom: f64,
    pub top: f64,
    /// Depth of the linear mixing ramp at each layer edge [km]; zero means
    /// hard edges.
    pub transition: f64,
    pub beta_e: Vec<f64>,
    pub beta_a: Vec<f64>,
    pub beta_s: Vec<f64>,
    pub g: Vec<f64>,
}

/// The aerosol layer stack referenced by line-of-sight segments.
#[derive(Debug, Clone, Default)]
pub struct Aerosol {
    pub layers: Vec<AerosolLayer>,
}

impl Aerosol {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Layer index and mixing factor at altitude `z`, or `None` outside all
    /// layers. The factor ramps 0 to 1 over the transition depth inside each
    /// layer edge.
    pub fn locate(&self, z: f64) -> Option<(usize, f64)> {
        for (il, layer) in self.layers.iter().enumerate() {
            if z < layer.bottom || z > layer.top {
                continue;
            }
            let fac = if layer.transition > 0.0 {
                ((z - layer.bottom) / layer.transition)
                    .min((layer.top - z) / layer.transition)
                    .min(1.0)
            } else {
                1.0
            };
            if fac > 0.0 {
                return Some((il, fac));
            }
        }
        None
    }

    /// Layer table: one line per layer,
    /// `bottom top transition beta_e[0..nd) beta_a[0..nd) beta_s[0..nd) g[0..nd)`.
    pub fn from_text(ctl: &Control, text: &str) -> Result<Self> {
        let mut layers = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("");
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<Result<_, _>>()
                .with_context(|| format!("malformed aerosol data in line {}", lineno + 1))?;
            if fields.is_empty() {
                continue;
            }
            ensure!(
                fields.len() == 3 + 4 * ctl.nd,
                "expected {} columns in aerosol data line {}, found {}",
                3 + 4 * ctl.nd,
                lineno + 1,
                fields.len()
            );
            ensure!(
                fields[0] < fields[1],
                "aerosol layer in line {} has bottom above top",
                lineno + 1
            );
            layers.push(AerosolLayer {
                bottom: fields[0],
                top: fields[1],
                transition: fields[2],
                beta_e: fields[3..3 + ctl.nd].to_vec(),
                beta_a: fields[3 + ctl.nd..3 + 2 * ctl.nd].to_vec(),
                beta_s: fields[3 + 2 * ctl.nd..3 + 3 * ctl.nd].to_vec(),
                g: fields[3 + 3 * ctl.nd..].to_vec(),
            });
        }
        Ok(Self { layers })
    }

    pub fn from_file(ctl: &Control, path: &Path) -> Result<Self> {
        info!("Read aerosol data: {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open aerosol data {}", path.display()))?;
        Self::from_text(ctl, &text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Control, ControlFile};
    use approx::assert_abs_diff_eq;

    fn test_ctl() -> Control {
        let cf = ControlFile::from_text("ND = 1\nNU[0] = 792\n");
        Control::from_control_file(&cf).unwrap()
    }

    #[test]
    fn mixing_factor_ramps_at_the_edges() {
        let aero = Aerosol {
            layers: vec![AerosolLayer {
                bottom: 10.0,
                top: 14.0,
                transition: 1.0,
                beta_e: vec![1e-2],
                beta_a: vec![5e-3],
                beta_s: vec![5e-3],
                g: vec![0.7],
            }],
        };
        assert!(aero.locate(9.0).is_none());
        assert!(aero.locate(10.0).is_none()); // factor zero at the hard edge
        let (il, fac) = aero.locate(10.5).unwrap();
        assert_eq!(il, 0);
        assert_abs_diff_eq!(fac, 0.5);
        assert_abs_diff_eq!(aero.locate(12.0).unwrap().1, 1.0);
        assert_abs_diff_eq!(aero.locate(13.5).unwrap().1, 0.5);
        assert!(aero.locate(15.0).is_none());
    }

    #[test]
    fn layer_table_parses() {
        let ctl = test_ctl();
        let aero =
            Aerosol::from_text(&ctl, "# cirrus deck\n8.0 12.0 0.5 2e-2 1e-2 1e-2 0.75\n").unwrap();
        assert_eq!(aero.layers.len(), 1);
        assert_abs_diff_eq!(aero.layers[0].beta_s[0], 1e-2);
        assert_abs_diff_eq!(aero.layers[0].g[0], 0.75);
    }
}
