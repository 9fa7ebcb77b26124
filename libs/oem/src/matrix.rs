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
use crate::pack::{measurement_map, Quantity, StateMap};
use anyhow::{Context, Result};
use atmos::{control::Control, Atmosphere, Observations};
use log::info;
use nalgebra::DMatrix;
use std::{fmt::Write as _, fs, path::Path};

/// Which vector an axis of a diagnostic matrix runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixAxis {
    State,
    Measurement,
}

/// Element order of the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOrder {
    RowMajor,
    ColumnMajor,
}

fn quantity_name(ctl: &Control, q: Quantity) -> String {
    match q {
        Quantity::Pressure => "PRESSURE".to_owned(),
        Quantity::Temperature => "TEMPERATURE".to_owned(),
        Quantity::Gas(ig) => ctl.emitter[ig].clone(),
        Quantity::Window(iw) => format!("EXTINCT_WINDOW{}", iw),
    }
}

// One axis annotation: label plus (time, z, lon, lat) of the element.
struct AxisLabels {
    label: Vec<String>,
    coord: Vec<[f64; 4]>,
}

fn axis_labels(
    axis: MatrixAxis,
    ctl: &Control,
    atm: &Atmosphere,
    obs: &Observations,
    map: &StateMap,
) -> AxisLabels {
    match axis {
        MatrixAxis::State => {
            let label = map.iqa.iter().map(|&q| quantity_name(ctl, q)).collect();
            let coord = map
                .ipa
                .iter()
                .map(|&ip| [atm.time[ip], atm.z[ip], atm.lon[ip], atm.lat[ip]])
                .collect();
            AxisLabels { label, coord }
        }
        MatrixAxis::Measurement => {
            let mm = measurement_map(ctl, obs);
            let label = mm
                .iter()
                .map(|&(_, id)| format!("{:.4}", ctl.nu[id]))
                .collect();
            let coord = mm
                .iter()
                .map(|&(ir, _)| [obs.time[ir], obs.vpz[ir], obs.vplon[ir], obs.vplat[ir]])
                .collect();
            AxisLabels { label, coord }
        }
    }
}

/// Write a diagnostic matrix with full row/column annotations so elements
/// can be traced back to grid points and measurements.
#[allow(clippy::too_many_arguments)]
pub fn write_matrix(
    dir: &Path,
    name: &str,
    ctl: &Control,
    matrix: &DMatrix<f64>,
    atm: &Atmosphere,
    obs: &Observations,
    map: &StateMap,
    rows: MatrixAxis,
    cols: MatrixAxis,
    order: MatrixOrder,
) -> Result<()> {
    let path = dir.join(name);
    info!("Write matrix data: {}", path.display());

    let row_labels = axis_labels(rows, ctl, atm, obs, map);
    let col_labels = axis_labels(cols, ctl, atm, obs, map);

    let mut out = String::new();
    out.push_str(
        "# $1 = row index\n\
         # $2 = row quantity/channel\n\
         # $3 = row time [s]\n\
         # $4 = row altitude [km]\n\
         # $5 = row longitude [deg]\n\
         # $6 = row latitude [deg]\n\
         # $7 = column index\n\
         # $8 = column quantity/channel\n\
         # $9 = column time [s]\n\
         # $10 = column altitude [km]\n\
         # $11 = column longitude [deg]\n\
         # $12 = column latitude [deg]\n\
         # $13 = matrix element\n\n",
    );

    let mut emit = |i: usize, j: usize| {
        let rc = &row_labels.coord[i];
        let cc = &col_labels.coord[j];
        let _ = writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {} {}",
            i,
            row_labels.label[i],
            rc[0],
            rc[1],
            rc[2],
            rc[3],
            j,
            col_labels.label[j],
            cc[0],
            cc[1],
            cc[2],
            cc[3],
            matrix[(i, j)]
        );
    };
    match order {
        MatrixOrder::RowMajor => {
            for i in 0..matrix.nrows() {
                for j in 0..matrix.ncols() {
                    emit(i, j);
                }
            }
        }
        MatrixOrder::ColumnMajor => {
            for j in 0..matrix.ncols() {
                for i in 0..matrix.nrows() {
                    emit(i, j);
                }
            }
        }
    }

    fs::write(&path, out).with_context(|| format!("cannot create matrix {}", path.display()))
}
