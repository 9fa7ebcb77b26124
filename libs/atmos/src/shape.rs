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
use crate::constants::NSHAPE;
use anyhow::{bail, ensure, Context, Result};
use log::info;
use std::{fs, path::Path};

/// A sampled weighting function read from a two-column ASCII file: an
/// instrument field-of-view (altitude offset vs weight) or a channel filter
/// (wavenumber vs response).
#[derive(Debug, Clone)]
pub struct Shape {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Shape {
    pub fn from_text(text: &str) -> Result<Self> {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for line in text.lines() {
            let mut it = line.split_whitespace();
            let (Some(a), Some(b)) = (it.next(), it.next()) else {
                continue;
            };
            let (Ok(a), Ok(b)) = (a.parse::<f64>(), b.parse::<f64>()) else {
                continue;
            };
            ensure!(x.len() < NSHAPE, "too many data points in shape function");
            x.push(a);
            y.push(b);
        }
        if x.is_empty() {
            bail!("could not read any data points from shape function");
        }
        Ok(Self { x, y })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Read shape function: {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot open shape function {}", path.display()))?;
        Self::from_text(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_columns_and_skips_junk() {
        let s = Shape::from_text("# comment\n-1.0 0.25\n0 1\nnot a row\n1.0 0.25\n").unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.x, vec![-1.0, 0.0, 1.0]);
        assert_eq!(s.y, vec![0.25, 1.0, 0.25]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Shape::from_text("# nothing here\n").is_err());
    }
}
