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

/// First radiation constant [W/(m^2 sr cm^-4)].
pub const C1: f64 = 1.191_042_59e-8;

/// Second radiation constant [K/cm^-1].
pub const C2: f64 = 1.438_775_06;

/// Boltzmann constant [J/K].
pub const KB: f64 = 1.380_650_4e-23;

/// Mean Earth radius [km].
pub const RE: f64 = 6367.421;

/// Standard gravity [m/s^2].
pub const G0: f64 = 9.806_65;

/// Mean molar mass of dry air [kg/mol].
pub const MAIR: f64 = 28.964_4e-3;

/// Molar gas constant [J/(mol K)].
pub const RGAS: f64 = 8.314_472;

/// Effective solar photosphere temperature [K].
pub const T_SUN: f64 = 5780.0;

/// Solid angle of the solar disc seen from Earth [sr].
pub const OMEGA_SUN: f64 = 6.8e-5;

/// Index half-width of the ray window scanned for FOV convolution.
pub const NFOV: usize = 5;

/// Maximum number of points in a shape function file.
pub const NSHAPE: usize = 10000;

/// Maximum number of pressure levels per emissivity table.
pub const TBLNPMAX: usize = 40;

/// Maximum number of temperatures per pressure level.
pub const TBLNTMAX: usize = 30;

/// Maximum number of column densities per (pressure, temperature) cell.
pub const TBLNUMAX: usize = 320;

/// Maximum number of line-of-sight points per pencil beam.
pub const NLOSMAX: usize = 10000;

/// Number of rows in the tabulated Planck source function.
pub const NPLANCK: usize = 1201;

/// Temperature range covered by the tabulated Planck source function [K].
pub const TPLANCK_MIN: f64 = 100.0;
pub const TPLANCK_MAX: f64 = 400.0;
