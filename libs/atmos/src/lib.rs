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

// Shared data model of the engine: physical constants, the control
// structure, atmospheric state, observation geometry, aerosol layers, and
// the small numerical helpers everything else leans on.

pub mod aerosol;
pub mod atmosphere;
pub mod constants;
pub mod control;
pub mod math;
pub mod observations;
pub mod shape;

pub use aerosol::{Aerosol, AerosolLayer};
pub use atmosphere::{hydrostatic, Atmosphere, Sample};
pub use control::{Control, ControlFile, ExtinctionBasis, RetrievalRange};
pub use observations::Observations;
pub use shape::Shape;
