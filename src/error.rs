// Copyright 2017 Matthew Plant. This file is part of PDFEM.
//
// PDFEM is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// PDFEM is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PDFEM. If not, see <http://www.gnu.org/licenses/>.

//! Error types for loading, linear algebra and simulation setup.
//!
//! Runtime stepping never fails: degenerate geometry and empty sample sets
//! produce zero contributions instead. Errors are reserved for malformed input
//! and ill-posed numerical requests.

use thiserror::Error;

/// Errors that can occur while building or querying a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// Matrix or vector operands have incompatible shapes.
    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Inversion of a (numerically) singular matrix was requested.
    #[error("matrix is singular")]
    Singular,

    /// An index referenced something that does not exist.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Parallel arrays of input data disagree in length.
    #[error("mismatched counts: {0}")]
    MismatchedCounts(String),

    /// A tetrahedron with (near) zero volume.
    #[error("element {0} is degenerate")]
    DegenerateElement(usize),

    /// A node that no element references has no mass.
    #[error("node {0} is not referenced by any element")]
    IsolatedNode(usize),

    /// Boundary conditions can only be attached to surface nodes.
    #[error("node {0} is not on the boundary")]
    NotBoundaryNode(usize),

    /// Integer tag that does not name a boundary condition type.
    #[error("unknown boundary condition type {0}")]
    UnknownBoundaryType(i32),

    /// Material parameters outside their physical range.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// A configuration value outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed text in a matrix file.
    #[error("parse error: {0}")]
    Parse(String),

    /// A numerical routine failed to produce a result.
    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: (usize, usize), found: (usize, usize)) -> Self {
        Self::DimensionMismatch { expected, found }
    }

    /// Creates an out-of-range index error.
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }

    /// Creates a mismatched counts error.
    pub fn mismatched(msg: impl Into<String>) -> Self {
        Self::MismatchedCounts(msg.into())
    }

    /// Creates an invalid material error.
    pub fn invalid_material(msg: impl Into<String>) -> Self {
        Self::InvalidMaterial(msg.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    mod error {
        use crate::error::Error;

        #[test]
        fn test_display() {
            let e = Error::dimension_mismatch((3, 3), (3, 4));
            assert_eq!(e.to_string(), "dimension mismatch: expected (3, 3), found (3, 4)");

            let e = Error::out_of_range("vertex", 7, 4);
            assert_eq!(e.to_string(), "vertex index 7 out of range (len 4)");

            let e = Error::UnknownBoundaryType(5);
            assert!(e.to_string().contains('5'));
        }

        #[test]
        fn test_io_conversion() {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
            let e: Error = io.into();
            assert!(matches!(e, Error::Io(_)));
        }
    }
}
