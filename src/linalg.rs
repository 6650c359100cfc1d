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

//! Dynamically sized dense and sparse linear algebra.
//!
//! Fixed 3D quantities use `cgmath` throughout the crate; these types cover
//! what is sized at run time: stiffness assembly, haptic models and matrix
//! dumps. Binary operations check shapes and return
//! `Error::DimensionMismatch` instead of panicking.

use std::io::{BufRead, Write};
use std::ops::{Index, IndexMut};

use cgmath::{Matrix3, Vector3};
use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::geom::Real;

/// A dense, row/column indexed matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix(DMatrix<Real>);

/// Factors of a singular value decomposition, `m = u * diag(s) * v_t`.
#[derive(Clone, Debug)]
pub struct Svd {
    pub u: Matrix,
    pub singular_values: Vector,
    pub v_t: Matrix,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix(DMatrix::zeros(rows, cols))
    }

    pub fn identity(n: usize) -> Self {
        Matrix(DMatrix::identity(n, n))
    }

    pub fn from_row_slice(rows: usize, cols: usize, data: &[Real]) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::dimension_mismatch((rows, cols), (data.len(), 1)));
        }
        Ok(Matrix(DMatrix::from_row_slice(rows, cols, data)))
    }

    pub fn from_matrix3(m: &Matrix3<Real>) -> Self {
        // cgmath is column major: m[col][row]
        Matrix(DMatrix::from_fn(3, 3, |i, j| m[j][i]))
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    pub fn as_dmatrix(&self) -> &DMatrix<Real> {
        &self.0
    }

    /// Copies a 3x3 block with its top left corner at `(row, col)`.
    pub fn set_block(&mut self, row: usize, col: usize, block: &Matrix3<Real>) -> Result<()> {
        if row + 3 > self.rows() || col + 3 > self.cols() {
            return Err(Error::dimension_mismatch(self.shape(), (row + 3, col + 3)));
        }
        for i in 0..3 {
            for j in 0..3 {
                self.0[(row + i, col + j)] = block[j][i];
            }
        }
        Ok(())
    }

    /// The 3x3 block with its top left corner at `(row, col)`.
    pub fn block3(&self, row: usize, col: usize) -> Result<Matrix3<Real>> {
        if row + 3 > self.rows() || col + 3 > self.cols() {
            return Err(Error::dimension_mismatch(self.shape(), (row + 3, col + 3)));
        }
        let m = &self.0;
        Ok(Matrix3::new(
            m[(row, col)],
            m[(row + 1, col)],
            m[(row + 2, col)],
            m[(row, col + 1)],
            m[(row + 1, col + 1)],
            m[(row + 2, col + 1)],
            m[(row, col + 2)],
            m[(row + 1, col + 2)],
            m[(row + 2, col + 2)],
        ))
    }

    fn same_shape(&self, rhs: &Matrix) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(Error::dimension_mismatch(self.shape(), rhs.shape()));
        }
        Ok(())
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix> {
        self.same_shape(rhs)?;
        Ok(Matrix(&self.0 + &rhs.0))
    }

    pub fn sub(&self, rhs: &Matrix) -> Result<Matrix> {
        self.same_shape(rhs)?;
        Ok(Matrix(&self.0 - &rhs.0))
    }

    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols() != rhs.rows() {
            return Err(Error::dimension_mismatch(
                (self.cols(), rhs.cols()),
                (rhs.rows(), rhs.cols()),
            ));
        }
        Ok(Matrix(&self.0 * &rhs.0))
    }

    pub fn mul_vector(&self, v: &Vector) -> Result<Vector> {
        if self.cols() != v.len() {
            return Err(Error::dimension_mismatch((self.cols(), 1), (v.len(), 1)));
        }
        Ok(Vector(&self.0 * &v.0))
    }

    pub fn scale(&self, s: Real) -> Matrix {
        Matrix(&self.0 * s)
    }

    pub fn transpose(&self) -> Matrix {
        Matrix(self.0.transpose())
    }

    pub fn inverse(&self) -> Result<Matrix> {
        if self.rows() != self.cols() {
            return Err(Error::dimension_mismatch((self.rows(), self.rows()), self.shape()));
        }
        self.0.clone().try_inverse().map(Matrix).ok_or(Error::Singular)
    }

    pub fn svd(&self) -> Result<Svd> {
        let svd = self.0.clone().svd(true, true);
        match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => Ok(Svd {
                u: Matrix(u),
                singular_values: Vector(svd.singular_values),
                v_t: Matrix(v_t),
            }),
            _ => Err(Error::Numerical("singular value decomposition failed".to_string())),
        }
    }

    /// Moore-Penrose pseudo-inverse. Singular values below
    /// `max(rows, cols) * s_max * EPSILON` are treated as zero.
    pub fn pseudo_inverse(&self) -> Result<Matrix> {
        let svd = self.0.clone().svd(true, true);
        let s_max = svd.singular_values.iter().cloned().fold(0.0, Real::max);
        let tol = self.rows().max(self.cols()) as Real * s_max * Real::EPSILON;
        svd.pseudo_inverse(tol)
            .map(Matrix)
            .map_err(|e| Error::Numerical(e.to_string()))
    }

    /// Writes one row per line, entries tab separated in `{:.14e}`.
    pub fn save<W: Write>(&self, mut w: W) -> Result<()> {
        for i in 0..self.rows() {
            for j in 0..self.cols() {
                if j > 0 {
                    write!(w, "\t")?;
                }
                write!(w, "{:.14e}", self.0[(i, j)])?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Reads a matrix written by `save`. Any whitespace separates entries;
    /// the total count must be `rows * cols`.
    pub fn load<R: BufRead>(r: R, rows: usize, cols: usize) -> Result<Matrix> {
        let mut data = Vec::with_capacity(rows * cols);
        for line in r.lines() {
            let line = line?;
            for token in line.split_whitespace() {
                let value = token
                    .parse::<Real>()
                    .map_err(|e| Error::parse(format!("{:?}: {}", token, e)))?;
                data.push(value);
            }
        }
        if data.len() != rows * cols {
            return Err(Error::parse(format!(
                "expected {} entries for a {}x{} matrix, found {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Matrix(DMatrix::from_row_slice(rows, cols, &data)))
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = Real;

    fn index(&self, idx: (usize, usize)) -> &Real {
        &self.0[idx]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, idx: (usize, usize)) -> &mut Real {
        &mut self.0[idx]
    }
}

/// A dense column vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Vector(DVector<Real>);

impl Vector {
    pub fn zeros(n: usize) -> Self {
        Vector(DVector::zeros(n))
    }

    pub fn from_slice(data: &[Real]) -> Self {
        Vector(DVector::from_column_slice(data))
    }

    pub fn from_vector3(v: Vector3<Real>) -> Self {
        Vector::from_slice(&[v.x, v.y, v.z])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Real] {
        self.0.as_slice()
    }

    fn same_len(&self, rhs: &Vector) -> Result<()> {
        if self.len() != rhs.len() {
            return Err(Error::dimension_mismatch((self.len(), 1), (rhs.len(), 1)));
        }
        Ok(())
    }

    pub fn dot(&self, rhs: &Vector) -> Result<Real> {
        self.same_len(rhs)?;
        Ok(self.0.dot(&rhs.0))
    }

    /// Cross product; both operands must have three entries.
    pub fn cross(&self, rhs: &Vector) -> Result<Vector> {
        if self.len() != 3 || rhs.len() != 3 {
            return Err(Error::dimension_mismatch((3, 3), (self.len(), rhs.len())));
        }
        Ok(Vector(self.0.cross(&rhs.0)))
    }

    pub fn norm(&self) -> Real {
        self.0.norm()
    }

    pub fn add(&self, rhs: &Vector) -> Result<Vector> {
        self.same_len(rhs)?;
        Ok(Vector(&self.0 + &rhs.0))
    }

    pub fn sub(&self, rhs: &Vector) -> Result<Vector> {
        self.same_len(rhs)?;
        Ok(Vector(&self.0 - &rhs.0))
    }

    pub fn scale(&self, s: Real) -> Vector {
        Vector(&self.0 * s)
    }
}

impl Index<usize> for Vector {
    type Output = Real;

    fn index(&self, i: usize) -> &Real {
        &self.0[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut Real {
        &mut self.0[i]
    }
}

/// Compressed row storage.
#[derive(Clone, Debug, PartialEq)]
pub struct CrsMatrix {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<Real>,
}

impl CrsMatrix {
    /// Builds the matrix from `(row, col, value)` entries. Duplicates are
    /// summed.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        mut triplets: Vec<(usize, usize, Real)>,
    ) -> Result<Self> {
        for &(i, j, _) in &triplets {
            if i >= rows {
                return Err(Error::out_of_range("row", i, rows));
            }
            if j >= cols {
                return Err(Error::out_of_range("column", j, cols));
            }
        }
        triplets.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<Real> = Vec::with_capacity(triplets.len());
        let mut last = None;
        for (i, j, v) in triplets {
            if last == Some((i, j)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            last = Some((i, j));
            row_ptr[i + 1] += 1;
            col_idx.push(j);
            values.push(v);
        }
        for i in 0..rows {
            row_ptr[i + 1] += row_ptr[i];
        }
        Ok(CrsMatrix {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored entries of row `i` as `(col, value)`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, Real)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .cloned()
            .zip(self.values[range].iter().cloned())
    }

    pub fn get(&self, i: usize, j: usize) -> Real {
        self.row(i).find(|&(c, _)| c == j).map_or(0.0, |(_, v)| v)
    }

    pub fn mul_vector(&self, v: &Vector) -> Result<Vector> {
        if v.len() != self.cols {
            return Err(Error::dimension_mismatch((self.cols, 1), (v.len(), 1)));
        }
        let mut out = Vector::zeros(self.rows);
        for i in 0..self.rows {
            out[i] = self.row(i).map(|(j, a)| a * v[j]).sum();
        }
        Ok(out)
    }

    pub fn to_dense(&self) -> Matrix {
        let mut m = Matrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for (j, v) in self.row(i) {
                m[(i, j)] = v;
            }
        }
        m
    }

    /// Writes one `row col value` line per stored entry, 1-indexed.
    pub fn save<W: Write>(&self, mut w: W) -> Result<()> {
        for i in 0..self.rows {
            for (j, v) in self.row(i) {
                writeln!(w, "{} {} {:.14e}", i + 1, j + 1, v)?;
            }
        }
        Ok(())
    }
}
