//! Byte matrices that may exceed the size of a single buffer.
//!
//! A [`WideByteMatrix`] is a fixed-size `rows * columns` matrix of bytes.
//! The default layout is row-major in a single buffer.
//! When the matrix is too large for a single buffer, it is split into buffers that each hold a whole number of rows.
//! There are also specializations for a matrix where every byte has the same value and for a transposed view of another matrix.
//!
//! Rows and columns can be permuted in place by following the cycles of the permutation.

use crate::support;
use crate::{Error, Result};

use simple_sds::raw_vector::{AccessRaw, RawVector};

use rayon::prelude::*;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Maximum number of elements in a single buffer.
pub const MAX_SINGLE: usize = (i32::MAX - 10) as usize;

/// Translates `(row, column)` into `(buffer, offset)` for a matrix stored in buffers of `rows_per_buffer` rows.
///
/// # Examples
///
/// ```
/// use genostore::matrix::translate;
///
/// assert_eq!(translate(0, 3, 10, 4), (0, 3));
/// assert_eq!(translate(5, 2, 10, 4), (1, 12));
/// ```
#[inline]
pub fn translate(row: usize, column: usize, columns: usize, rows_per_buffer: usize) -> (usize, usize) {
    (row / rows_per_buffer, (row % rows_per_buffer) * columns + column)
}

//-----------------------------------------------------------------------------

// In-place permutation using a single temporary item.
trait Permutable {
    // Copies the item to the temporary.
    fn save(&mut self, index: usize);

    fn copy(&mut self, src: usize, dest: usize);

    // Copies the temporary to the item.
    fn restore(&mut self, index: usize);
}

// Moves item `source(i)` to position `i` for all `i`. `source` must be a permutation of `0..len`.
fn follow_cycles<P: Permutable, F: Fn(usize) -> usize>(target: &mut P, len: usize, source: F) {
    let mut done = RawVector::with_len(len, false);
    for current in 0..len {
        if done.bit(current) {
            continue;
        }
        done.set_bit(current, true);
        let mut src = source(current);
        if src == current {
            continue;
        }
        target.save(current);
        let mut dest = current;
        while src != current {
            target.copy(src, dest);
            done.set_bit(src, true);
            dest = src;
            src = source(dest);
        }
        target.restore(dest);
    }
}

fn check_permutation(new_indices: &[usize], len: usize, what: &str) -> Result<()> {
    if new_indices.len() != len {
        return Err(Error::invalid(format!(
            "WideByteMatrix: Index array length {} does not match the number of {} {}", new_indices.len(), what, len
        )));
    }
    let mut found = RawVector::with_len(len, false);
    for &index in new_indices.iter() {
        if index >= len || found.bit(index) {
            return Err(Error::invalid(format!("WideByteMatrix: The {} indices are not a permutation", what)));
        }
        found.set_bit(index, true);
    }
    Ok(())
}

//-----------------------------------------------------------------------------

// Row-major storage shared by single and multiple buffers.
trait RowMajor {
    fn columns(&self) -> usize;

    fn row_slice(&self, row: usize) -> &[u8];

    fn row_slice_mut(&mut self, row: usize) -> &mut [u8];

    fn buffers_mut(&mut self) -> Vec<&mut [u8]>;
}

struct RowPermuter<'a, M: RowMajor> {
    matrix: &'a mut M,
    temp: Vec<u8>,
}

impl<'a, M: RowMajor> Permutable for RowPermuter<'a, M> {
    fn save(&mut self, index: usize) {
        self.temp.copy_from_slice(self.matrix.row_slice(index));
    }

    // Rows may be in different buffers, so the copy goes through a second temporary.
    fn copy(&mut self, src: usize, dest: usize) {
        let row = self.matrix.row_slice(src).to_vec();
        self.matrix.row_slice_mut(dest).copy_from_slice(&row);
    }

    fn restore(&mut self, index: usize) {
        self.matrix.row_slice_mut(index).copy_from_slice(&self.temp);
    }
}

struct ColumnPermuter<'a, M: RowMajor> {
    matrix: &'a mut M,
    rows: usize,
    temp: Vec<u8>,
}

impl<'a, M: RowMajor> Permutable for ColumnPermuter<'a, M> {
    fn save(&mut self, index: usize) {
        for row in 0..self.rows {
            self.temp[row] = self.matrix.row_slice(row)[index];
        }
    }

    fn copy(&mut self, src: usize, dest: usize) {
        for row in 0..self.rows {
            let slice = self.matrix.row_slice_mut(row);
            slice[dest] = slice[src];
        }
    }

    fn restore(&mut self, index: usize) {
        for row in 0..self.rows {
            self.matrix.row_slice_mut(row)[index] = self.temp[row];
        }
    }
}

struct ElementPermuter<'a> {
    data: &'a mut [u8],
    temp: u8,
}

impl<'a> Permutable for ElementPermuter<'a> {
    fn save(&mut self, index: usize) {
        self.temp = self.data[index];
    }

    fn copy(&mut self, src: usize, dest: usize) {
        self.data[dest] = self.data[src];
    }

    fn restore(&mut self, index: usize) {
        self.data[index] = self.temp;
    }
}

fn reorder_row_major<M: RowMajor>(matrix: &mut M, rows: usize, new_indices: &[usize]) -> Result<()> {
    check_permutation(new_indices, rows, "rows")?;
    let temp = vec![0; matrix.columns()];
    let mut permuter = RowPermuter { matrix: matrix, temp: temp };
    follow_cycles(&mut permuter, rows, |dest| new_indices[dest]);
    Ok(())
}

fn reorder_columns_row_major<M: RowMajor>(matrix: &mut M, rows: usize, new_indices: &[usize]) -> Result<()> {
    check_permutation(new_indices, matrix.columns(), "columns")?;
    let columns = matrix.columns();
    let mut permuter = ColumnPermuter { matrix: matrix, rows: rows, temp: vec![0; rows] };
    follow_cycles(&mut permuter, columns, |dest| new_indices[dest]);
    Ok(())
}

//-----------------------------------------------------------------------------

/// A row-major matrix in a single buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleBuffer {
    rows: usize,
    columns: usize,
    data: Vec<u8>,
}

impl SingleBuffer {
    fn new(rows: usize, columns: usize) -> Self {
        SingleBuffer {
            rows: rows,
            columns: columns,
            data: vec![0; rows * columns],
        }
    }

    /// Transposes the matrix in place.
    ///
    /// The element at `(row, column)` moves to `(column, row)`, and the dimensions are swapped.
    pub fn transpose_in_place(&mut self) {
        let (rows, columns) = (self.rows, self.columns);
        let len = self.data.len();
        let mut permuter = ElementPermuter { data: &mut self.data, temp: 0 };
        // Destination `c * rows + r` takes the element from `r * columns + c`.
        follow_cycles(&mut permuter, len, |dest| (dest % rows) * columns + dest / rows);
        self.rows = columns;
        self.columns = rows;
    }

    /// Returns the underlying buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl RowMajor for SingleBuffer {
    fn columns(&self) -> usize {
        self.columns
    }

    fn row_slice(&self, row: usize) -> &[u8] {
        &self.data[row * self.columns..(row + 1) * self.columns]
    }

    fn row_slice_mut(&mut self, row: usize) -> &mut [u8] {
        &mut self.data[row * self.columns..(row + 1) * self.columns]
    }

    fn buffers_mut(&mut self) -> Vec<&mut [u8]> {
        vec![&mut self.data]
    }
}

/// A row-major matrix split into buffers of `rows_per_buffer` rows.
///
/// The last buffer may be shorter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiBuffer {
    rows: usize,
    columns: usize,
    rows_per_buffer: usize,
    buffers: Vec<Vec<u8>>,
}

impl MultiBuffer {
    fn new(rows: usize, columns: usize, buffer_limit: usize) -> Self {
        let rows_per_buffer = buffer_limit / columns;
        let mut buffers = Vec::new();
        let mut remaining = rows;
        while remaining > 0 {
            let buffer_rows = remaining.min(rows_per_buffer);
            buffers.push(vec![0; buffer_rows * columns]);
            remaining -= buffer_rows;
        }
        MultiBuffer {
            rows: rows,
            columns: columns,
            rows_per_buffer: rows_per_buffer,
            buffers: buffers,
        }
    }

    /// Returns the number of rows in each buffer.
    #[inline]
    pub fn rows_per_buffer(&self) -> usize {
        self.rows_per_buffer
    }

    /// Returns the number of buffers.
    #[inline]
    pub fn buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Translates `(row, column)` into `(buffer, offset)`.
    #[inline]
    pub fn translate(&self, row: usize, column: usize) -> (usize, usize) {
        translate(row, column, self.columns, self.rows_per_buffer)
    }
}

impl RowMajor for MultiBuffer {
    fn columns(&self) -> usize {
        self.columns
    }

    fn row_slice(&self, row: usize) -> &[u8] {
        let (buffer, offset) = self.translate(row, 0);
        &self.buffers[buffer][offset..offset + self.columns]
    }

    fn row_slice_mut(&mut self, row: usize) -> &mut [u8] {
        let (buffer, offset) = self.translate(row, 0);
        let columns = self.columns;
        &mut self.buffers[buffer][offset..offset + columns]
    }

    fn buffers_mut(&mut self) -> Vec<&mut [u8]> {
        self.buffers.iter_mut().map(|buffer| buffer.as_mut_slice()).collect()
    }
}

/// A matrix where every byte has the same value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantMatrix {
    rows: usize,
    columns: usize,
    value: u8,
}

impl ConstantMatrix {
    /// Returns the value of every byte.
    #[inline]
    pub fn value(&self) -> u8 {
        self.value
    }
}

//-----------------------------------------------------------------------------

/// A fixed-size byte matrix.
///
/// Indexes out of bounds are reported as [`Error::InvalidArgument`].
/// A [`WideByteMatrix::Constant`] rejects writes to individual elements with [`Error::UnsupportedOperation`].
///
/// # Examples
///
/// ```
/// use genostore::matrix::MatrixBuilder;
///
/// let mut matrix = MatrixBuilder::new(3, 4).build().unwrap();
/// matrix.set(1, 2, 9).unwrap();
/// matrix.reorder_rows(&[2, 0, 1]).unwrap();
/// assert_eq!(matrix.get(2, 2).unwrap(), 9);
/// assert_eq!(matrix.column(2).unwrap(), vec![0, 0, 9]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WideByteMatrix {
    Single(SingleBuffer),
    Multi(MultiBuffer),
    Constant(ConstantMatrix),
    /// A view with rows and columns swapped.
    Transposed(Box<WideByteMatrix>),
}

impl WideByteMatrix {
    /// Returns the number of rows.
    pub fn rows(&self) -> usize {
        match self {
            WideByteMatrix::Single(m) => m.rows,
            WideByteMatrix::Multi(m) => m.rows,
            WideByteMatrix::Constant(m) => m.rows,
            WideByteMatrix::Transposed(inner) => inner.columns(),
        }
    }

    /// Returns the number of columns.
    pub fn columns(&self) -> usize {
        match self {
            WideByteMatrix::Single(m) => m.columns,
            WideByteMatrix::Multi(m) => m.columns,
            WideByteMatrix::Constant(m) => m.columns,
            WideByteMatrix::Transposed(inner) => inner.rows(),
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.rows() * self.columns()
    }

    /// Returns `true` if the matrix has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if iterating over the columns in the inner loop follows the memory layout.
    pub fn is_column_inner_loop(&self) -> bool {
        !matches!(self, WideByteMatrix::Transposed(_))
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows() {
            return Err(Error::invalid(format!("WideByteMatrix: Row {} out of bounds (rows {})", row, self.rows())));
        }
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.columns() {
            return Err(Error::invalid(format!("WideByteMatrix: Column {} out of bounds (columns {})", column, self.columns())));
        }
        Ok(())
    }

    // Returns the element without bounds checks.
    fn element(&self, row: usize, column: usize) -> u8 {
        match self {
            WideByteMatrix::Single(m) => m.data[row * m.columns + column],
            WideByteMatrix::Multi(m) => {
                let (buffer, offset) = m.translate(row, column);
                m.buffers[buffer][offset]
            }
            WideByteMatrix::Constant(m) => m.value,
            WideByteMatrix::Transposed(inner) => inner.element(column, row),
        }
    }

    fn element_mut(&mut self, row: usize, column: usize) -> Result<&mut u8> {
        match self {
            WideByteMatrix::Single(m) => Ok(&mut m.data[row * m.columns + column]),
            WideByteMatrix::Multi(m) => {
                let (buffer, offset) = m.translate(row, column);
                Ok(&mut m.buffers[buffer][offset])
            }
            WideByteMatrix::Constant(_) => Err(Error::unsupported("WideByteMatrix: Cannot set individual elements of a constant matrix")),
            WideByteMatrix::Transposed(inner) => inner.element_mut(column, row),
        }
    }
}

//-----------------------------------------------------------------------------

/// Element and row access.
impl WideByteMatrix {
    /// Returns the byte at `(row, column)`.
    pub fn get(&self, row: usize, column: usize) -> Result<u8> {
        self.check_row(row)?;
        self.check_column(column)?;
        Ok(self.element(row, column))
    }

    /// Sets the byte at `(row, column)`.
    pub fn set(&mut self, row: usize, column: usize, value: u8) -> Result<()> {
        self.check_row(row)?;
        self.check_column(column)?;
        *self.element_mut(row, column)? = value;
        Ok(())
    }

    /// Copies `src` to the row starting from the given column.
    pub fn set_row_from(&mut self, row: usize, src: &[u8], start_column: usize) -> Result<()> {
        self.check_row(row)?;
        if start_column + src.len() > self.columns() {
            return Err(Error::invalid(format!(
                "WideByteMatrix: Columns {}..{} out of bounds (columns {})", start_column, start_column + src.len(), self.columns()
            )));
        }
        match self {
            WideByteMatrix::Single(m) => m.row_slice_mut(row)[start_column..start_column + src.len()].copy_from_slice(src),
            WideByteMatrix::Multi(m) => m.row_slice_mut(row)[start_column..start_column + src.len()].copy_from_slice(src),
            WideByteMatrix::Constant(_) => return Err(Error::unsupported("WideByteMatrix: Cannot set a row of a constant matrix")),
            WideByteMatrix::Transposed(inner) => {
                for (i, &value) in src.iter().enumerate() {
                    *inner.element_mut(start_column + i, row)? = value;
                }
            }
        }
        Ok(())
    }

    /// Sets every byte to the value.
    pub fn set_all(&mut self, value: u8) {
        match self {
            WideByteMatrix::Single(m) => m.data.fill(value),
            WideByteMatrix::Multi(m) => {
                for buffer in m.buffers.iter_mut() {
                    buffer.fill(value);
                }
            }
            WideByteMatrix::Constant(m) => m.value = value,
            WideByteMatrix::Transposed(inner) => inner.set_all(value),
        }
    }

    /// Returns a copy of the row.
    pub fn row(&self, row: usize) -> Result<Vec<u8>> {
        self.check_row(row)?;
        match self {
            WideByteMatrix::Single(m) => Ok(m.row_slice(row).to_vec()),
            WideByteMatrix::Multi(m) => Ok(m.row_slice(row).to_vec()),
            WideByteMatrix::Constant(m) => Ok(vec![m.value; m.columns]),
            WideByteMatrix::Transposed(inner) => inner.column(row),
        }
    }

    /// Returns a copy of columns `start..end` of the row.
    pub fn column_range(&self, row: usize, start: usize, end: usize) -> Result<Vec<u8>> {
        self.check_row(row)?;
        if start > end || end > self.columns() {
            return Err(Error::invalid(format!("WideByteMatrix: Invalid column range {}..{} (columns {})", start, end, self.columns())));
        }
        match self {
            WideByteMatrix::Single(m) => Ok(m.row_slice(row)[start..end].to_vec()),
            WideByteMatrix::Multi(m) => Ok(m.row_slice(row)[start..end].to_vec()),
            _ => Ok((start..end).map(|column| self.element(row, column)).collect()),
        }
    }

    /// Returns a copy of the column.
    pub fn column(&self, column: usize) -> Result<Vec<u8>> {
        self.check_column(column)?;
        match self {
            WideByteMatrix::Transposed(inner) => inner.row(column),
            _ => Ok((0..self.rows()).map(|row| self.element(row, column)).collect()),
        }
    }
}

//-----------------------------------------------------------------------------

/// Bulk operations.
impl WideByteMatrix {
    /// Permutes the rows in place so that new row `i` is old row `new_indices[i]`.
    ///
    /// Returns [`Error::InvalidArgument`] if `new_indices` is not a permutation of the rows.
    pub fn reorder_rows(&mut self, new_indices: &[usize]) -> Result<()> {
        let rows = self.rows();
        match self {
            WideByteMatrix::Single(m) => reorder_row_major(m, rows, new_indices),
            WideByteMatrix::Multi(m) => reorder_row_major(m, rows, new_indices),
            WideByteMatrix::Constant(_) => check_permutation(new_indices, rows, "rows"),
            WideByteMatrix::Transposed(inner) => inner.reorder_columns(new_indices),
        }
    }

    /// Permutes the columns in place so that new column `i` is old column `new_indices[i]`.
    ///
    /// Returns [`Error::InvalidArgument`] if `new_indices` is not a permutation of the columns.
    pub fn reorder_columns(&mut self, new_indices: &[usize]) -> Result<()> {
        let rows = self.rows();
        match self {
            WideByteMatrix::Single(m) => reorder_columns_row_major(m, rows, new_indices),
            WideByteMatrix::Multi(m) => reorder_columns_row_major(m, rows, new_indices),
            WideByteMatrix::Constant(m) => check_permutation(new_indices, m.columns, "columns"),
            WideByteMatrix::Transposed(inner) => inner.reorder_rows(new_indices),
        }
    }

    /// Replaces every heterozygous byte (the two half-bytes differ) with the value.
    pub fn set_hets_to(&mut self, value: u8) {
        let buffers = match self {
            WideByteMatrix::Single(m) => m.buffers_mut(),
            WideByteMatrix::Multi(m) => m.buffers_mut(),
            WideByteMatrix::Constant(m) => {
                if support::is_heterozygous(m.value) {
                    m.value = value;
                }
                return;
            }
            WideByteMatrix::Transposed(inner) => return inner.set_hets_to(value),
        };
        for buffer in buffers {
            buffer.par_iter_mut().filter(|byte| support::is_heterozygous(**byte)).for_each(|byte| *byte = value);
        }
    }

    /// Returns an iterator over the bytes in row-major order.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        let columns = self.columns();
        (0..self.len()).map(move |i| self.element(i / columns, i % columns))
    }

    /// Returns an iterator over the bytes of the row.
    pub fn row_bytes(&self, row: usize) -> Result<impl Iterator<Item = u8> + '_> {
        self.check_row(row)?;
        Ok((0..self.columns()).map(move |column| self.element(row, column)))
    }

    /// Returns a parallel iterator over the bytes in row-major order.
    pub fn par_bytes(&self) -> impl IndexedParallelIterator<Item = u8> + '_ {
        let columns = self.columns();
        (0..self.len()).into_par_iter().map(move |i| self.element(i / columns, i % columns))
    }

    /// Returns a parallel iterator over the bytes of the row.
    pub fn par_row(&self, row: usize) -> Result<impl IndexedParallelIterator<Item = u8> + '_> {
        self.check_row(row)?;
        Ok((0..self.columns()).into_par_iter().map(move |column| self.element(row, column)))
    }
}

//-----------------------------------------------------------------------------

/// A builder for [`WideByteMatrix`].
///
/// # Examples
///
/// ```
/// use genostore::matrix::{MatrixBuilder, WideByteMatrix};
///
/// let matrix = MatrixBuilder::new(2, 3).build().unwrap();
/// assert!(matches!(matrix, WideByteMatrix::Single(_)));
///
/// let matrix = MatrixBuilder::new(10, 4).buffer_limit(12).build().unwrap();
/// if let WideByteMatrix::Multi(m) = &matrix {
///     assert_eq!(m.rows_per_buffer(), 3);
///     assert_eq!(m.buffers(), 4);
/// } else {
///     panic!("Expected multiple buffers");
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixBuilder {
    rows: usize,
    columns: usize,
    buffer_limit: usize,
}

impl MatrixBuilder {
    /// Creates a builder for a `rows * columns` matrix.
    pub fn new(rows: usize, columns: usize) -> Self {
        MatrixBuilder {
            rows: rows,
            columns: columns,
            buffer_limit: MAX_SINGLE,
        }
    }

    /// Sets the maximum number of elements in a single buffer.
    pub fn buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Builds a zero-filled matrix.
    ///
    /// Uses a single buffer when the matrix fits in one, and multiple buffers otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the number of elements overflows or a single row does not fit in a buffer.
    pub fn build(&self) -> Result<WideByteMatrix> {
        let len = self.rows.checked_mul(self.columns).ok_or_else(|| {
            Error::invalid(format!("MatrixBuilder: Matrix size {} x {} overflows", self.rows, self.columns))
        })?;
        if len <= self.buffer_limit {
            return Ok(WideByteMatrix::Single(SingleBuffer::new(self.rows, self.columns)));
        }
        if self.columns > self.buffer_limit {
            return Err(Error::invalid(format!(
                "MatrixBuilder: A row of {} columns does not fit in a buffer of {} elements", self.columns, self.buffer_limit
            )));
        }
        Ok(WideByteMatrix::Multi(MultiBuffer::new(self.rows, self.columns, self.buffer_limit)))
    }

    /// Builds a `rows * columns` transposed view of a `columns * rows` matrix.
    pub fn build_transposed(&self) -> Result<WideByteMatrix> {
        let inner = MatrixBuilder {
            rows: self.columns,
            columns: self.rows,
            buffer_limit: self.buffer_limit,
        }.build()?;
        Ok(Self::transposed(inner))
    }

    /// Returns a `rows * columns` matrix where every byte has the value.
    pub fn constant(rows: usize, columns: usize, value: u8) -> WideByteMatrix {
        WideByteMatrix::Constant(ConstantMatrix {
            rows: rows,
            columns: columns,
            value: value,
        })
    }

    /// Returns a transposed view of the matrix.
    ///
    /// Transposing a transposed view returns the original matrix.
    pub fn transposed(matrix: WideByteMatrix) -> WideByteMatrix {
        match matrix {
            WideByteMatrix::Transposed(inner) => *inner,
            matrix => WideByteMatrix::Transposed(Box::new(matrix)),
        }
    }
}

//-----------------------------------------------------------------------------
