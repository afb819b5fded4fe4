use super::*;

use crate::ErrorKind;

use rand::Rng;
use rand::seq::SliceRandom;

//-----------------------------------------------------------------------------

// Fills the matrix with `row * columns + column` truncated to a byte.
fn fill(matrix: &mut WideByteMatrix) {
    let columns = matrix.columns();
    for row in 0..matrix.rows() {
        for column in 0..columns {
            matrix.set(row, column, (row * columns + column) as u8).unwrap();
        }
    }
}

fn contents(matrix: &WideByteMatrix) -> Vec<Vec<u8>> {
    (0..matrix.rows()).map(|row| matrix.row(row).unwrap()).collect()
}

// Single, multiple buffers, and a transposed view.
fn matrices(rows: usize, columns: usize) -> Vec<(WideByteMatrix, &'static str)> {
    vec![
        (MatrixBuilder::new(rows, columns).build().unwrap(), "single"),
        (MatrixBuilder::new(rows, columns).buffer_limit(2 * columns).build().unwrap(), "multi"),
        (MatrixBuilder::new(rows, columns).buffer_limit(2 * rows).build_transposed().unwrap(), "transposed"),
    ]
}

fn check_error<T>(result: Result<T>, kind: ErrorKind, name: &str) {
    assert!(result.is_err(), "{}: The operation succeeded", name);
    assert_eq!(result.err().unwrap().kind(), kind, "{}: Invalid error kind", name);
}

fn random_permutation(len: usize) -> Vec<usize> {
    let mut result: Vec<usize> = (0..len).collect();
    result.shuffle(&mut rand::thread_rng());
    result
}

fn inverse(permutation: &[usize]) -> Vec<usize> {
    let mut result = vec![0; permutation.len()];
    for (dest, &src) in permutation.iter().enumerate() {
        result[src] = dest;
    }
    result
}

//-----------------------------------------------------------------------------

#[test]
fn translation() {
    assert_eq!(translate(0, 0, 5, 3), (0, 0), "Invalid translation for the first element");
    assert_eq!(translate(2, 4, 5, 3), (0, 14), "Invalid translation for the end of the first buffer");
    assert_eq!(translate(3, 0, 5, 3), (1, 0), "Invalid translation for the start of the second buffer");
    assert_eq!(translate(7, 1, 5, 3), (2, 6), "Invalid translation in the last buffer");

    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let columns = rng.gen_range(1..50);
        let rows_per_buffer = rng.gen_range(1..20);
        let row = rng.gen_range(0..1000);
        let column = rng.gen_range(0..columns);
        let (buffer, offset) = translate(row, column, columns, rows_per_buffer);
        assert_eq!(buffer * rows_per_buffer * columns + offset, row * columns + column, "Translation is not consistent with row-major order");
        assert!(offset < rows_per_buffer * columns, "Offset past the buffer");
    }
}

#[test]
fn builder() {
    let matrix = MatrixBuilder::new(3, 4).build().unwrap();
    assert!(matches!(matrix, WideByteMatrix::Single(_)), "Small matrix does not use a single buffer");
    assert_eq!((matrix.rows(), matrix.columns(), matrix.len()), (3, 4, 12), "Invalid dimensions");

    let matrix = MatrixBuilder::new(7, 4).buffer_limit(10).build().unwrap();
    match &matrix {
        WideByteMatrix::Multi(m) => {
            assert_eq!(m.rows_per_buffer(), 2, "Invalid rows per buffer");
            assert_eq!(m.buffers(), 4, "Invalid number of buffers");
            assert_eq!(m.translate(5, 3), (2, 7), "Invalid translation");
        }
        _ => panic!("Large matrix does not use multiple buffers"),
    }

    check_error(MatrixBuilder::new(2, 20).buffer_limit(10).build(), ErrorKind::InvalidArgument, "Row larger than a buffer");
    check_error(MatrixBuilder::new(usize::MAX, 2).build(), ErrorKind::InvalidArgument, "Overflowing size");
    assert!(MatrixBuilder::new(0, 0).build().unwrap().is_empty(), "Empty matrix is not empty");

    let transposed = MatrixBuilder::new(2, 5).build_transposed().unwrap();
    assert_eq!((transposed.rows(), transposed.columns()), (2, 5), "Invalid transposed dimensions");
    assert!(!transposed.is_column_inner_loop(), "Transposed view reports column inner loop");
    let original = MatrixBuilder::transposed(transposed);
    assert_eq!((original.rows(), original.columns()), (5, 2), "Double transposition did not unwrap");
    assert!(original.is_column_inner_loop(), "Unwrapped matrix does not report column inner loop");
}

//-----------------------------------------------------------------------------

#[test]
fn get_and_set() {
    for (mut matrix, name) in matrices(5, 7) {
        fill(&mut matrix);
        for row in 0..5 {
            for column in 0..7 {
                assert_eq!(matrix.get(row, column).unwrap(), (row * 7 + column) as u8, "[{}]: Invalid value at ({}, {})", name, row, column);
            }
        }
        assert_eq!(matrix.row(2).unwrap(), (14..21).collect::<Vec<u8>>(), "[{}]: Invalid row", name);
        assert_eq!(matrix.column(3).unwrap(), vec![3, 10, 17, 24, 31], "[{}]: Invalid column", name);
        assert_eq!(matrix.column_range(4, 2, 5).unwrap(), vec![30, 31, 32], "[{}]: Invalid column range", name);
        assert!(matrix.column_range(1, 7, 7).unwrap().is_empty(), "[{}]: Non-empty column range at the end", name);

        check_error(matrix.get(5, 0), ErrorKind::InvalidArgument, name);
        check_error(matrix.set(0, 7, 1), ErrorKind::InvalidArgument, name);
        check_error(matrix.row(5), ErrorKind::InvalidArgument, name);
        check_error(matrix.column(7), ErrorKind::InvalidArgument, name);
        check_error(matrix.column_range(0, 4, 3), ErrorKind::InvalidArgument, name);
        check_error(matrix.column_range(0, 4, 8), ErrorKind::InvalidArgument, name);
    }
}

#[test]
fn rows_and_fill() {
    for (mut matrix, name) in matrices(4, 6) {
        matrix.set_row_from(1, &[7, 8, 9], 2).unwrap();
        assert_eq!(matrix.row(1).unwrap(), vec![0, 0, 7, 8, 9, 0], "[{}]: Invalid row after copy", name);
        check_error(matrix.set_row_from(1, &[1, 2, 3], 4), ErrorKind::InvalidArgument, name);
        check_error(matrix.set_row_from(4, &[1], 0), ErrorKind::InvalidArgument, name);

        matrix.set_all(5);
        assert!(matrix.bytes().all(|byte| byte == 5), "[{}]: Invalid value after set_all", name);
    }
}

#[test]
fn constant_matrix() {
    let mut matrix = MatrixBuilder::constant(3, 4, 0x12);
    assert_eq!(matrix.get(2, 3).unwrap(), 0x12, "Invalid constant value");
    assert_eq!(matrix.row(1).unwrap(), vec![0x12; 4], "Invalid constant row");
    assert_eq!(matrix.column(0).unwrap(), vec![0x12; 3], "Invalid constant column");
    check_error(matrix.set(0, 0, 1), ErrorKind::UnsupportedOperation, "Constant set");
    check_error(matrix.set_row_from(0, &[1], 0), ErrorKind::UnsupportedOperation, "Constant row copy");
    assert!(matrix.reorder_rows(&[2, 1, 0]).is_ok(), "Could not reorder constant rows");
    check_error(matrix.reorder_columns(&[0, 0, 1, 2]), ErrorKind::InvalidArgument, "Constant invalid permutation");

    matrix.set_hets_to(0xFF);
    assert_eq!(matrix.get(0, 0).unwrap(), 0xFF, "Heterozygous constant was not replaced");
    matrix.set_all(0x33);
    matrix.set_hets_to(0x00);
    assert_eq!(matrix.get(1, 1).unwrap(), 0x33, "Homozygous constant was replaced");
    assert_eq!(matrix.par_bytes().count(), 12, "Invalid number of bytes");
}

//-----------------------------------------------------------------------------

#[test]
fn reorder_example() {
    for (mut matrix, name) in matrices(3, 4) {
        matrix.set(1, 2, 9).unwrap();
        matrix.reorder_rows(&[2, 0, 1]).unwrap();
        assert_eq!(matrix.get(2, 2).unwrap(), 9, "[{}]: The value did not move to row 2", name);
        assert_eq!(matrix.get(1, 2).unwrap(), 0, "[{}]: The value was not moved", name);
    }
}

#[test]
fn reorder_and_restore() {
    for (mut matrix, name) in matrices(9, 11) {
        fill(&mut matrix);
        let original = contents(&matrix);

        let rows = random_permutation(9);
        matrix.reorder_rows(&rows).unwrap();
        for (dest, &src) in rows.iter().enumerate() {
            assert_eq!(matrix.row(dest).unwrap(), original[src], "[{}]: Invalid row {} after reordering", name, dest);
        }
        matrix.reorder_rows(&inverse(&rows)).unwrap();
        assert_eq!(contents(&matrix), original, "[{}]: Inverse row permutation did not restore the matrix", name);

        let columns = random_permutation(11);
        matrix.reorder_columns(&columns).unwrap();
        for (dest, &src) in columns.iter().enumerate() {
            let truth: Vec<u8> = original.iter().map(|row| row[src]).collect();
            assert_eq!(matrix.column(dest).unwrap(), truth, "[{}]: Invalid column {} after reordering", name, dest);
        }
        matrix.reorder_columns(&inverse(&columns)).unwrap();
        assert_eq!(contents(&matrix), original, "[{}]: Inverse column permutation did not restore the matrix", name);
    }
}

#[test]
fn invalid_permutations() {
    for (mut matrix, name) in matrices(3, 4) {
        check_error(matrix.reorder_rows(&[0, 1]), ErrorKind::InvalidArgument, name);
        check_error(matrix.reorder_rows(&[0, 1, 1]), ErrorKind::InvalidArgument, name);
        check_error(matrix.reorder_rows(&[0, 1, 3]), ErrorKind::InvalidArgument, name);
        check_error(matrix.reorder_columns(&[0, 1, 2, 3, 4]), ErrorKind::InvalidArgument, name);
    }
}

//-----------------------------------------------------------------------------

#[test]
fn heterozygous_bytes() {
    for (mut matrix, name) in matrices(2, 3) {
        matrix.set_row_from(0, &[0x00, 0x01, 0x11], 0).unwrap();
        matrix.set_row_from(1, &[0x23, 0xFF, 0x32], 0).unwrap();
        matrix.set_hets_to(0xEE);
        assert_eq!(contents(&matrix), vec![vec![0x00, 0xEE, 0x11], vec![0xEE, 0xFF, 0xEE]], "[{}]: Invalid bytes", name);
    }
}

#[test]
fn iterators() {
    for (mut matrix, name) in matrices(6, 5) {
        fill(&mut matrix);
        let truth: Vec<u8> = (0..30).collect();
        assert_eq!(matrix.bytes().collect::<Vec<u8>>(), truth, "[{}]: Invalid bytes", name);
        assert_eq!(matrix.par_bytes().collect::<Vec<u8>>(), truth, "[{}]: Invalid parallel bytes", name);
        assert_eq!(matrix.row_bytes(3).unwrap().collect::<Vec<u8>>(), truth[15..20].to_vec(), "[{}]: Invalid row bytes", name);
        assert_eq!(matrix.par_row(3).unwrap().collect::<Vec<u8>>(), truth[15..20].to_vec(), "[{}]: Invalid parallel row", name);
        let sum: u64 = matrix.par_bytes().map(|byte| byte as u64).sum();
        assert_eq!(sum, 435, "[{}]: Invalid parallel sum", name);
        assert!(matrix.par_row(6).is_err(), "[{}]: Parallel row past the end", name);
    }
}

#[test]
fn transpose_single() {
    let mut rng = rand::thread_rng();
    for (rows, columns) in [(1, 1), (1, 7), (4, 4), (5, 3), (8, 13)] {
        let mut matrix = MatrixBuilder::new(rows, columns).build().unwrap();
        for row in 0..rows {
            for column in 0..columns {
                matrix.set(row, column, rng.gen()).unwrap();
            }
        }
        let original = matrix.clone();
        if let WideByteMatrix::Single(m) = &mut matrix {
            m.transpose_in_place();
        }
        assert_eq!((matrix.rows(), matrix.columns()), (columns, rows), "Invalid dimensions after transposing {} x {}", rows, columns);
        for row in 0..rows {
            for column in 0..columns {
                assert_eq!(
                    matrix.get(column, row).unwrap(), original.get(row, column).unwrap(),
                    "Invalid value at ({}, {}) after transposing {} x {}", row, column, rows, columns
                );
            }
        }
    }
}

//-----------------------------------------------------------------------------
