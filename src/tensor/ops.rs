//! # Tensor Operations
//!
//! Vector and matrix kernels used by the optimizers: norms, dot products,
//! normalization and the rank-one updates behind the quasi-Newton methods.
//!
//! Every reduction takes an explicit [`ExecutionContext`]; long contiguous
//! vectors are split across its thread pool, everything else runs inline.

use super::{Matrix, TensorData, TensorError, Vector};
use crate::utils::parallel::ExecutionContext;
use ndarray::{Array2, Zip};
use rayon::prelude::*;

// --- Reductions ---

fn sum_of_squares(ctx: &ExecutionContext, vector: &Vector) -> TensorData {
    match vector.as_slice() {
        Some(values) if ctx.is_parallel_for(values.len()) => {
            ctx.install(|| values.par_iter().map(|x| x * x).sum())
        }
        _ => vector.iter().map(|x| x * x).sum(),
    }
}

/// Euclidean norm, `sqrt(sum(x_i^2))`.
pub fn l2_norm(ctx: &ExecutionContext, vector: &Vector) -> TensorData {
    sum_of_squares(ctx, vector).sqrt()
}

/// Inner product of two vectors of the same length.
///
/// # Errors
/// `TensorError::ShapeMismatch` if the lengths differ.
pub fn dot(ctx: &ExecutionContext, a: &Vector, b: &Vector) -> Result<TensorData, TensorError> {
    if a.len() != b.len() {
        return Err(TensorError::length_mismatch(a.len(), b.len()));
    }
    match (a.as_slice(), b.as_slice()) {
        (Some(x), Some(y)) if ctx.is_parallel_for(x.len()) => Ok(ctx.install(|| {
            x.par_iter().zip(y.par_iter()).map(|(p, q)| p * q).sum()
        })),
        _ => Ok(a.dot(b)),
    }
}

/// Returns `vector / ||vector||`.
///
/// A vector with zero norm has no direction; the zero vector is returned
/// instead of dividing by zero.
pub fn normalized(ctx: &ExecutionContext, vector: &Vector) -> Vector {
    let norm = l2_norm(ctx, vector);
    if norm == 0.0 {
        return Vector::zeros(vector.len());
    }
    vector / norm
}

// --- In-place updates ---

/// `y += alpha * x`.
///
/// # Errors
/// `TensorError::ShapeMismatch` if the lengths differ.
pub fn axpy(
    ctx: &ExecutionContext,
    alpha: TensorData,
    x: &Vector,
    y: &mut Vector,
) -> Result<(), TensorError> {
    if x.len() != y.len() {
        return Err(TensorError::length_mismatch(y.len(), x.len()));
    }
    if ctx.is_parallel_for(y.len()) {
        ctx.install(|| {
            Zip::from(&mut *y)
                .and(x)
                .par_for_each(|yi, &xi| *yi += alpha * xi)
        });
    } else {
        Zip::from(&mut *y).and(x).for_each(|yi, &xi| *yi += alpha * xi);
    }
    Ok(())
}

// --- Matrices ---

/// `n x n` identity matrix.
pub fn identity(n: usize) -> Matrix {
    Array2::eye(n)
}

/// Dense matrix-vector product `m v`.
///
/// # Errors
/// `TensorError::ShapeMismatch` if `m` has not `v.len()` columns.
pub fn matrix_vector(
    ctx: &ExecutionContext,
    matrix: &Matrix,
    vector: &Vector,
) -> Result<Vector, TensorError> {
    if matrix.ncols() != vector.len() {
        return Err(TensorError::ShapeMismatch {
            expected: vec![matrix.nrows(), vector.len()],
            got: matrix.shape().to_vec(),
        });
    }
    if ctx.is_parallel_for(matrix.len()) {
        let mut product = Vector::zeros(matrix.nrows());
        ctx.install(|| {
            Zip::from(&mut product)
                .and(matrix.rows())
                .par_for_each(|p, row| *p = row.dot(vector))
        });
        Ok(product)
    } else {
        Ok(matrix.dot(vector))
    }
}

/// Rank-one update `m += alpha * a b^T`, done in place without materializing
/// the outer product.
///
/// # Errors
/// `TensorError::ShapeMismatch` if `m` is not `a.len() x b.len()`.
pub fn rank_one_update(
    ctx: &ExecutionContext,
    matrix: &mut Matrix,
    alpha: TensorData,
    a: &Vector,
    b: &Vector,
) -> Result<(), TensorError> {
    if matrix.nrows() != a.len() || matrix.ncols() != b.len() {
        return Err(TensorError::ShapeMismatch {
            expected: vec![a.len(), b.len()],
            got: matrix.shape().to_vec(),
        });
    }
    if ctx.is_parallel_for(matrix.len()) {
        ctx.install(|| {
            Zip::from(matrix.rows_mut())
                .and(a)
                .par_for_each(|mut row, &ai| row.scaled_add(alpha * ai, b))
        });
    } else {
        Zip::from(matrix.rows_mut())
            .and(a)
            .for_each(|mut row, &ai| row.scaled_add(alpha * ai, b));
    }
    Ok(())
}
