use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    /// The chunk stride for AutoRows must be valid.
    #[error("row stride must be > 0 for AutoRows strategy")]
    InvalidRowStride(usize),

    /// The destination does not match the grid size.
    #[error("destination length ({0}) does not match the grid size ({1})")]
    SizeMismatch(usize, usize),
}

/// Controls how grid evaluations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to evaluate every cell in parallel.
    #[default]
    ParallelElements,

    /// Use the global Rayon thread pool to evaluate chunks of rows in parallel.
    ///
    /// The value is the number of grid rows per chunk.
    AutoRows(usize),

    /// Run sequentially on the current thread.
    ///
    /// Matches the single-threaded behaviour expected by interactive callers.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

/// Fill a row-major grid by evaluating `f(col, row)` for every cell.
///
/// # Arguments
///
/// * `dst` - The destination slice with `width * height` cells.
/// * `width` - Number of columns of the grid.
/// * `height` - Number of rows of the grid.
/// * `strategy` - The execution strategy.
/// * `f` - The per-cell function.
pub fn fill_grid<F>(
    dst: &mut [f64],
    width: usize,
    height: usize,
    strategy: ExecutionStrategy,
    f: F,
) -> Result<(), ParallelError>
where
    F: Fn(usize, usize) -> f64 + Sync + Send,
{
    let expected = width * height;
    if dst.len() != expected {
        return Err(ParallelError::SizeMismatch(dst.len(), expected));
    }
    if expected == 0 {
        return Ok(());
    }

    let cell = |(i, v): (usize, &mut f64)| *v = f(i % width, i / width);

    match strategy {
        ExecutionStrategy::Serial => {
            dst.iter_mut().enumerate().for_each(cell);
        }
        ExecutionStrategy::ParallelElements => {
            dst.par_iter_mut().enumerate().for_each(cell);
        }
        ExecutionStrategy::AutoRows(rows) => {
            if rows == 0 {
                return Err(ParallelError::InvalidRowStride(rows));
            }
            let stride = rows * width;
            dst.par_chunks_mut(stride)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let offset = chunk_idx * stride;
                    chunk
                        .iter_mut()
                        .enumerate()
                        .for_each(|(i, v)| cell((offset + i, v)));
                });
        }
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n));
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;

            pool.install(|| {
                dst.par_iter_mut().enumerate().for_each(cell);
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(width: usize, height: usize) -> Vec<f64> {
        (0..height)
            .flat_map(|r| (0..width).map(move |c| (c + 10 * r) as f64))
            .collect()
    }

    #[test]
    fn test_fill_all_strategies() -> Result<(), ParallelError> {
        for strategy in [
            ExecutionStrategy::Serial,
            ExecutionStrategy::ParallelElements,
            ExecutionStrategy::AutoRows(2),
            ExecutionStrategy::Fixed(2),
        ] {
            let mut dst = vec![0.0; 4 * 3];
            fill_grid(&mut dst, 4, 3, strategy, |c, r| (c + 10 * r) as f64)?;
            assert_eq!(dst, expected(4, 3), "strategy {:?}", strategy);
        }
        Ok(())
    }

    #[test]
    fn test_fill_size_mismatch() {
        let mut dst = vec![0.0; 5];
        let res = fill_grid(&mut dst, 2, 3, ExecutionStrategy::Serial, |_, _| 0.0);
        assert_eq!(res, Err(ParallelError::SizeMismatch(5, 6)));
    }

    #[test]
    fn test_fill_invalid_strategies() {
        let mut dst = vec![0.0; 4];
        let res = fill_grid(&mut dst, 2, 2, ExecutionStrategy::AutoRows(0), |_, _| 0.0);
        assert_eq!(res, Err(ParallelError::InvalidRowStride(0)));

        let res = fill_grid(&mut dst, 2, 2, ExecutionStrategy::Fixed(0), |_, _| 0.0);
        assert_eq!(res, Err(ParallelError::InvalidThreadCount(0)));
    }
}
