use argh::FromArgs;
use std::io::Write;
use std::path::PathBuf;

use polywarp::landmarks::{self, state};
use polywarp::solver::{
    fit_affine, Axis, CancellationToken, EvaluationMode, ExecutionStrategy, SolverParams,
    WarpEngine,
};

#[derive(FromArgs)]
/// Solve the polynomial warp of a saved landmark set
struct Args {
    /// path to the landmark state file
    #[argh(option)]
    state_path: PathBuf,

    /// maximum number of landmarks accepted from the file
    #[argh(option, default = "landmarks::DEFAULT_MAX_LANDMARKS")]
    max_landmarks: usize,

    /// maximum number of terms per axis
    #[argh(option, default = "10")]
    max_terms: usize,

    /// cancel the solve if it runs longer than this many milliseconds
    #[argh(option)]
    timeout_ms: Option<u64>,

    /// grid width to evaluate the warp over
    #[argh(option)]
    width: Option<usize>,

    /// grid height to evaluate the warp over
    #[argh(option)]
    height: Option<usize>,

    /// evaluate the grid with the cached expansion instead of local weights
    #[argh(switch)]
    cached: bool,

    /// path to write the evaluated grid to
    #[argh(option)]
    output_path: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut store = state::load_landmarks(&args.state_path, args.max_landmarks)?;
    println!("Loaded #{} landmarks", store.len());

    match store.similarity() {
        Ok(similarity) => println!("Similarity: {:.4}", similarity),
        Err(e) => log::warn!("similarity unavailable: {}", e),
    }

    let engine = WarpEngine::new(SolverParams {
        max_terms: args.max_terms,
        ..Default::default()
    })?;

    // solve on a worker so a slow solve can be cancelled
    let handle = engine.spawn_solve(store.clone(), CancellationToken::new());
    let start = std::time::Instant::now();
    while !handle.is_finished() {
        if args
            .timeout_ms
            .is_some_and(|ms| start.elapsed().as_millis() > ms as u128)
        {
            log::warn!("solve timed out, cancelling");
            handle.cancel();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    let solution = handle.join()?;

    for axis in [Axis::X, Axis::Y] {
        let fit = solution.fit(axis);
        println!(
            "{:?}: {} terms, max error {:.4}, converged {}",
            axis,
            fit.term_count(),
            fit.max_error,
            fit.converged
        );
        println!("  quadratic window: {:?}", fit.matrix.quadratic_window());
    }
    for (axis, warning) in solution.warnings() {
        println!("Warning ({:?}): {}", axis, warning);
    }

    for index in 0..store.len() {
        let Some(pair) = store.get(index) else {
            continue;
        };
        let [x1, y1] = pair.source();
        let [x2, y2] = pair.target();
        let [u, v] = solution.evaluate_at(x1, y1);
        store.set_transformed(index, [u, v, x2 - u, y2 - v])?;
        println!(
            "{}: ({}, {}) -> ({:.3}, {:.3}), target ({}, {})",
            store.label(index).unwrap_or_default(),
            x1,
            y1,
            u,
            v,
            x2,
            y2
        );
    }

    match fit_affine(&store) {
        Ok(affine) => println!(
            "Affine: {:?}, max error {:.4}",
            affine.matrix,
            affine.max_error(&store)
        ),
        Err(e) => log::warn!("affine fit unavailable: {}", e),
    }

    let (Some(width), Some(height)) = (args.width, args.height) else {
        return Ok(());
    };

    let mode = if args.cached {
        EvaluationMode::Cached
    } else {
        EvaluationMode::Local
    };
    let [map_x, map_y] =
        solution.evaluate_grid(width, height, mode, ExecutionStrategy::ParallelElements)?;
    println!("Evaluated {}x{} grid", width, height);

    if let Some(output_path) = args.output_path {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(&output_path)?);
        for row in 0..height {
            for col in 0..width {
                let i = row * width + col;
                writeln!(writer, "{}\t{}\t{:.6}\t{:.6}", col, row, map_x[i], map_y[i])?;
            }
        }
        writer.flush()?;
        println!("Grid written to {}", output_path.display());
    }

    Ok(())
}
