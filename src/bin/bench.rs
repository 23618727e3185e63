//! Recall/QPS driver.
//!
//! ```text
//! nearfield-bench base_path query_path gt_path graph_path level topk search_ef [num_threads] [iters]
//! ```
//!
//! Builds and saves the graph when `graph_path` does not exist, then
//! loads it, trains the level-selected quantizer on the corpus, tunes the
//! prefetch parameters, and measures recall@topk against the ground
//! truth over `iters` rounds.

use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use log::info;

use nearfield::distance::Metric;
use nearfield::error::{AnnError, Result};
use nearfield::graph::Graph;
use nearfield::hnsw::HnswConfig;
use nearfield::index::{AnySearcher, Index, QuantLevel};
use nearfield::io::{load_fvecs, load_ivecs};

struct Args {
    base_path: String,
    query_path: String,
    gt_path: String,
    graph_path: String,
    level: usize,
    topk: usize,
    search_ef: usize,
    num_threads: usize,
    iters: usize,
}

fn parse_args() -> Result<Args> {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 8 {
        return Err(AnnError::InvalidArgument(format!(
            "usage: {} base_path query_path gt_path graph_path level topk search_ef [num_threads] [iters]",
            argv.first().map(String::as_str).unwrap_or("nearfield-bench")
        )));
    }
    let num = |i: usize, name: &str| -> Result<usize> {
        argv[i]
            .parse()
            .map_err(|_| AnnError::InvalidArgument(format!("{name} must be a number: {}", argv[i])))
    };
    Ok(Args {
        base_path: argv[1].clone(),
        query_path: argv[2].clone(),
        gt_path: argv[3].clone(),
        graph_path: argv[4].clone(),
        level: num(5, "level")?,
        topk: num(6, "topk")?,
        search_ef: num(7, "search_ef")?,
        num_threads: if argv.len() >= 9 { num(8, "num_threads")? } else { 1 },
        iters: if argv.len() >= 10 { num(9, "iters")? } else { 10 },
    })
}

fn run(args: &Args) -> Result<()> {
    let base = load_fvecs(&args.base_path)?;
    let queries = load_fvecs(&args.query_path)?;
    let (gt, gt_n, gt_k) = load_ivecs(&args.gt_path)?;

    if queries.dim != base.dim {
        return Err(AnnError::DimensionMismatch {
            expected: base.dim,
            got: queries.dim,
        });
    }
    if gt_n != queries.n {
        return Err(AnnError::InvalidArgument(format!(
            "ground truth covers {gt_n} queries, query file has {}",
            queries.n
        )));
    }
    if gt_k < args.topk {
        return Err(AnnError::InvalidArgument(format!(
            "ground truth depth {gt_k} is shallower than topk {}",
            args.topk
        )));
    }

    if !Path::new(&args.graph_path).exists() {
        info!("no graph at {}, building", args.graph_path);
        let index = Index::with_config(
            base.dim,
            Metric::L2,
            HnswConfig {
                m: 16,
                ef_construction: 200,
                max_elements: base.n,
                ..Default::default()
            },
        )?;
        let graph = index.build(&base.data, base.n, base.dim)?;
        graph.save(&args.graph_path)?;
    }
    let graph = Graph::load(&args.graph_path)?;

    let mut searcher = AnySearcher::new(
        graph,
        &base.data,
        Metric::L2,
        QuantLevel::from_level(args.level)?,
    )?;
    searcher.optimize(args.num_threads)?;
    searcher.set_ef(args.search_ef);
    info!(
        "searcher ready: quantizer {}, ef {}",
        searcher.quantizer_name(),
        args.search_ef
    );

    let topk = args.topk;
    let mut best_qps = 0.0f64;
    for iter in 1..=args.iters {
        let mut pred = vec![-1i32; queries.n * topk];
        let started = Instant::now();
        for (i, chunk) in pred.chunks_mut(topk).enumerate() {
            searcher.search_into(queries.row(i), topk, chunk)?;
        }
        let elapsed = started.elapsed().as_secs_f64();
        let qps = queries.n as f64 / elapsed;
        best_qps = best_qps.max(qps);

        let mut hits = 0usize;
        for i in 0..queries.n {
            let truth: HashSet<i32> = gt[i * gt_k..i * gt_k + topk].iter().copied().collect();
            hits += pred[i * topk..(i + 1) * topk]
                .iter()
                .filter(|id| truth.contains(id))
                .count();
        }
        let recall = hits as f64 / (queries.n * topk) as f64;
        info!(
            "iter [{iter}/{}] recall@{topk} = {recall:.4}, qps = {qps:.2}",
            args.iters
        );
    }
    info!("best qps = {best_qps:.2}");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
