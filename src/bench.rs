//! Benchmark harness.
//!
//! Times repeated queries over a matrix of dataset sizes and query counts and
//! reports the mean wall-clock time per configuration. Three targets:
//!
//! - `memory`: every search algorithm over an in-memory prefix of the dataset
//! - `reread`: the same, but each query re-reads the dataset file first
//! - `service`: queries sent end-to-end to a running server
//!
//! Binary, jump and exponential search need sorted input. Unless the plan
//! sorts each slice, their rows are labelled `(unsorted)`: those numbers
//! reflect throughput, not correct lookups.

use crate::protocol::{self, FrameError, Response};
use crate::search::{Corpus, SearchAlgorithm};
use bytes::BytesMut;
use clap::ValueEnum;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// What the harness measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BenchTarget {
    Memory,
    Reread,
    Service,
}

/// Matrix of configurations to measure
#[derive(Debug, Clone, PartialEq)]
pub struct BenchPlan {
    pub sizes: Vec<usize>,
    pub query_counts: Vec<usize>,
    pub runs: usize,
    pub target: BenchTarget,
    pub sorted: bool,
}

/// Mean time of one configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub label: String,
    pub size: usize,
    pub queries: usize,
    pub average: Duration,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Search: {}, File size: {}, Number of Queries: {}, Avg Execution Time: {:.2} ms",
            self.label,
            self.size,
            self.queries,
            self.average.as_secs_f64() * 1000.0
        )
    }
}

/// Benchmark errors
#[derive(Debug)]
pub enum BenchError {
    /// Reading the dataset failed
    Dataset(PathBuf, io::Error),
    /// Talking to the server failed
    Io(io::Error),
    /// A query did not fit in a frame
    Frame(FrameError),
    /// The server sent something other than a reply line
    UnexpectedReply(Vec<u8>),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::Dataset(path, e) => {
                write!(f, "Failed to read dataset '{}': {}", path.display(), e)
            }
            BenchError::Io(e) => write!(f, "I/O error: {e}"),
            BenchError::Frame(e) => write!(f, "Invalid query: {e}"),
            BenchError::UnexpectedReply(reply) => {
                write!(f, "Unexpected reply: {:?}", String::from_utf8_lossy(reply))
            }
        }
    }
}

impl std::error::Error for BenchError {}

impl From<io::Error> for BenchError {
    fn from(e: io::Error) -> Self {
        BenchError::Io(e)
    }
}

impl From<FrameError> for BenchError {
    fn from(e: FrameError) -> Self {
        BenchError::Frame(e)
    }
}

/// Run `run_once` `runs` times and return the mean duration.
pub fn measure<F>(runs: usize, mut run_once: F) -> Duration
where
    F: FnMut(usize),
{
    let runs = runs.max(1);
    let mut total = Duration::ZERO;

    for run in 0..runs {
        let start = Instant::now();
        run_once(run);
        total += start.elapsed();
    }

    total / runs as u32
}

/// Pick the target of query `i` in repetition `run`.
///
/// Targets are spread across the lines and shift per repetition, so every
/// run is repeatable without sharing state.
fn pick_target(lines: &[String], run: usize, i: usize, queries: usize) -> &str {
    let stride = (lines.len() / queries.max(1)).max(1);
    &lines[(i * stride + run) % lines.len()]
}

fn read_lines(path: &Path) -> Result<Vec<String>, BenchError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| BenchError::Dataset(path.to_path_buf(), e))?;
    Ok(contents.lines().map(|line| line.trim().to_string()).collect())
}

fn corpus(lines: Vec<String>, sorted: bool) -> Corpus {
    if sorted {
        Corpus::sorted(lines)
    } else {
        Corpus::new(lines)
    }
}

fn label(algorithm: SearchAlgorithm, sorted: bool, reread: bool) -> String {
    let mut label = algorithm.name().to_string();
    if algorithm.requires_sorted() && !sorted {
        label.push_str(" (unsorted)");
    }
    if reread {
        label.push_str(" [reread]");
    }
    label
}

/// Run the plan against the dataset at `dataset`, writing one line per
/// measurement to `out`.
pub async fn run<W: Write>(
    plan: &BenchPlan,
    dataset: &Path,
    addr: &str,
    out: &mut W,
) -> Result<Vec<Measurement>, BenchError> {
    let lines = read_lines(dataset)?;
    match plan.target {
        BenchTarget::Memory => bench_memory(plan, &lines, out),
        BenchTarget::Reread => bench_reread(plan, dataset, &lines, out),
        BenchTarget::Service => bench_service(plan, &lines, addr, out).await,
    }
}

/// Sizes from the plan that fit the dataset, reporting the rest as skipped.
fn usable_sizes<W: Write>(plan: &BenchPlan, available: usize, out: &mut W) -> io::Result<Vec<usize>> {
    let mut sizes = Vec::new();
    for &size in &plan.sizes {
        if size > available {
            writeln!(out, "File size {size} is larger than the number of lines ({available})")?;
        } else if size == 0 {
            writeln!(out, "File size 0 has no lines to search")?;
        } else {
            sizes.push(size);
        }
    }
    Ok(sizes)
}

/// Time every algorithm over in-memory slices.
pub fn bench_memory<W: Write>(
    plan: &BenchPlan,
    lines: &[String],
    out: &mut W,
) -> Result<Vec<Measurement>, BenchError> {
    let mut results = Vec::new();

    for size in usable_sizes(plan, lines.len(), out)? {
        let slice = corpus(lines[..size].to_vec(), plan.sorted);
        writeln!(out, "Testing with file size: {size}")?;

        for &queries in &plan.query_counts {
            for algorithm in SearchAlgorithm::ALL {
                let average = measure(plan.runs, |run| {
                    for i in 0..queries {
                        let target = pick_target(slice.lines(), run, i, queries);
                        std::hint::black_box(algorithm.search(&slice, target));
                    }
                });

                let measurement = Measurement {
                    label: label(algorithm, plan.sorted, false),
                    size,
                    queries,
                    average,
                };
                writeln!(out, "{measurement}")?;
                results.push(measurement);
            }
        }
    }

    Ok(results)
}

/// Time every algorithm when each query re-reads the dataset file.
pub fn bench_reread<W: Write>(
    plan: &BenchPlan,
    dataset: &Path,
    lines: &[String],
    out: &mut W,
) -> Result<Vec<Measurement>, BenchError> {
    let mut results = Vec::new();

    for size in usable_sizes(plan, lines.len(), out)? {
        writeln!(out, "Testing with file size: {size}")?;

        for &queries in &plan.query_counts {
            for algorithm in SearchAlgorithm::ALL {
                let mut failure = None;
                let average = measure(plan.runs, |run| {
                    for i in 0..queries {
                        let target = pick_target(&lines[..size], run, i, queries);
                        match read_lines(dataset) {
                            Ok(mut fresh) => {
                                fresh.truncate(size);
                                let slice = corpus(fresh, plan.sorted);
                                std::hint::black_box(algorithm.search(&slice, target));
                            }
                            Err(e) => {
                                failure = Some(e);
                                return;
                            }
                        }
                    }
                });
                if let Some(e) = failure {
                    return Err(e);
                }

                let measurement = Measurement {
                    label: label(algorithm, plan.sorted, true),
                    size,
                    queries,
                    average,
                };
                writeln!(out, "{measurement}")?;
                results.push(measurement);
            }
        }
    }

    Ok(results)
}

/// Time lookups sent to a running server at `addr`.
///
/// The server searches its whole dataset, so the size column is the number
/// of local lines queries are drawn from.
pub async fn bench_service<W: Write>(
    plan: &BenchPlan,
    lines: &[String],
    addr: &str,
    out: &mut W,
) -> Result<Vec<Measurement>, BenchError> {
    let mut results = Vec::new();
    let runs = plan.runs.max(1);

    if lines.is_empty() {
        writeln!(out, "Dataset is empty, nothing to query")?;
        return Ok(results);
    }

    for &queries in &plan.query_counts {
        let mut total = Duration::ZERO;

        for run in 0..runs {
            let start = Instant::now();
            let mut stream = TcpStream::connect(addr).await?;
            for i in 0..queries {
                let line = pick_target(lines, run, i, queries);
                let reply = query(&mut stream, line).await?;
                debug!(query = line, ?reply, "Service reply");
            }
            stream.shutdown().await?;
            total += start.elapsed();
        }

        let measurement = Measurement {
            label: "Service".to_string(),
            size: lines.len(),
            queries,
            average: total / runs as u32,
        };
        writeln!(out, "{measurement}")?;
        results.push(measurement);
    }

    Ok(results)
}

/// Send one query frame and read the reply line.
pub async fn query(stream: &mut TcpStream, target: &str) -> Result<Response, BenchError> {
    let frame = protocol::encode_query(target)?;
    stream.write_all(&frame).await?;

    let mut reply = BytesMut::with_capacity(32);
    while !reply.ends_with(b"\n") {
        if stream.read_buf(&mut reply).await? == 0 {
            return Err(BenchError::UnexpectedReply(reply.to_vec()));
        }
    }

    Response::parse(&reply).ok_or_else(|| BenchError::UnexpectedReply(reply.to_vec()))
}
