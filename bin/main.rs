use std::fs::File;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tdmc::decomposition::td;
use tdmc::dot_writer::{Dot, DotWriter};
use tdmc::formula::dimacs;
use tdmc::solver::{self, DataStructure, SolveConfig, SolveResult};

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    None,
}

impl LogLevel {
    fn to_trace(&self) -> Option<tracing::Level> {
        Some(match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::None => return None,
        })
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the CNF formula in DIMACS format
    #[arg(short = 's', long, value_name = "formula.cnf")]
    formula: String,

    /// Path to the tree decomposition in PACE .td format
    #[arg(short = 'f', long, value_name = "decomposition.td")]
    decomposition: String,

    /// Merge single-child bag chains up to this many variables.
    /// 0 leaves the decomposition untouched.
    #[arg(short = 'w', long, default_value_t = 0)]
    combine_width: usize,

    /// Maximum number of variables per bag
    #[arg(short = 'm', long, default_value_t = 61)]
    max_bag_size: usize,

    /// Solution-table layout for introduce-forget bags
    #[arg(long = "dataStructure", value_enum, default_value_t = DataStructure::Tree)]
    data_structure: DataStructure,

    /// Weighted model counting even when the formula carries no weights
    #[arg(long)]
    weighted: bool,

    /// Bytes available per solution-table fragment
    #[arg(long, default_value_t = 1 << 30)]
    max_memory_buffer: usize,

    /// Where to store the DOT graph of the decomposition
    #[arg(short = 'd', long, value_name = "FILE.dot")]
    decomposition_dot_path: Option<String>,

    /// Verbosity level. See `tracing::Level` for more information.
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    verbosity: LogLevel,

    /// Print timing and table statistics.
    #[arg(short, long)]
    print_statistics: bool,
}

#[derive(Debug, Clone, Default)]
struct Statistics {
    parsing: Option<Duration>,
    solving: Option<Duration>,
}

impl Statistics {
    fn print(&self, result: &SolveResult) {
        println!("parse time      : {:.2?}", self.parsing.unwrap());
        println!("solve time      : {:.2?}", self.solving.unwrap());
        println!("joins           : {}", result.stats.num_join);
        println!("introduce-forget: {}", result.stats.num_introduce_forget);
        println!("max table size  : {} words", result.stats.max_table_size);
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if let Some(level) = args.verbosity.to_trace() {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let mut statistics = Statistics::default();

    let parse_start = Instant::now();
    let mut file = File::open(&args.formula)
        .with_context(|| format!("could not open formula '{}'", args.formula))?;
    let formula = dimacs::parse(&mut file)
        .with_context(|| format!("could not parse formula '{}'", args.formula))?;

    let mut file = File::open(&args.decomposition)
        .with_context(|| format!("could not open decomposition '{}'", args.decomposition))?;
    let mut decomposition = td::parse(&mut file)
        .with_context(|| format!("could not parse decomposition '{}'", args.decomposition))?;
    decomposition.combine_chains(args.combine_width);
    statistics.parsing = Some(parse_start.elapsed());

    write_to_file(args.decomposition_dot_path.as_deref(), |writer| {
        let mut dot_writer = DotWriter::new("decomposition");
        decomposition.draw(&mut dot_writer);
        dot_writer.write(writer)
    })?;

    let config = SolveConfig::builder()
        .data_structure(args.data_structure)
        .weighted(args.weighted)
        .do_trace(matches!(args.verbosity, LogLevel::Trace))
        .max_bag(args.max_bag_size)
        .max_memory_buffer(args.max_memory_buffer)
        .build();

    let solve_start = Instant::now();
    let result = solver::solve(&formula, &decomposition, &config)?;
    statistics.solving = Some(solve_start.elapsed());

    let kind = if args.weighted || formula.is_weighted() {
        "wmc"
    } else {
        "mc"
    };
    if result.is_sat {
        println!("s SATISFIABLE");
        println!("s {kind} {}", format_count(&result));
    } else {
        println!("s UNSATISFIABLE");
        println!("s {kind} 0");
    }

    if args.print_statistics {
        statistics.print(&result);
    }

    Ok(())
}

/// Render the count, falling back to a decimal mantissa/exponent pair when
/// it does not fit a double.
fn format_count(result: &SolveResult) -> String {
    let count = result.model_count();
    if count.is_finite() && count > 0.0 {
        return format!("{count}");
    }
    match result.log10_count() {
        Some(log10) => {
            let exp10 = log10.floor();
            let mantissa = 10f64.powf(log10 - exp10);
            format!("{mantissa:.6}e{exp10}")
        }
        None => String::from("0"),
    }
}

fn write_to_file(
    path: Option<&str>,
    writer: impl Fn(&mut dyn std::io::Write) -> std::io::Result<()>,
) -> Result<()> {
    if let Some(path) = path {
        let file =
            File::create(path).with_context(|| format!("could not create '{path}'"))?;
        let mut buffered = std::io::BufWriter::new(file);
        writer(&mut buffered as &mut dyn std::io::Write)
            .with_context(|| format!("could not render '{path}'"))?;
    }

    Ok(())
}
