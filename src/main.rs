use clap::{Parser, ValueEnum};
use rust_python_flipcut::costs::Weighting;
use rust_python_flipcut::cutter::CutMethod;
use rust_python_flipcut::flipcut::{FlipCut, FlipCutConfig};
use rust_python_flipcut::io::{read_trees, write_supertrees};
use rust_python_flipcut::karger::KargerStein;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Compute a FlipCut supertree from a file of rooted input trees
/// (Newick or NEXUS, optionally gzipped) and write it as Newick.
#[derive(Parser, Debug)]
#[command(name = "flipcut", version, about = "FlipCut / Bad Clade Deletion supertrees")]
struct Args {
    /// Input trees (Newick or NEXUS, .gz accepted)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Guide tree whose clades are never split
    #[arg(short = 'g', long = "guide")]
    guide: Option<PathBuf>,

    /// Output path for the supertree(s), `-` for stdout, .gz compresses
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Clade weighting: unit | branch-length | bootstrap | level | branch-and-level | bootstrap-and-level
    #[arg(short = 'w', long = "weighting", default_value = "unit")]
    weighting: String,

    /// Ignore clades whose support label is below this value
    #[arg(short = 'b', long = "bootstrap-threshold", default_value_t = 0)]
    bootstrap_threshold: u32,

    /// Worker threads (defaults to all available cores)
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Cut engine to use
    #[arg(short = 'c', long = "cut-method", value_enum, default_value_t = CutMethodArg::PushRelabel)]
    cut_method: CutMethodArg,

    /// Number of alternative cuts per step; above 1 runs the multi-cut beam search
    #[arg(short = 'k', long = "number-of-cuts", default_value_t = 1)]
    number_of_cuts: usize,

    /// Seed for Karger-Stein contraction
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Independent Karger-Stein recursions per cut
    #[arg(long = "karger-rounds", default_value_t = KargerStein::default().rounds)]
    karger_rounds: usize,

    /// Quiet mode: suppresses progress messages on stderr
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CutMethodArg { PushRelabel, AugmentingPath, KargerStein }

impl From<CutMethodArg> for CutMethod {
    fn from(arg: CutMethodArg) -> Self {
        match arg {
            CutMethodArg::PushRelabel => CutMethod::PushRelabel,
            CutMethodArg::AugmentingPath => CutMethod::AugmentingPath,
            CutMethodArg::KargerStein => CutMethod::KargerStein,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.quiet);

    let t0 = Instant::now();
    let trees = match read_trees(&args.input) {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            eprintln!("No trees parsed from {:?}.", args.input);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Failed to read trees from {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    let guide = match &args.guide {
        None => None,
        Some(path) => match read_trees(path).map(|g| g.into_iter().next()) {
            Ok(Some(g)) => Some(g),
            Ok(None) => {
                eprintln!("No guide tree parsed from {path:?}.");
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("Failed to read guide tree from {path:?}: {e}");
                std::process::exit(2);
            }
        },
    };
    let read_s = t0.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Read {} input trees {read_s:.3}s", trees.len()));

    let config = config(&args);
    log_if(
        !args.quiet,
        format!(
            "Computing supertree using {} cuts, {} weighting, {} threads",
            config.cut_method, config.weighting, config.threads
        ),
    );

    let t1 = Instant::now();
    let multi = config.number_of_cuts > 1;
    let result = FlipCut::new(config).and_then(|flipcut| {
        if multi {
            flipcut.supertrees(&trees, guide.as_ref())
        } else {
            flipcut.supertree(&trees, guide.as_ref()).map(|t| vec![t])
        }
    });
    let supertrees = match result {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to compute supertree: {e}");
            std::process::exit(3);
        }
    };
    let comp_s = t1.elapsed().as_secs_f64();
    let best = supertrees.first().map(|t| t.score()).unwrap_or_default();
    log_if(!args.quiet, format!("Computed {} supertree(s), best score {best} {comp_s:.3}s", supertrees.len()));

    let t2 = Instant::now();
    if let Err(e) = write_supertrees(&args.output, &supertrees) {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let write_s = t2.elapsed().as_secs_f64();
    log_write_done(!args.quiet, &args.output, write_s);
}

/// Run configuration from the parsed flags; unknown weightings fall back to unit.
fn config(args: &Args) -> FlipCutConfig {
    let defaults = FlipCutConfig::default();
    FlipCutConfig {
        weighting: Weighting::parse_or_unit(Some(args.weighting.as_str())),
        bootstrap_threshold: args.bootstrap_threshold,
        threads: args.threads.unwrap_or(defaults.threads),
        cut_method: args.cut_method.into(),
        number_of_cuts: args.number_of_cuts.max(1),
        karger_rounds: args.karger_rounds,
        seed: args.seed,
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `warn` when quiet.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn log_if(show: bool, msg: String) {
    if show { eprintln!("{}", msg); }
}

fn log_write_done(show: bool, output: &PathBuf, secs: f64) {
    if !show { return; }
    if output.as_os_str() == "-" {
        eprintln!("Writing to stdout {secs:.3}s");
    } else {
        eprintln!("Writing to {} {secs:.3}s", output.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighting_defaults_to_unit() {
        let args = Args::try_parse_from(["flipcut", "-i", "trees.tre"]).unwrap();
        assert_eq!(args.weighting, "unit");
        assert_eq!(config(&args).weighting, Weighting::Unit);
    }

    #[test]
    fn flags_reach_the_config() {
        let args = Args::try_parse_from([
            "flipcut", "-i", "trees.tre", "-w", "bootstrap", "-c", "karger-stein", "-k", "0", "-t", "3", "--seed", "9",
        ])
        .unwrap();
        let config = config(&args);
        assert_eq!(config.weighting, Weighting::Bootstrap);
        assert_eq!(config.cut_method, CutMethod::KargerStein);
        assert_eq!(config.number_of_cuts, 1);
        assert_eq!(config.threads, 3);
        assert_eq!(config.seed, 9);
    }
}
