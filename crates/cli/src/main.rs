use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{load_ratings, QueryVector, RatingMatrix};
use neighbors::{partition, predict_local, PredictionReport};
use rand::{rngs::StdRng, Rng, SeedableRng};
use server::PredictionOrchestrator;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// knn-predict - nearest-neighbor rating prediction
#[derive(Parser)]
#[command(name = "knn-predict")]
#[command(
    about = "Predict a rating from the k nearest viewers in a ratings matrix",
    long_about = None
)]
struct Cli {
    /// Number of workers the viewers are partitioned across
    /// (defaults to the available parallelism)
    #[arg(short, long, env = "KNN_WORKERS", global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the target-item rating for a query
    Predict {
        /// Ratings file (`n m` header followed by n*m values)
        #[arg(short, long)]
        file: PathBuf,

        /// Known ratings for every item except the last, e.g. "4,3.5,5,2".
        /// Prompted for interactively when omitted.
        #[arg(short, long)]
        query: Option<String>,

        /// Number of neighbors to average. Prompted for when omitted.
        #[arg(short)]
        k: Option<usize>,

        /// Where workers run
        #[arg(long, value_enum, default_value_t = Substrate::Pool)]
        substrate: Substrate,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a random ratings file in half-star steps (0.5 to 5.0)
    Generate {
        /// Number of viewers (rows)
        #[arg(long)]
        viewers: usize,

        /// Number of items (columns), target included
        #[arg(long)]
        items: usize,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,

        /// RNG seed for reproducible files
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show a ratings file's shape and how it would be partitioned
    Inspect {
        /// Ratings file to inspect
        #[arg(short, long)]
        file: PathBuf,

        /// Print the partition plan as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Substrate {
    /// One tokio task per worker, channels between them
    Pool,
    /// All workers in the calling thread, one after another
    Local,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let workers = resolve_workers(cli.workers)?;

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Predict {
            file,
            query,
            k,
            substrate,
            json,
        } => handle_predict(&file, query, k, workers, substrate, json).await?,
        Commands::Generate {
            viewers,
            items,
            output,
            seed,
        } => handle_generate(viewers, items, &output, seed)?,
        Commands::Inspect { file, json } => handle_inspect(&file, workers, json)?,
    }

    Ok(())
}

/// Worker count from the flag/env, or the host's parallelism
fn resolve_workers(requested: Option<usize>) -> Result<usize> {
    match requested {
        Some(0) => bail!("worker count must be at least 1"),
        Some(workers) => Ok(workers),
        None => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)),
    }
}

fn load(file: &Path) -> Result<RatingMatrix> {
    let matrix = load_ratings(file)
        .with_context(|| format!("Failed to load ratings from {}", file.display()))?;
    info!(
        "Loaded {} viewers x {} items from {}",
        matrix.viewers(),
        matrix.items(),
        file.display()
    );
    Ok(matrix)
}

/// Handle the 'predict' command
async fn handle_predict(
    file: &Path,
    query: Option<String>,
    k: Option<usize>,
    workers: usize,
    substrate: Substrate,
    json: bool,
) -> Result<()> {
    let matrix = load(file)?;

    // Prompts go to stderr so stdout carries only the report
    let (query, k) = {
        let mut input = io::stdin().lock();
        let mut prompts = io::stderr().lock();
        let query = match query {
            Some(text) => QueryVector::parse(&text).context("Invalid --query")?,
            None => prompt_query(&mut input, &mut prompts, matrix.comparison_items())?,
        };
        let k = match k {
            Some(k) => k,
            None => prompt_k(&mut input, &mut prompts)?,
        };
        (query, k)
    };

    let report = match substrate {
        Substrate::Pool => {
            let mut orchestrator = PredictionOrchestrator::new(workers)?;
            let result = orchestrator.predict(&matrix, &query, k).await;
            orchestrator.shutdown().await;
            result?
        }
        Substrate::Local => predict_local(&matrix, &query, workers, k)
            .context("Prediction failed")?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, matrix.items());
    }
    Ok(())
}

/// Ask for one rating per comparison item, like "Enter your rating for movie 1: "
fn prompt_query(
    input: &mut impl BufRead,
    output: &mut impl Write,
    items: usize,
) -> Result<QueryVector> {
    let mut ratings = Vec::with_capacity(items);
    for item in 1..=items {
        let line = prompt(input, output, &format!("Enter your rating for movie {}: ", item))?;
        let parsed = QueryVector::parse(&line)
            .with_context(|| format!("Invalid rating for movie {}", item))?;
        match parsed.as_slice() {
            [rating] => ratings.push(*rating),
            _ => bail!("Expected exactly one rating for movie {}, got '{}'", item, line),
        }
    }
    Ok(QueryVector::new(ratings))
}

fn prompt_k(input: &mut impl BufRead, output: &mut impl Write) -> Result<usize> {
    let line = prompt(input, output, "Enter the number of neighbors (k): ")?;
    line.parse()
        .with_context(|| format!("Invalid k '{}'", line))
}

fn prompt(input: &mut impl BufRead, output: &mut impl Write, message: &str) -> Result<String> {
    write!(output, "{}", message)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(anyhow!("Input ended before all values were entered"));
    }
    Ok(line.trim().to_string())
}

/// Handle the 'generate' command
fn handle_generate(viewers: usize, items: usize, output: &Path, seed: Option<u64>) -> Result<()> {
    if viewers == 0 || items == 0 {
        bail!("viewers and items must both be at least 1");
    }
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    write_ratings(&mut writer, &mut rng, viewers, items)?;
    writer.flush()?;

    println!(
        "{} Wrote {} viewers x {} items to {} (seed {})",
        "✓".green(),
        viewers,
        items,
        output.display(),
        seed
    );
    Ok(())
}

/// Write an `n m` header and `n` rows of half-step ratings
fn write_ratings(
    out: &mut impl Write,
    rng: &mut impl Rng,
    viewers: usize,
    items: usize,
) -> io::Result<()> {
    writeln!(out, "{} {}", viewers, items)?;
    for _ in 0..viewers {
        let row: Vec<String> = (0..items)
            .map(|_| format!("{:.1}", rng.random_range(1..=10u32) as f64 * 0.5))
            .collect();
        writeln!(out, "{}", row.join(" "))?;
    }
    Ok(())
}

/// Handle the 'inspect' command
fn handle_inspect(file: &Path, workers: usize, json: bool) -> Result<()> {
    let matrix = load(file)?;
    let plan = partition::plan(matrix.viewers(), workers).context("Failed to partition viewers")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", format!("Ratings file: {}", file.display()).bold().blue());
    println!("{}Viewers: {}", "• ".green(), matrix.viewers());
    println!(
        "{}Items: {} ({} comparison + 1 target)",
        "• ".green(),
        matrix.items(),
        matrix.comparison_items()
    );
    println!("{}Target mean: {:.3}", "• ".cyan(), matrix.target_mean());
    println!("Partition across {} workers:", plan.workers());
    for range in plan.ranges() {
        println!(
            "  - worker {}: viewers {:?} ({} rows)",
            range.rank,
            range.range(),
            range.count
        );
    }
    Ok(())
}

/// Helper function to format and print a prediction report
fn print_report(report: &PredictionReport, items: usize) {
    println!("{}", "Nearest viewers:".bold().blue());
    println!("{:>6}  {:>8}  {:>10}  {:>8}", "rank", "viewer", "distance", "rating");
    for (idx, neighbor) in report.neighbors.iter().enumerate() {
        println!(
            "{:>6}  {:>8}  {:>10.2}  {:>8.1}",
            (idx + 1).to_string().green(),
            neighbor.viewer_id,
            neighbor.distance,
            neighbor.target_rating
        );
    }
    println!(
        "The predicted rating for movie {} is {}.",
        items,
        format!("{:.1}", report.prediction).bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_generated_file_parses() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut buffer = Vec::new();
        write_ratings(&mut buffer, &mut rng, 12, 5).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let matrix = data_loader::parse_ratings(&text).unwrap();
        assert_eq!(matrix.viewers(), 12);
        assert_eq!(matrix.items(), 5);
        assert!(matrix
            .as_slice()
            .iter()
            .all(|&r| (0.5..=5.0).contains(&r) && (r * 2.0).fract() == 0.0));
    }

    #[test]
    fn test_generation_is_seeded() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_ratings(&mut first, &mut StdRng::seed_from_u64(3), 4, 3).unwrap();
        write_ratings(&mut second, &mut StdRng::seed_from_u64(3), 4, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prompt_query_reads_one_rating_per_item() {
        let mut input = Cursor::new("4\n3.5\n 5 \n");
        let query = prompt_query(&mut input, &mut io::sink(), 3).unwrap();
        assert_eq!(query.as_slice(), &[4.0, 3.5, 5.0]);
    }

    #[test]
    fn test_prompts_written_to_given_output() {
        let mut input = Cursor::new("4\n2\n");
        let mut prompts = Vec::new();
        prompt_query(&mut input, &mut prompts, 1).unwrap();
        prompt_k(&mut input, &mut prompts).unwrap();

        let text = String::from_utf8(prompts).unwrap();
        assert_eq!(
            text,
            "Enter your rating for movie 1: Enter the number of neighbors (k): "
        );
    }

    #[test]
    fn test_prompt_query_rejects_short_input() {
        let mut input = Cursor::new("4\n");
        assert!(prompt_query(&mut input, &mut io::sink(), 2).is_err());

        let mut input = Cursor::new("4 5\n");
        assert!(prompt_query(&mut input, &mut io::sink(), 1).is_err());
    }

    #[test]
    fn test_prompt_k() {
        let mut input = Cursor::new("3\n");
        assert_eq!(prompt_k(&mut input, &mut io::sink()).unwrap(), 3);

        let mut input = Cursor::new("three\n");
        assert!(prompt_k(&mut input, &mut io::sink()).is_err());
    }

    #[test]
    fn test_resolve_workers() {
        assert_eq!(resolve_workers(Some(4)).unwrap(), 4);
        assert!(resolve_workers(Some(0)).is_err());
        assert!(resolve_workers(None).unwrap() >= 1);
    }
}
