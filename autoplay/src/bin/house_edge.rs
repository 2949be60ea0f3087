use anyhow::Context;
use clap::Parser;
use plinko_autoplay::house_edge_report;
use plinko_execution::CenterBias;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the return to player of every board.", long_about = None)]
struct Args {
    /// Simulated drops per board (0 skips the simulation).
    #[arg(short, long, default_value_t = 100_000)]
    samples: u64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Extra probability of landing in the centre bucket.
    #[arg(short, long)]
    bias: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let bias = match args.bias {
        Some(value) => CenterBias::new(value).context("invalid bias")?,
        None => CenterBias::default(),
    };
    let reports = house_edge_report(args.samples, args.seed, bias)?;

    println!(
        "{:>4} {:>6} {:>8} {:>8} {:>9} {:>9} {:>7}",
        "rows", "risk", "centre", "edge", "analytic", "simulated", "house"
    );
    for report in reports {
        println!(
            "{:>4} {:>6} {:>8} {:>8} {:>9.4} {:>9.4} {:>6.2}%",
            report.rows,
            report.risk.to_string(),
            report.center.to_string(),
            report.edge.to_string(),
            report.analytic,
            report.simulated,
            report.house_edge() * 100.0
        );
    }
    Ok(())
}
