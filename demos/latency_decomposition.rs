// Latency decomposition for a single 4 KiB page on one device
// Splits the round trip into TO (write), LAUNCH and FROM (read)

use std::time::Duration;
use xferbench::{
    BackendKind, BenchmarkConfiguration, BenchmarkRunner, RunnerOptions, SimulatedFleet, Stats,
    TransferMode,
};

const PAGE_SIZE: usize = 4096;

fn print_stats(label: &str, stats: &Stats) {
    println!("{}:", label);
    println!("  Min:    {:6} ns ({:7.2} us)", stats.min, stats.min_us());
    println!("  Max:    {:6} ns ({:7.2} us)", stats.max, stats.max_us());
    println!("  Mean:   {:6} ns ({:7.2} us)", stats.mean, stats.mean_us());
    println!("  StdDev: {:6} ns ({:7.2} us)", stats.stddev, stats.stddev_us());
    println!();
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let options = RunnerOptions {
        decompose: true,
        verify: true,
        ..RunnerOptions::default()
    };
    let iterations = options.iterations;

    println!("=== LATENCY DECOMPOSITION TEST ===");
    println!("Measuring: TO, LAUNCH, FROM separately");
    println!("Page size: {} bytes", PAGE_SIZE);
    println!("Iterations: {}", iterations);
    println!();

    let fleet = SimulatedFleet::for_backend(BackendKind::Simulator, Duration::from_micros(1));
    let mut runner = BenchmarkRunner::new(fleet, options);
    let config = BenchmarkConfiguration {
        device_count: 1,
        worker_count: 1,
        buffer_size: PAGE_SIZE,
        mode: TransferMode::Sequential,
    };
    let result = runner.run_configuration(&config)?;

    println!("=== DECOMPOSITION RESULTS ({}) ===", result.backend);
    println!();
    print_stats("TO (write)", &result.write_stats);
    if let Some(launch) = &result.launch_stats {
        print_stats("LAUNCH", launch);
    }
    print_stats("FROM (read)", &result.read_stats);
    if let Some(total) = &result.total_stats {
        print_stats("TOTAL", total);
    }

    if let (Some(b), Some(launch), Some(total)) =
        (result.breakdown(), &result.launch_stats, &result.total_stats)
    {
        println!("=== BREAKDOWN (Percentages) ===");
        println!("TO:       {:.1}% ({} ns)", b.write_pct, result.write_stats.mean);
        println!("LAUNCH:   {:.1}% ({} ns)", b.launch_pct, launch.mean);
        println!("FROM:     {:.1}% ({} ns)", b.read_pct, result.read_stats.mean);
        println!("{}", "-".repeat(29));
        println!("TOTAL:    100.0% ({} ns)", total.mean);
        println!();
    }

    if let Some(check) = result.round_trip {
        let verdict = if check.passed() { "OK" } else { "FAILED" };
        println!(
            "Round trip {}: {} mismatched bytes across {} devices",
            verdict, check.mismatched_bytes, check.members_checked
        );
    }

    println!("=== Analysis complete ===");
    Ok(())
}
