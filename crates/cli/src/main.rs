//! Runnel CLI - overland flow simulations on synthetic catchments

mod scenario;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use runnel_algorithms::kinwave::{Hydrograph, KinwaveImplicit, KinwaveParams, Runoff};
use runnel_core::graph::{GraphParams, GridTopology};
use runnel_parallel::ProcessingMode;
use scenario::{Catchment, Terrain};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "runnel")]
#[command(author, version, about = "Implicit kinematic-wave overland flow", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a storm over a synthetic catchment and print the outlet hydrograph
    Simulate {
        /// Terrain: plane, vcatchment
        #[arg(short, long, default_value = "vcatchment")]
        terrain: String,
        /// Flow routing: d8, mfd
        #[arg(short = 'f', long, default_value = "d8")]
        routing: String,
        /// Grid rows
        #[arg(long, default_value = "50")]
        rows: usize,
        /// Grid columns
        #[arg(long, default_value = "31")]
        cols: usize,
        /// Cell size (m)
        #[arg(long, default_value = "10.0")]
        cell_size: f64,
        /// Downhill gradient towards the bottom row (m/m)
        #[arg(long, default_value = "0.01")]
        slope: f64,
        /// Side slope gradient of the V catchment (m/m)
        #[arg(long, default_value = "0.05")]
        side_slope: f64,
        /// Runoff intensity during the storm (mm/hr)
        #[arg(long, default_value = "87.0")]
        rain: f64,
        /// Storm start (s)
        #[arg(long, default_value = "0.0")]
        storm_start: f64,
        /// Storm end (s)
        #[arg(long, default_value = "1800.0")]
        storm_end: f64,
        /// Simulated duration (s)
        #[arg(short, long, default_value = "7200.0")]
        duration: f64,
        /// Time step (s)
        #[arg(long, default_value = "60.0")]
        dt: f64,
        /// Manning's roughness (overrides --params)
        #[arg(short = 'n', long)]
        roughness: Option<f64>,
        /// JSON file with solver parameters
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Solve watersheds in parallel (0 = all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
        /// Write the hydrograph CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn progress(steps: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} steps")?,
    );
    Ok(pb)
}

fn parse_terrain(s: &str) -> Result<Terrain> {
    match s.to_lowercase().as_str() {
        "plane" => Ok(Terrain::Plane),
        "vcatchment" | "v" => Ok(Terrain::VCatchment),
        _ => anyhow::bail!("Unknown terrain: {}. Use plane or vcatchment.", s),
    }
}

fn parse_routing(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "d8" => Ok(false),
        "mfd" => Ok(true),
        _ => anyhow::bail!("Unknown routing: {}. Use d8 or mfd.", s),
    }
}

fn processing_mode(threads: Option<usize>) -> ProcessingMode {
    match threads {
        None => ProcessingMode::Sequential,
        Some(0) => ProcessingMode::Parallel,
        Some(n) => ProcessingMode::ParallelWith(n),
    }
}

fn load_params(path: Option<&PathBuf>, roughness: Option<f64>) -> Result<KinwaveParams> {
    let mut params = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<KinwaveParams>(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => KinwaveParams::default(),
    };
    if let Some(n) = roughness {
        params.roughness = n;
    }
    params.validate().context("Invalid solver parameters")?;
    Ok(params)
}

fn csv_writer(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    })
}

/// Record each outlet's outflow at `time`; returns the total over outlets
fn record_outlets(hydrographs: &mut [Hydrograph], outflow: &[f64], time: f64) -> Result<f64> {
    let mut total = 0.0;
    for h in hydrographs.iter_mut() {
        let q = *outflow
            .get(h.node())
            .with_context(|| format!("Outlet {} has no discharge value", h.node()))?;
        h.record(time, q)?;
        total += q;
    }
    Ok(total)
}

/// Storm intensity over the step starting at `t`
fn storm_rate(t: f64, start: f64, end: f64, rain: f64) -> f64 {
    if t >= start && t < end {
        rain
    } else {
        0.0
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Simulate {
            terrain,
            routing,
            rows,
            cols,
            cell_size,
            slope,
            side_slope,
            rain,
            storm_start,
            storm_end,
            duration,
            dt,
            roughness,
            params,
            threads,
            output,
        } => {
            let terrain = parse_terrain(&terrain)?;
            let mfd = parse_routing(&routing)?;
            if !(dt > 0.0 && duration > 0.0) {
                anyhow::bail!("dt and duration must be positive");
            }
            let params = load_params(params.as_ref(), roughness)?;
            let mode = processing_mode(threads);

            let pb = spinner("Building catchment...")?;
            let start = Instant::now();
            let catchment = Catchment {
                terrain,
                rows,
                cols,
                cell_size,
                slope,
                side_slope,
            };
            let dem = catchment.elevation().context("Failed to build terrain")?;
            let flow = catchment.routing(mfd).context("Failed to lay out flow directions")?;
            let topology = GridTopology::new(&dem, &flow, GraphParams::default())
                .context("Failed to build routing graph")?;
            pb.finish_and_clear();

            let graph = topology.into_graph();
            let outlets: Vec<usize> = graph.outlets().collect();
            info!(
                "Catchment: {} nodes, {} links, {} outlet(s)",
                graph.num_nodes(),
                graph.num_links(),
                outlets.len()
            );

            let mut model = KinwaveImplicit::new(graph, params)
                .context("Failed to set up solver")?
                .with_processing_mode(mode);
            let mut hydrographs: Vec<Hydrograph> =
                outlets.iter().map(|&o| Hydrograph::new(o, 0.0)).collect();
            let mut peak: Option<(f64, f64)> = None;
            let mut out = csv_writer(output.as_ref())?;
            writeln!(out, "time_s,runoff_mm_hr,total_outlet_discharge_m3_s,stored_volume_m3")?;

            let steps = (duration / dt).ceil() as u64;
            let pb = progress(steps)?;
            let mut nonconverged = 0usize;
            for step in 0..steps {
                let t = step as f64 * dt;
                let rate = storm_rate(t, storm_start, storm_end, rain);
                let report = model
                    .run_one_step(dt, &Runoff::Uniform(rate))
                    .with_context(|| format!("Step {} at t = {} s failed", step, t))?;
                nonconverged += report.nonconverged.len();

                let q = record_outlets(&mut hydrographs, model.outflow(), report.time)?;
                if peak.map_or(true, |(_, best)| q > best) {
                    peak = Some((report.time, q));
                }
                writeln!(
                    out,
                    "{},{},{:.9e},{:.9e}",
                    report.time,
                    rate,
                    q,
                    model.state().stored_volume(model.graph())
                )?;
                pb.inc(1);
            }
            pb.finish_and_clear();
            out.flush()?;

            let balance = model.state().mass_balance();
            if let Some((t, q)) = peak {
                info!("Peak total outlet discharge: {:.6} m³/s at t = {} s", q, t);
            }
            for h in &hydrographs {
                if let Some((t, q)) = h.peak() {
                    tracing::debug!(
                        "outlet {}: peak {:.6} m³/s at t = {} s, volume {:.6} m³",
                        h.node(),
                        q,
                        t,
                        h.volume()
                    );
                }
            }
            info!("Runoff volume:  {:.6} m³", balance.runoff_volume);
            info!("Outlet volume:  {:.6} m³", balance.outlet_volume);
            info!("Storage change: {:.6} m³", balance.storage_change);
            info!(
                "Mass balance residual: {:.3e} m³ ({:.3e} relative)",
                balance.residual(),
                balance.relative_residual()
            );
            if nonconverged > 0 {
                warn!("{} node solves did not converge", nonconverged);
            }
            info!("Processing time: {:.2?}", start.elapsed());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storm_window() {
        assert_eq!(storm_rate(0.0, 0.0, 60.0, 87.0), 87.0);
        assert_eq!(storm_rate(60.0, 0.0, 60.0, 87.0), 0.0);
        assert_eq!(storm_rate(30.0, 60.0, 120.0, 87.0), 0.0);
    }

    #[test]
    fn test_each_outlet_keeps_its_own_series() {
        let mut hydrographs = vec![Hydrograph::new(2, 0.0), Hydrograph::new(5, 0.0)];
        let outflow = [9.0, 9.0, 1.5, 9.0, 9.0, 0.5];

        let total = record_outlets(&mut hydrographs, &outflow, 60.0).unwrap();
        assert_eq!(total, 2.0);
        assert_eq!(hydrographs[0].node(), 2);
        assert_eq!(hydrographs[0].discharge(), &[1.5]);
        assert_eq!(hydrographs[1].node(), 5);
        assert_eq!(hydrographs[1].discharge(), &[0.5]);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse_terrain("Plane").unwrap(), Terrain::Plane);
        assert!(parse_terrain("dome").is_err());
        assert!(parse_routing("mfd").unwrap());
        assert!(parse_routing("dinf").is_err());
        assert_eq!(processing_mode(Some(0)), ProcessingMode::Parallel);
        assert_eq!(processing_mode(None), ProcessingMode::Sequential);
    }
}
