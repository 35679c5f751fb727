//! rivroute CLI - kinematic-wave channel routing over raster drainage maps

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rivroute_core::io::{read_geotiff, write_geotiff};
use rivroute_core::{LandMask, Raster};
use rivroute_routing::{
    build_network, plan_routing_order, stable_substeps, ChannelGeometry, DirectionEncoding,
    KinematicWave, NetworkParams, ReachParameters, RoutingDriver, RoutingSettings,
    SideflowBuilder, SplitRouting,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rivroute")]
#[command(author, version, about = "Kinematic-wave channel routing", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Build the flow network and its routing order
    Network {
        /// Flow-direction raster
        #[arg(long)]
        ldd: PathBuf,
        /// Land mask raster (non-zero = inside); defaults to every valid ldd cell
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Direction encoding: ldd, d8, esri
        #[arg(short, long, default_value = "ldd")]
        encoding: DirectionEncoding,
        /// Write the routing order of every pixel to this file
        #[arg(long)]
        order_out: Option<PathBuf>,
    },
    /// Route lateral inflow through the channel network
    Route {
        /// Settings file (JSON); defaults apply when omitted
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Flow-direction raster
        #[arg(long)]
        ldd: PathBuf,
        /// Land mask raster (non-zero = inside)
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Manning's roughness map
        #[arg(long)]
        mannings: PathBuf,
        /// Channel bed gradient map [m/m]
        #[arg(long)]
        gradient: PathBuf,
        /// Channel bottom width map [m]
        #[arg(long)]
        bottom_width: PathBuf,
        /// Channel side slope map (horizontal per vertical)
        #[arg(long)]
        side_slope: PathBuf,
        /// Bankfull depth map [m]
        #[arg(long)]
        bankfull_depth: PathBuf,
        /// Channel length map [m]; defaults to the cell size
        #[arg(long)]
        length: Option<PathBuf>,
        /// Long-term average discharge map [m3/s], required for split routing
        #[arg(long)]
        avg_discharge: Option<PathBuf>,
        /// Runoff depth per model step [mm]
        #[arg(long)]
        runoff: Option<PathBuf>,
        /// Pick the number of substeps from the wave celerity
        #[arg(long)]
        auto_substeps: bool,
        /// Override the number of model steps
        #[arg(long)]
        steps: Option<usize>,
        /// Override the worker count (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Output file for the mean discharge of the last step
        output: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} steps ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

fn read_map(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn read_ldd(path: &Path) -> Result<Raster<i32>> {
    let pb = spinner("Reading flow directions...");
    let raster: Raster<i32> = read_geotiff(path).context("Failed to read flow-direction raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

/// Mask from a file, or every cell of `ldd` holding a valid direction code
fn load_mask(
    path: Option<&Path>,
    ldd: &Raster<i32>,
    encoding: DirectionEncoding,
) -> Result<LandMask> {
    match path {
        Some(path) => {
            let raster: Raster<u8> = read_geotiff(path).context("Failed to read mask raster")?;
            ldd.ensure_same_shape(&raster)
                .context("Mask and flow-direction rasters differ in shape")?;
            Ok(LandMask::from_raster(&raster))
        }
        None => {
            let (rows, cols) = ldd.shape();
            let inside: Vec<bool> = ldd
                .data()
                .iter()
                .map(|&v| !ldd.is_nodata(v) && encoding.decode(v as f64).is_some())
                .collect();
            Ok(LandMask::from_bools(rows, cols, &inside)?)
        }
    }
}

/// Land-point values of a map
fn read_points(path: &Path, mask: &LandMask) -> Result<Vec<f64>> {
    let raster = read_map(path)?;
    mask.compress(&raster)
        .with_context(|| format!("{} does not match the mask", path.display()))
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info(input: &Path) -> Result<()> {
    let raster = read_map(input)?;
    let (rows, cols) = raster.shape();
    let transform = raster.transform();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Origin: ({:.6}, {:.6})",
        transform.origin_x, transform.origin_y
    );
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn network(
    ldd_path: &Path,
    mask_path: Option<&Path>,
    encoding: DirectionEncoding,
    order_out: Option<&Path>,
) -> Result<()> {
    let ldd = read_ldd(ldd_path)?;
    let mask = load_mask(mask_path, &ldd, encoding)?;

    let start = Instant::now();
    let pb = spinner("Building flow network...");
    let params = NetworkParams { encoding };
    let network = build_network(&ldd, &mask, &params).context("Failed to build flow network")?;
    let schedule = plan_routing_order(&network).context("Failed to plan routing order")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let headwaters = (0..network.len())
        .filter(|&p| network.is_headwater(p))
        .count();
    println!("Pixels: {}", network.len());
    println!("Outlets: {}", network.outlets().count());
    println!("Headwaters: {}", headwaters);
    println!("Batches: {}", schedule.num_batches());
    println!("Widest batch: {}", schedule.max_batch_width());

    match order_out {
        Some(path) => {
            let order: Vec<f64> = schedule.order().iter().map(|&o| o as f64).collect();
            let mut raster = mask.decompress(&order, -1.0)?;
            raster.set_transform(*ldd.transform());
            write_result(&raster, path)?;
            done("Routing order", path, elapsed);
        }
        None => println!("  Processing time: {:.2?}", elapsed),
    }
    Ok(())
}

struct RouteInputs {
    settings: Option<PathBuf>,
    ldd: PathBuf,
    mask: Option<PathBuf>,
    mannings: PathBuf,
    gradient: PathBuf,
    bottom_width: PathBuf,
    side_slope: PathBuf,
    bankfull_depth: PathBuf,
    length: Option<PathBuf>,
    avg_discharge: Option<PathBuf>,
    runoff: Option<PathBuf>,
    auto_substeps: bool,
    steps: Option<usize>,
    workers: Option<usize>,
    output: PathBuf,
}

fn route(inputs: RouteInputs) -> Result<()> {
    let mut settings = match &inputs.settings {
        Some(path) => RoutingSettings::from_path(path).context("Failed to load settings")?,
        None => RoutingSettings::default(),
    };
    if let Some(steps) = inputs.steps {
        settings.steps = steps;
    }
    if let Some(workers) = inputs.workers {
        settings.workers = workers;
    }
    settings.validate().context("Invalid settings")?;

    let ldd = read_ldd(&inputs.ldd)?;
    let mask = load_mask(inputs.mask.as_deref(), &ldd, settings.encoding)?;
    let network = build_network(&ldd, &mask, &settings.network_params())
        .context("Failed to build flow network")?;
    let n = network.len();
    info!("Land points: {}", n);

    let length = match &inputs.length {
        Some(path) => read_points(path, &mask)?,
        None => vec![ldd.cell_size().abs(); n],
    };
    let geometry = ChannelGeometry {
        mannings_n: read_points(&inputs.mannings, &mask)?,
        gradient: read_points(&inputs.gradient, &mask)?,
        bottom_width: read_points(&inputs.bottom_width, &mask)?,
        side_slope: read_points(&inputs.side_slope, &mask)?,
        bankfull_depth: read_points(&inputs.bankfull_depth, &mask)?,
        length,
    };
    let reach = ReachParameters::from_geometry(&geometry, &settings.hydraulics)
        .context("Invalid channel geometry")?;

    let avg_discharge = match &inputs.avg_discharge {
        Some(path) => Some(read_points(path, &mask)?),
        None => None,
    };

    let substeps = if inputs.auto_substeps {
        let typical = avg_discharge
            .clone()
            .unwrap_or_else(|| vec![settings.initial_discharge; n]);
        stable_substeps(settings.model_dt, &reach, &typical)?
    } else {
        settings.substeps()
    };
    info!("Routing substeps per model step: {}", substeps);

    let alpha_floodplain = match &settings.split {
        Some(split) => Some(split.floodplain_alpha(&reach)?),
        None => None,
    };
    let solver = KinematicWave::new(
        network,
        reach,
        alpha_floodplain,
        settings.solver_params(substeps),
    )
    .context("Failed to construct solver")?;

    let initial = vec![settings.initial_discharge; n];
    let mut driver = match &settings.split {
        Some(split_params) => {
            let avg = avg_discharge
                .as_deref()
                .context("Split routing needs --avg-discharge")?;
            let split = SplitRouting::new(&solver, avg, split_params)
                .context("Invalid split-routing thresholds")?;
            RoutingDriver::with_split(solver, split, initial, substeps)?
        }
        None => RoutingDriver::new(solver, initial, substeps)?,
    };

    let mut builder = SideflowBuilder::new(driver.solver().reach().reach_length());
    let constant: Vec<f64> = driver
        .solver()
        .reach()
        .reach_length()
        .iter()
        .map(|l| settings.sideflow * l)
        .collect();
    builder.add_rate("constant sideflow", &constant)?;
    if let Some(path) = &inputs.runoff {
        let runoff = read_points(path, &mask)?;
        let cell_area = ldd.cell_size() * ldd.cell_size();
        builder.add_depth("runoff", &runoff, &vec![cell_area; n], settings.model_dt)?;
    }
    let sideflow = builder.finish();

    let start = Instant::now();
    let pb = progress(settings.steps as u64);
    let mut mean = driver.discharge()?;
    let mut outflow = 0.0;
    let mut unconverged = 0;
    for _ in 0..settings.steps {
        let summary = driver.step(&sideflow).context("Routing step failed")?;
        outflow += summary.outlet_outflow_volume;
        unconverged += summary.unconverged();
        mean = summary.mean_discharge;
        pb.inc(1);
    }
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    if unconverged > 0 {
        warn!("{} pixel solves did not converge", unconverged);
    }
    println!("Outlet outflow: {:.3} m3", outflow);

    let mut raster = mask.decompress(&mean, -9999.0)?;
    raster.set_transform(*ldd.transform());
    write_result(&raster, &inputs.output)?;
    done("Mean discharge", &inputs.output, elapsed);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Info { input } => info(&input),
        Commands::Network {
            ldd,
            mask,
            encoding,
            order_out,
        } => network(&ldd, mask.as_deref(), encoding, order_out.as_deref()),
        Commands::Route {
            settings,
            ldd,
            mask,
            mannings,
            gradient,
            bottom_width,
            side_slope,
            bankfull_depth,
            length,
            avg_discharge,
            runoff,
            auto_substeps,
            steps,
            workers,
            output,
        } => route(RouteInputs {
            settings,
            ldd,
            mask,
            mannings,
            gradient,
            bottom_width,
            side_slope,
            bankfull_depth,
            length,
            avg_discharge,
            runoff,
            auto_substeps,
            steps,
            workers,
            output,
        }),
    }
}
