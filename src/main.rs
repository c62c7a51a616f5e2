//! nbody-diag - post-processing for N-body simulation runs
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, missing files or a failed computation

use anyhow::{Context, Result};
use chrono::Utc;
use nbody_diag::analysis::{
    compute_diagnostics, isochrony_slope, select_representatives, trajectory_paths,
};
use nbody_diag::cli::{Args, Command};
use nbody_diag::config::{Config, DEFAULT_CONFIG_FILE};
use nbody_diag::dataset::{self, read_dataset, write_dataset, Dataset};
use nbody_diag::error::DatasetError;
use nbody_diag::initial::{self, InitModel};
use nbody_diag::record;
use nbody_diag::report::{self, IsochronySummary, SummaryMetadata};
use nbody_diag::scanner;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    // Load configuration before logging so the file can raise the level
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(&args));

    info!("nbody-diag v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    if let Err(e) = run(args, &config) {
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Handle --init-config: generate a default .nbody-diag.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to tune the isochrony fit, figures and output names.");
    Ok(())
}

/// Initialize logging at `level`.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand.
fn run(args: Args, config: &Config) -> Result<()> {
    let Some(command) = args.command else {
        return Ok(());
    };

    match command {
        Command::Convert { folder, .. } => run_convert(&folder, config, args.quiet),
        Command::Verify { file, .. } => run_verify(&file, config),
        Command::Isochrony { file, no_plots, .. } => run_isochrony(&file, config, no_plots),
        Command::Trajectory { file, .. } => run_trajectory(&file, config),
        Command::InitCond {
            output,
            nb,
            model,
            param,
            seed,
        } => run_init_cond(&output, nb, model, param, seed),
        Command::Inspect {
            record_file,
            ini_file,
            limit,
        } => run_inspect(&record_file, &ini_file, limit),
    }
}

/// `<dir>/<name>` where `dir` is the directory of `file`.
fn sibling(file: &Path, name: &str) -> PathBuf {
    file.parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn load_dataset(file: &Path) -> Result<Dataset> {
    println!("📂 Loading dataset: {}", file.display());
    let dataset = read_dataset(file)
        .with_context(|| format!("Failed to read dataset {}", file.display()))?;
    info!(
        "{} timesteps, {} particles, {} bins",
        dataset.timestep_count(),
        dataset.particle_count(),
        dataset.bin_count()
    );
    Ok(dataset)
}

fn run_convert(folder: &Path, config: &Config, quiet: bool) -> Result<()> {
    println!("📥 Reading snapshots in {}", folder.display());

    let reader = match scanner::open_reader(folder) {
        Ok(reader) => reader,
        Err(DatasetError::NoSnapshots(_)) => {
            eprintln!("Fichiers introuvables.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open the simulation directory"),
    };

    let data = dataset::aggregate(reader.as_ref(), !quiet)?;
    println!(
        "   {} timesteps, {} particles",
        data.timestep_count(),
        data.particle_count()
    );

    for ext in ["pickle", "mat"] {
        let path = folder.join(format!("{}.{}", config.output.dataset_stem, ext));
        write_dataset(&path, &data)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("💾 Saved {}", path.display());
    }

    println!("\n✅ Conversion complete!");
    Ok(())
}

fn run_verify(file: &Path, config: &Config) -> Result<()> {
    let data = load_dataset(file)?;

    println!("\n🔬 Computing diagnostics...");
    let diagnostics = compute_diagnostics(&data, config.verify.density_curves);

    if let (Some(min), Some(max)) = (
        diagnostics.energy_drift.iter().copied().reduce(f64::min),
        diagnostics.energy_drift.iter().copied().reduce(f64::max),
    ) {
        println!("   Energy drift: {:.3}% to {:.3}%", min, max);
    }

    let verification = sibling(file, "verification.png");
    report::plot_verification(&verification, &diagnostics)?;
    println!("🖼️  Saved {}", verification.display());

    let density = sibling(file, "density.png");
    report::plot_density(&density, &diagnostics)?;
    println!("🖼️  Saved {}", density.display());

    println!("\n✅ Verification complete!");
    Ok(())
}

fn run_isochrony(file: &Path, config: &Config, no_plots: bool) -> Result<()> {
    let start_time = Instant::now();
    let data = load_dataset(file)?;
    let params = config.isochrony_params();

    println!("\n🔬 Computing isochrony slope...");
    let result = isochrony_slope(&data, &params).context("Isochrony computation failed")?;

    if result.fit_count() == 0 {
        warn!(
            "No timestep reached {} defined points",
            params.min_point_count
        );
    }

    if !no_plots {
        let series = sibling(file, &format!("pente_nb_{}.png", params.min_point_count));
        report::plot_slope_series(&series, &result)?;
        println!("🖼️  Saved {}", series.display());

        if result.last_fit().is_some() {
            let last = sibling(file, &format!("last_pente_nb_{}.png", params.min_point_count));
            report::plot_last_fit(&last, &result)?;
            println!("🖼️  Saved {}", last.display());
        }
    }

    let metadata = SummaryMetadata {
        dataset: file.display().to_string(),
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        particle_count: data.particle_count(),
        orbits_retained: result.particles.len(),
        min_point_count: params.min_point_count,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let summary = IsochronySummary::new(metadata, &result);

    let summary_path = sibling(file, &report::summary_file_name(params.min_point_count));
    report::write_json_summary(&summary, &summary_path)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    println!("💾 Saved {}", summary_path.display());

    println!("\n📊 Isochrony Summary:");
    for line in report::format_text_summary(&summary).lines() {
        println!("   {}", line);
    }
    println!(
        "\n✅ Isochrony complete in {:.1}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_trajectory(file: &Path, config: &Config) -> Result<()> {
    let data = load_dataset(file)?;

    println!("\n🔬 Computing local periods...");
    let result = isochrony_slope(&data, &config.isochrony_params())
        .context("Isochrony computation failed")?;

    let selection = select_representatives(&result, config.trajectory.point_count)?;
    info!(
        "Selected {} orbits at t = {:.3}",
        selection.columns.len(),
        result.t[selection.step]
    );

    let paths = trajectory_paths(&result, &selection, config.trajectory.label_stride);
    let phase = sibling(file, "traj_1.png");
    report::plot_trajectories(&phase, &paths)?;
    println!("🖼️  Saved {}", phase.display());

    let curves: Vec<(usize, Vec<f64>)> = paths
        .iter()
        .map(|path| (path.particle, data.particle_radius(path.particle).to_vec()))
        .collect();
    let radius = sibling(file, "traj_2.png");
    report::plot_radius_curves(&radius, &result.t, &curves)?;
    println!("🖼️  Saved {}", radius.display());

    println!("\n✅ Trajectories complete!");
    Ok(())
}

fn run_init_cond(
    output: &Path,
    nb: usize,
    model: InitModel,
    param: Option<f64>,
    seed: Option<u64>,
) -> Result<()> {
    let param = match param {
        Some(param) => param,
        None => anyhow::bail!(model.missing_parameter_message()),
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let points = initial::generate(model, nb, param, &mut rng)?;
    initial::write_initial_conditions(output, &points)?;

    println!(
        "✅ Wrote {} particles ({} {}) to {}",
        nb,
        model,
        param,
        output.display()
    );
    Ok(())
}

fn run_inspect(record_file: &Path, ini_file: &Path, limit: usize) -> Result<()> {
    let particle_count = record::read_particle_count(ini_file)?;
    let file = record::read_records(record_file, particle_count)?;

    println!("📄 {}", record_file.display());
    println!("   Particles per record: {}", file.particle_count);
    println!(
        "   Record size: {} bytes",
        record::record_size(file.particle_count)?
    );
    println!("   Records: {}", file.records.len());
    if file.trailing_bytes > 0 {
        println!("   ⚠️  {} trailing bytes ignored", file.trailing_bytes);
    }

    for rec in file.records.iter().take(limit) {
        println!(
            "\n   t = {:.6} (c = {}), E = {:.6e}, virial = {:.4}, t_dyn = {:.4}, eps = {:.3e}",
            rec.t, rec.c, rec.energy, rec.virial, rec.dynamical_time, rec.epsilon
        );
        println!(
            "   R10 = {:.4}, R50 = {:.4}, R90 = {:.4}",
            rec.rayons[0], rec.rayons[1], rec.rayons[2]
        );
        if let (Some(p), Some(v)) = (rec.positions.first(), rec.speeds.first()) {
            println!("   particle 0: x = {:?}, v = {:?}", p, v);
        }
    }

    Ok(())
}

/// Where the configuration came from, logged once logging is initialized.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    Fallback(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
            ConfigSource::BuiltIn => debug!("No config file found, using defaults"),
            ConfigSource::Fallback(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::BuiltIn)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(e))),
    }
}
