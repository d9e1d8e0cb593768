//! `zia-probe`: program a CoolRunner-II and discover its ZIA routing.
//!
//! ```text
//! USAGE:
//!   zia-probe info                         Read and check IDCODE, read USERCODE
//!   zia-probe erase                        Bulk erase the device
//!   zia-probe program <crbit>              Erase, then program a crbit image
//!   zia-probe discover --base <jed> ...    Probe ZIA cells, checkpointing as it goes
//!   zia-probe table <checkpoint> [--rust]  Print a checkpoint as a table or Rust source
//! ```

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use zia_probe::cable::{self, Cable};
use zia_probe::discovery::{DiscoveryPolicy, DiscoverySession, Engine};
use zia_probe::image::ConfigurationImage;
use zia_probe::isc::{Cpld, StdDelay};
use zia_probe::profile::DeviceProfile;
use zia_probe::render::{self, NoProgress, ProgressSink, TerminalProgress};
use zia_probe::statemachine::JtagSM;
use zia_probe::store::{CheckpointStore, JsonFileStore};
use zia_probe::synth::{ExternalCompiler, FuseMapTemplate, Synthesizer};

#[derive(Parser)]
#[command(name = "zia-probe", about = "CoolRunner-II programmer and ZIA routing discovery", version)]
struct Cli {
    /// Probe to use: `usb` or `sim`.
    #[arg(long, default_value = "usb")]
    cable: String,
    /// Built-in device profile.
    #[arg(long, default_value = "xc2c32a")]
    profile: String,
    /// JSON device profile, overrides --profile.
    #[arg(long)]
    profile_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Read and verify IDCODE, then read USERCODE.
    Info,
    /// Bulk erase the device.
    Erase,
    /// Erase the device and program a crbit image.
    Program {
        /// crbit file, one fuse row per line.
        crbit: PathBuf,
    },
    /// Discover ZIA routing cell by cell.
    Discover(DiscoverArgs),
    /// Print a checkpoint.
    Table {
        /// Checkpoint written by `discover`.
        checkpoint: PathBuf,
        /// Emit a Rust `XC2ZIAInput` table instead of text.
        #[arg(long)]
        rust: bool,
    },
}

#[derive(Args)]
struct DiscoverArgs {
    /// Base fuse-map template with `{zia}` and `{pterm}` fields.
    #[arg(long)]
    base: PathBuf,
    /// Alternate fuse-map template, tried when the base image finds nothing.
    #[arg(long)]
    alt: Option<PathBuf>,
    /// JED to crbit converter, run as `<compiler> <file.jed>`.
    #[arg(long)]
    compiler: PathBuf,
    /// Where work-in-progress fuse maps are written.
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
    /// Checkpoint file, resumed if it exists.
    #[arg(long, default_value = "zia_work_dump.json")]
    checkpoint: PathBuf,
    /// Only these ZIA rows (comma separated).
    #[arg(long, value_delimiter = ',')]
    rows: Option<Vec<usize>>,
    /// Only these choice slots (comma separated).
    #[arg(long, value_delimiter = ',')]
    slots: Option<Vec<usize>>,
    /// Probe cells an earlier run gave up on.
    #[arg(long)]
    retry_exhausted: bool,
    /// Do not draw the progress table.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = load_profile(&cli)?;

    match cli.command {
        Cmd::Info => cmd_info(&cli.cable, &profile)?,
        Cmd::Erase => cmd_erase(&cli.cable, &profile)?,
        Cmd::Program { ref crbit } => cmd_program(&cli.cable, &profile, crbit)?,
        Cmd::Discover(ref args) => cmd_discover(&cli.cable, profile, args)?,
        Cmd::Table { ref checkpoint, rust } => cmd_table(&profile, checkpoint, rust)?,
    }

    Ok(())
}

fn load_profile(cli: &Cli) -> Result<DeviceProfile> {
    match &cli.profile_file {
        Some(path) => DeviceProfile::from_json_file(path)
            .with_context(|| format!("loading profile {}", path.display())),
        None => Ok(DeviceProfile::by_name(&cli.profile)?),
    }
}

type BoxedCpld = Cpld<Box<dyn Cable>, StdDelay>;

/// Open the cable and check that the expected part is on the other end
fn open_cpld(cable_name: &str, profile: &DeviceProfile) -> Result<BoxedCpld> {
    let cable = cable::new_from_string(cable_name, profile)
        .with_context(|| format!("opening cable {cable_name}"))?;
    let jtag = JtagSM::new(cable)?;
    let mut cpld = Cpld::new(jtag, StdDelay, profile);
    cpld.verify_idcode(profile.idcode, profile.idcode_mask)
        .with_context(|| format!("checking for {}", profile.name))?;
    Ok(cpld)
}

fn cmd_info(cable_name: &str, profile: &DeviceProfile) -> Result<()> {
    let mut cpld = open_cpld(cable_name, profile)?;
    let idcode = cpld.idcode()?;
    let usercode = cpld.usercode()?;
    println!("Device   : {}", profile.name);
    println!("IDCODE   : {idcode:#010x} (version {})", idcode >> 28);
    println!("USERCODE : {usercode:#010x}");
    Ok(())
}

fn cmd_erase(cable_name: &str, profile: &DeviceProfile) -> Result<()> {
    let mut cpld = open_cpld(cable_name, profile)?;
    cpld.erase()?;
    println!("erased");
    Ok(())
}

fn cmd_program(cable_name: &str, profile: &DeviceProfile, crbit: &Path) -> Result<()> {
    let text = std::fs::read_to_string(crbit)
        .with_context(|| format!("reading {}", crbit.display()))?;
    let image =
        ConfigurationImage::from_crbit_checked(&text, profile.image_rows, profile.image_width)
            .with_context(|| format!("parsing {}", crbit.display()))?;

    let mut cpld = open_cpld(cable_name, profile)?;
    cpld.erase()?;
    cpld.program(&image)?;
    println!("programmed {} rows", image.row_count());
    Ok(())
}

fn cmd_discover(cable_name: &str, profile: DeviceProfile, args: &DiscoverArgs) -> Result<()> {
    let base = FuseMapTemplate::from_file(&args.base)
        .with_context(|| format!("loading template {}", args.base.display()))?;
    let alt = match &args.alt {
        Some(path) => Some(
            FuseMapTemplate::from_file(path)
                .with_context(|| format!("loading template {}", path.display()))?,
        ),
        None => None,
    };
    let compiler = ExternalCompiler::new(&args.compiler, &args.work_dir);
    let mut synth = Synthesizer::new(base, alt, Box::new(compiler));

    let mut policy = DiscoveryPolicy::for_profile(&profile);
    policy.retry_exhausted = args.retry_exhausted;

    let mut store = JsonFileStore::new(&args.checkpoint);
    let mcs = profile.macrocells_per_block;
    let mut session = DiscoverySession::resume(profile, policy, &mut store)
        .with_context(|| format!("resuming from {}", args.checkpoint.display()))?;
    let cells = session.cells(args.rows.as_deref(), args.slots.as_deref())?;

    let mut cpld = open_cpld(cable_name, session.profile())?;
    let mut progress: Box<dyn ProgressSink> = if args.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(TerminalProgress::new(io::stdout(), mcs))
    };

    let summary = Engine::new(&mut cpld, &mut synth, &mut store, progress.as_mut())
        .run(&mut session, &cells)?;
    info!("run finished");

    println!(
        "{} resolved, {} exhausted, {} skipped",
        summary.resolved.len(),
        summary.exhausted.len(),
        summary.skipped
    );
    for cell in &session.checkpoint().exhausted {
        println!("needs review: {cell}");
    }
    Ok(())
}

fn cmd_table(profile: &DeviceProfile, path: &Path, rust: bool) -> Result<()> {
    let Some(checkpoint) = JsonFileStore::new(path).load()? else {
        bail!("no checkpoint at {}", path.display());
    };
    if rust {
        print!("{}", render::rust_table(&checkpoint.map));
    } else {
        print!("{}", render::table(&checkpoint.map, profile.macrocells_per_block, None));
        for cell in &checkpoint.exhausted {
            println!("needs review: {cell}");
        }
    }
    Ok(())
}
