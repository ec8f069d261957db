use std::fs::{File};
use std::path::{PathBuf};
use std::sync::{Mutex};

use clap::{Parser};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter};

use c8jit::{Settings, System};
use c8jit::host::{Host, HeadlessHost, TerminalHost};
use c8jit::translate::{Options};

#[derive(Parser)]
#[command(name = "c8jit")]
#[command(version)]
#[command(about = "Runs a CHIP-8 program by translating it", long_about = None)]
struct Args {
    /// The program to run
    rom: PathBuf,

    /// Replace the built-in font with the contents of this file
    #[arg(long)]
    font: Option<PathBuf>,

    /// Run without a screen or keyboard
    #[arg(long)]
    headless: bool,

    /// Random seed for the headless host
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Keys (hex digits) that the headless host presses, in order
    #[arg(long, default_value = "")]
    keys: String,

    /// Write a Graphviz file for every compiled unit into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Report every register write through the host
    #[arg(long)]
    debug_bytes: bool,

    /// Write the log here. The terminal host always logs to a file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter, in `RUST_LOG` syntax
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            rom: self.rom.clone(),
            font: self.font.clone(),
            options: Options {debug_bytes: self.debug_bytes, dump_dir: self.dump_dir.clone()},
        }
    }

    /** The terminal host owns stdout, so its log goes to a file. */
    fn log_file(&self) -> Option<PathBuf> {
        match (&self.log_file, self.headless) {
            (Some(path), _) => Some(path.clone()),
            (None, false) => Some(PathBuf::from("c8jit.log")),
            (None, true) => None,
        }
    }
}

fn init_logging(args: &Args) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match args.log_file() {
        Some(path) => builder.with_ansi(false).with_writer(Mutex::new(File::create(path)?)).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run(args: &Args) -> c8jit::Result<()> {
    let mut system = System::from_settings(&args.settings())?;
    let mut host: Box<dyn Host> = if args.headless {
        let mut host = HeadlessHost::new(args.seed);
        for c in args.keys.chars() {
            if let Some(key) = c.to_digit(16) { host.queue_key_press(key as u8); }
        }
        Box::new(host)
    } else {
        Box::new(TerminalHost::new())
    };
    let result = system.run(host.as_mut());
    drop(host);
    let statistics = system.translator().statistics();
    info!(?statistics, registers = ?system.registers(), "finished");
    result
}

fn main() -> Result<(), c8jit::Error> {
    let args = Args::parse();
    init_logging(&args)?;
    if let Err(e) = run(&args) {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}
