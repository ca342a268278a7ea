//! termcore - replay a captured PTY stream through the terminal core
//!
//! Reads raw PTY output from a file or stdin, interprets it, and prints the
//! final screen.
//!
//! # Quick Start
//!
//! ```text
//! termcore session.log            # Replay a capture
//! script -q out.log; termcore out.log
//! cat out.log | termcore --plain  # Text only
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use termcore::config::{ColorDepth, Config};
use termcore::core::session::{Session, SessionEvent, SessionOptions};
use termcore::core::stream::PerformanceMode;
use termcore::ui::{ColorCache, DebugRenderer, Renderer};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options
#[derive(Default)]
struct Args {
    file: Option<PathBuf>,
    mode: Option<PerformanceMode>,
    cols: Option<u16>,
    rows: Option<u16>,
    plain: bool,
    ansi256: bool,
}

fn print_version() {
    eprintln!("termcore {}", VERSION);
}

fn print_help() {
    eprintln!("termcore {} - terminal emulation core", VERSION);
    eprintln!();
    eprintln!("Usage: termcore [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Replays raw PTY output from FILE (or stdin) and prints the final screen.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -m, --mode <MODE>     Stream mode: latency, throughput, balanced");
    eprintln!("      --cols <N>        Terminal width");
    eprintln!("      --rows <N>        Terminal height");
    eprintln!("      --plain           Print text without colors");
    eprintln!("      --ansi256         Map colors to the 256-color palette");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.termcore/config.toml");
    eprintln!();
    eprintln!("Color schemes: default, solarized-dark, solarized-light,");
    eprintln!("               monokai, nord, dracula, gruvbox-dark, tokyo-night");
}

fn parse_size(flag: &str, value: Option<&String>) -> Result<u16, String> {
    let value = value.ok_or_else(|| format!("Missing value for {}", flag))?;
    match value.parse::<u16>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Invalid value for {}: {}", flag, value)),
    }
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-m" | "--mode" => {
                i += 1;
                let name = args.get(i).ok_or("Missing mode argument")?;
                let mode = PerformanceMode::from_name(name)
                    .ok_or_else(|| format!("Unknown mode: {}", name))?;
                parsed.mode = Some(mode);
            }
            "--cols" => {
                i += 1;
                parsed.cols = Some(parse_size("--cols", args.get(i))?);
            }
            "--rows" => {
                i += 1;
                parsed.rows = Some(parse_size("--rows", args.get(i))?);
            }
            "--plain" => parsed.plain = true,
            "--ansi256" => parsed.ansi256 = true,
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            path => {
                if parsed.file.is_some() {
                    return Err("Only one input file is accepted".to_string());
                }
                if path != "-" {
                    parsed.file = Some(PathBuf::from(path));
                }
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_logging(config: &Config) {
    let log_path = Config::log_path().unwrap_or_else(|| PathBuf::from("termcore.log"));
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = Config::load();
    init_logging(&config);
    info!("termcore {} starting", VERSION);

    if let Some(mode) = args.mode {
        config.performance_mode = mode;
    }
    if let Some(cols) = args.cols {
        config.terminal.cols = cols;
    }
    if let Some(rows) = args.rows {
        config.terminal.rows = rows;
    }
    if args.ansi256 {
        config.color_depth = ColorDepth::Ansi256;
    }

    let input: Box<dyn Read + Send> = match &args.file {
        Some(path) => {
            if !path.is_file() {
                bail!("{} is not a file", path.display());
            }
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(io::stdin()),
    };

    let mut session = Session::spawn(1, input, io::sink(), SessionOptions::from(&config))
        .context("failed to start session")?;
    session.wait();

    let renders = session
        .events()
        .try_iter()
        .filter(|event| *event == SessionEvent::Output)
        .count();
    info!("replay finished after {} render requests", renders);

    let cache = ColorCache::new(config.color_depth);
    let palette = cache.apply_palette(config.palette());
    let renderer = Renderer::new(cache, palette).plain(args.plain);

    let state = session.state();
    let state = state.lock();
    renderer
        .render(&mut io::stdout().lock(), &state)
        .context("failed to write screen")?;
    eprint!("{}", DebugRenderer::render(&state));
    eprintln!("Render requests: {}", renders);

    Ok(())
}
