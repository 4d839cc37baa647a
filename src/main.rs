use chips::input::KeyboardInput;
use chips::interpreter::ExecState;
use chips::network::NetworkAddress;
use chips::view::{self, TermView};
use chips::{layouts, session, Puzzle};
use clap::Parser;
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Tiny networked VMs to puzzle over
#[derive(Parser, Debug)]
#[command(name = "chips", version, about, long_about = None)]
struct Cli {
    /// device layout to load
    #[arg(short, long, default_value = "fill", value_parser = clap::builder::PossibleValuesParser::new(layouts::NAMES))]
    layout: String,

    /// memory image loaded into the VM at 0/0, replacing the layout's program
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// milliseconds per tick while running
    #[arg(short, long, default_value_t = 100)]
    tick_ms: u64,

    /// run without the terminal view and print every device's memory
    #[arg(long)]
    headless: bool,

    /// how many ticks a headless run gets
    #[arg(long, default_value_t = 1000)]
    ticks: u64,

    /// write logs here; headless runs log to stderr without it
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chips=info"));
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| -> Box<dyn Error> { e })?;
        }
        // stdout belongs to the terminal view otherwise
        None if cli.headless => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init()
                .map_err(|e| -> Box<dyn Error> { e })?;
        }
        None => {}
    }
    Ok(())
}

fn headless(puzzle: &mut Puzzle, ticks: u64) {
    puzzle.run();
    for _ in 0..ticks {
        puzzle.tick();
        if puzzle.state() != ExecState::Running {
            break;
        }
    }
    for device in puzzle.devices() {
        println!("{}", view::device_title(device));
        print!("{}", view::hex_dump(device.memory().as_slice()));
        if !device.error_message().is_empty() {
            println!("error: {}", device.error_message());
        }
        println!();
    }
    println!(
        "{} after {} ticks: {}",
        puzzle.name(),
        puzzle.ticks(),
        if puzzle.is_solved() { "solved" } else { "not solved" }
    );
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // initialise
    let mut puzzle = match layouts::build(&cli.layout) {
        Some(puzzle) => puzzle?,
        None => return Err(format!("unknown layout {}", cli.layout).into()),
    };

    // load a program
    if let Some(path) = &cli.program {
        let vm = puzzle
            .resolve(NetworkAddress::new(0, 0))
            .and_then(|id| puzzle.device_mut(id))
            .ok_or("layout has no VM at 0/0")?;
        let mut f = File::open(path)?;
        vm.load_program(&mut f)?;
    }

    if cli.headless {
        headless(&mut puzzle, cli.ticks);
        return Ok(());
    }

    let mut input = KeyboardInput::new()?;
    let mut view = TermView::new()?;
    session::run(
        &mut puzzle,
        &mut view,
        &mut input,
        Duration::from_millis(cli.tick_ms),
        None,
    )?;
    Ok(())
}
