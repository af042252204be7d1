use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::{command, Parser};
use rand::{rng, rngs::SmallRng, Rng, SeedableRng};
use ssasdpd::{Model, ParseState, Rdme, SearchMode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// See also `clap_cargo::style::CLAP_STYLING`
pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

#[derive(Debug, Parser)]
#[command(
    name = "ssasdpd",
    about = "Stochastic reaction-diffusion on SPH particles.",
    long_about = "A program simulating chemical reactions and diffusion on a set of particles with the Next Subvolume Method.
Every particle is a voxel, and molecules diffuse between particles closer than the support radius.
The program takes in as input several model files, in the format:

species A B
set h = 1.0
particle 0: 0.0 0.0 0.0
particle 0: 0.5 0.0 0.0
A = 10 @ 0
A -> B, 0.5
diffusion A: 0 -> 0, 1.0

The system above has two particles 0.5 apart, and ten molecules of A on the first one.
A turns into B at a rate of 0.5, and A diffuses between the particles.",
    styles = CLAP_STYLING,
)]
struct Cli {
    /// The amount of time to simulate.
    time: f64,

    /// The paths to the model files.
    #[arg(num_args = 1..)]
    data: Vec<PathBuf>,

    /// The number of macro steps. The state is printed after every step.
    #[arg(short, long, default_value_t = 1)]
    steps: u64,

    /// How to size the result buffers of the neighbor search.
    #[arg(long, value_enum, default_value_t)]
    search_mode: SearchMode,

    /// Whether to count the number of reactions and diffusion events.
    #[arg(long)]
    count_events: bool,

    /// Whether to count the cpu time.
    #[arg(long)]
    cpu_time: bool,

    /// The seed to use for random number generation.
    #[arg(long)]
    seed: Option<u64>,

    /// Increases the log verbosity. Overridden by `RUST_LOG`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cli(args: Cli) -> ssasdpd::Result<()> {
    let rng = &mut if let Some(seed) = args.seed {
        SmallRng::seed_from_u64(seed)
    } else {
        SmallRng::seed_from_u64(rng().random())
    };

    let mut parse_state = ParseState::default();
    for path in &args.data {
        parse_state.parse_data_file(path)?;
    }
    let Model { mut system, config } = parse_state.get_model()?;
    system.params.search_mode = args.search_mode;

    let start_time = Instant::now();
    let steps = args.steps.max(1);
    let mut rdme = Rdme::initialize(&mut system, config, rng)?;

    let mut samples = vec![(rdme.species_totals(&system), 0, 0, 0.)];
    for _ in 0..steps {
        rdme.advance(&mut system, args.time / steps as f64, rng)?;
        samples.push((
            rdme.species_totals(&system),
            rdme.total_reactions(),
            rdme.total_diffusion(),
            start_time.elapsed().as_secs_f32(),
        ));
    }

    // Printing the sampled states to stdout, to be redirected as desired.
    print!("time");
    for name in rdme.network().species_names() {
        print!("\t{name}");
    }
    if args.count_events {
        print!("\treaction_count\tdiffusion_count");
    }
    if args.cpu_time {
        print!("\tcpu_time");
    }
    println!();
    for (idx, (state, reactions, diffusions, cpu_time)) in samples.into_iter().enumerate() {
        print!("{}", idx as f64 / steps as f64 * args.time);
        for count in state {
            print!("\t{count}");
        }
        if args.count_events {
            print!("\t{reactions}\t{diffusions}");
        }
        if args.cpu_time {
            print!("\t{cpu_time:.3}")
        }
        println!();
    }

    let totals = rdme.destroy();
    info!(
        time = totals.time,
        reactions = totals.total_reactions,
        diffusions = totals.total_diffusion,
        "finished simulation"
    );
    Ok(())
}

pub fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);
    match run_cli(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
