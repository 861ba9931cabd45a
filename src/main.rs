use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::bail;
use clap::Parser;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use automata::render::Headless;
use automata::render::TerminalRenderer;
use automata::rle::SeedPattern;
use automata::rule_set::RuleSet;
use automata::rules::Boundary;
use automata::rules::Engine;
use automata::rules::EngineKind;
use automata::sequencer::Consumer;
use automata::sequencer::FrameSequencer;
use automata::sequencer::SequencerConfig;

/// Run a 2D cellular automaton from an RLE seed.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Seed pattern, an `.rle` file
    path: PathBuf,

    /// Generations to simulate
    #[arg(short, long, default_value_t = 100)]
    ticks: u64,

    /// Grid width, defaults to the width declared by the seed
    #[arg(long)]
    width: Option<usize>,

    /// Grid height, defaults to the height declared by the seed
    #[arg(long)]
    height: Option<usize>,

    /// Rule such as `B3/S23`, defaults to the rule declared by the seed
    #[arg(short, long)]
    rule: Option<RuleSet>,

    /// Rule implementation: `table` or `count`
    #[arg(long, default_value = "table")]
    engine: EngineKind,

    /// What lies past the edges: `dead` or `torus`
    #[arg(long, default_value = "dead")]
    boundary: Boundary,

    /// Pause between generations, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log frames instead of drawing them
    #[arg(long)]
    headless: bool,

    /// Number of readers in headless mode
    #[arg(long, default_value_t = 1)]
    readers: usize,

    /// Maximum frames drawn per second
    #[arg(long, default_value_t = 60)]
    fps: u32,
}

fn validate_path(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("Seed file {} does not exist", path.display());
    }

    let is_rle = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("rle"));

    if !is_rle {
        bail!("Seed file {} is not an .rle file", path.display());
    }

    Ok(())
}

/// The rule given on the command line, else the one declared by the seed, else Life.
fn pick_rule(args: &Args, seed: &SeedPattern) -> RuleSet {
    if let Some(rule) = args.rule {
        return rule;
    }

    match seed.rule.as_deref().map(str::parse::<RuleSet>) {
        Some(Ok(rule)) => rule,
        Some(Err(e)) => {
            warn!("Ignoring the seed's rule: {e}");
            RuleSet::default()
        }
        None => RuleSet::default(),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs would be drawn over by the renderer
    let default_level = if args.headless { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    validate_path(&args.path)?;

    let bytes = fs::read(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let seed = SeedPattern::parse(&bytes)
        .with_context(|| format!("Failed to parse {}", args.path.display()))?;

    let set = pick_rule(&args, &seed);
    let engine = Engine::new(args.engine, set, args.boundary);

    let width = args.width.unwrap_or(seed.width());
    let height = args.height.unwrap_or(seed.height());

    info!(
        name = seed.name.as_deref().unwrap_or("<unnamed>"),
        width,
        height,
        rule = %set,
        boundary = %args.boundary,
        engine = ?args.engine,
        "Loaded seed"
    );

    let mut sequencer = FrameSequencer::from_seed(&seed, width, height)
        .context("Failed to allocate the initial grid")?;

    let config = SequencerConfig {
        ticks: args.ticks,
        tick_interval: args.interval_ms.map(Duration::from_millis),
    };

    let report = if args.headless {
        let mut readers: Vec<Headless> = (0..args.readers.max(1))
            .map(|i| Headless::new(format!("reader-{i}"), args.ticks))
            .collect();
        let mut consumers: Vec<&mut dyn Consumer> = readers
            .iter_mut()
            .map(|r| r as &mut dyn Consumer)
            .collect();

        sequencer.run(&engine, &config, &mut consumers)?
    } else {
        let mut renderer =
            TerminalRenderer::new(args.ticks, args.fps).context("Failed to set up terminal")?;

        sequencer.run(&engine, &config, &mut [&mut renderer])?
    };

    info!(
        generation = report.generation,
        readers = ?report.readers,
        "Done"
    );

    Ok(())
}
