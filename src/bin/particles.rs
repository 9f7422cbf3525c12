//! Headless runner: drives the simulation from a recorded or synthetic
//! tracking feed on a separate thread and logs what the frame loop does.

use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use hand_particles::{
    CameraSnapshot, GestureRouter, HandObservation, Simulation, SimulationConfig,
    feed::{ConfidenceGate, SyntheticHands, read_frames},
};

#[derive(Parser)]
#[command(name = "particles", about = "Run the hand-driven particle simulation without a window")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the particle count
    #[arg(short = 'n', long)]
    particles: Option<usize>,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    /// Frame rate of the simulation loop; 0 runs unpaced
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Rate of tracking updates
    #[arg(long, default_value_t = 30.0)]
    tracking_hz: f64,

    /// JSON-lines tracking recording ("-" for stdin); synthetic hands if omitted
    #[arg(long)]
    feed: Option<String>,

    /// Seed of the synthetic hands
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }))
    .init();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(count) = cli.particles {
        config.particle_count = count;
    }

    let (mut simulation, router) = Simulation::with_router(config)?;
    let camera = CameraSnapshot::default_view(16.0 / 9.0).ok_or("default camera is singular")?;

    let frames: Box<dyn Iterator<Item = Vec<HandObservation>> + Send> = match cli.feed.as_deref() {
        None => {
            log::info!("Using synthetic hands (seed {})", cli.seed);
            Box::new(SyntheticHands::new(cli.seed))
        }
        Some("-") => Box::new(read_frames(BufReader::new(io::stdin()))),
        Some(path) => {
            log::info!("Replaying tracking frames from {path}");
            Box::new(read_frames(BufReader::new(File::open(path)?)))
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let tracker = spawn_tracker(
        router,
        ConfidenceGate::new(simulation.config().tracker),
        frames,
        camera,
        period(cli.tracking_hz),
        Arc::clone(&running),
    );

    let frame_period = period(cli.fps);
    let mut stats = Stats::default();
    let started = Instant::now();

    for _ in 0..cli.frames {
        let frame_start = Instant::now();
        let report = simulation.step();
        stats.record(&report);

        if report.frame % 60 == 0 {
            stats.log(&simulation);
            stats = Stats::default();
        }

        if let Some(period) = frame_period {
            if let Some(remaining) = period.checked_sub(frame_start.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    // A tracker blocked on stdin would never return.
    if cli.feed.as_deref() != Some("-") && tracker.join().is_err() {
        log::error!("Tracking thread panicked");
    }

    log::info!(
        "Simulated {} frames of {} particles in {:.2?}",
        simulation.frame(),
        simulation.particles().len(),
        started.elapsed()
    );
    Ok(())
}

fn period(hz: f64) -> Option<Duration> {
    (hz > 0.0).then(|| Duration::from_secs_f64(1.0 / hz))
}

/// Tracking domain: feeds observations to the router at the tracker's own
/// pace, independent of the frame loop.
fn spawn_tracker(
    mut router: GestureRouter,
    mut gate: ConfidenceGate,
    frames: Box<dyn Iterator<Item = Vec<HandObservation>> + Send>,
    camera: CameraSnapshot,
    period: Option<Duration>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for observations in frames {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            router.on_tracking_update(&gate.filter(observations), &camera);
            if let Some(period) = period {
                thread::sleep(period);
            }
        }
        log::info!("Tracking feed ended");
        router.on_tracking_update(&[], &camera);
    })
}

#[derive(Default)]
struct Stats {
    frames: u32,
    attract_frames: u32,
    repels: u32,
    update_time: Duration,
}

impl Stats {
    fn record(&mut self, report: &hand_particles::FrameReport) {
        self.frames += 1;
        self.attract_frames += u32::from(report.attract_dispatched);
        self.repels += u32::from(report.repel_dispatched);
        self.update_time += report.update_time;
    }

    fn log(&self, simulation: &Simulation) {
        let particles = simulation.particles();
        let mean_height = particles.positions().map(|p| p.y as f64).sum::<f64>() / particles.len() as f64;
        log::info!(
            "frame {}: update {:.3}ms avg, attract {}/{} frames, {} repel(s), mean height {:.4}",
            simulation.frame(),
            self.update_time.as_secs_f64() * 1000.0 / f64::from(self.frames.max(1)),
            self.attract_frames,
            self.frames,
            self.repels,
            mean_height
        );
    }
}
