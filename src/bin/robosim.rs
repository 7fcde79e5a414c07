use clap::Parser;
use robosim::engine::physics::{EngineSettings, RapierEngine};
use robosim::engine::rendering::{ChannelRenderer, LogSink, NullRenderer, Renderer};
use robosim::model::ArtifactCache;
use robosim::server;
use robosim::sim::{DelayRange, PacingLoop, SimWorld, Simulation, StepMode};
use robosim::{ServerConfig, SimConfig};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "robosim")]
#[command(about = "Serves a physics simulated robot over HTTP")]
struct Args {
    /// Model to load from the artifact directory
    model_name: String,

    #[arg(long, default_value = robosim::DEFAULT_HOST)]
    host: String,

    #[arg(long, default_value_t = robosim::DEFAULT_PORT)]
    port: u16,

    /// Physics timestep in seconds
    #[arg(long, default_value_t = 0.001)]
    dt: f64,

    #[arg(long)]
    no_gravity: bool,

    #[arg(long)]
    no_render: bool,

    /// Hold the floating base in place
    #[arg(long)]
    suspended: bool,

    /// Minimum actuator command delay in seconds
    #[arg(long, default_value_t = 0.0)]
    command_delay_min: f64,

    /// Maximum actuator command delay in seconds
    #[arg(long, default_value_t = 0.0)]
    command_delay_max: f64,

    #[arg(long)]
    delay_seed: Option<u64>,

    /// Pause between pacing loop iterations, in seconds
    #[arg(long, default_value_t = 0.0001)]
    sleep_time: f64,

    #[arg(long, value_enum, default_value_t = StepMode::Continuous)]
    step_mode: StepMode,

    /// Defaults to $ROBOSIM_ARTIFACTS, then ./artifacts
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig, Box<dyn Error>> {
        let sleep_time = Duration::try_from_secs_f64(self.sleep_time)?;

        Ok(SimConfig::builder()
            .dt(self.dt)
            .gravity(!self.no_gravity)
            .render(!self.no_render)
            .suspended(self.suspended)
            .command_delay(DelayRange::new(
                self.command_delay_min,
                self.command_delay_max,
            ))
            .maybe_delay_seed(self.delay_seed)
            .sleep_time(sleep_time)
            .step_mode(self.step_mode)
            .build())
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .host(self.host.clone())
            .port(self.port)
            .build()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = run(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = args.sim_config()?;
    let server_config = args.server_config();
    info!("Model: {}", args.model_name);
    info!("Config: {config:?}");
    info!("Server: {}", server_config.address());

    let cache = match &args.artifacts_dir {
        Some(dir) => ArtifactCache::new(dir),
        None => ArtifactCache::from_env(),
    };
    debug!("Artifacts: {}", cache.model_dir(&args.model_name).display());
    let metadata = cache.load_metadata(&args.model_name)?;
    let description = cache.load_description(&args.model_name)?;

    let settings = EngineSettings::builder()
        .dt(config.dt)
        .gravity(config.gravity)
        .build();
    let engine = RapierEngine::new(&description, settings)?;
    let world = SimWorld::new(Box::new(engine), &metadata, &config)?;
    let sim = Simulation::new(world, config.step_mode);

    let renderer: Box<dyn Renderer> = if config.render {
        Box::new(ChannelRenderer::spawn(LogSink::default())?)
    } else {
        Box::new(NullRenderer)
    };

    let listener = TcpListener::bind(server_config.address()).await?;

    let ctrl_c_sim = sim.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            ctrl_c_sim.shutdown().await;
        }
    });

    let pacing = PacingLoop::new(sim.clone(), renderer, config.sleep_time).await;
    let (served, ()) = tokio::join!(server::serve(listener, sim), pacing.run());
    served?;

    info!("Goodbye");
    Ok(())
}
