use std::{
    error::Error,
    io::{self, Write},
    process,
    sync::{Arc, mpsc},
    time::Duration,
};

use clap::Parser;
use log::info;
use rover_link::{
    Command, ConflictPolicy, EngineConfig, EngineError, Interrupt, Query, Rover, Status, prompt,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Rover (or simulator) host
    #[arg(long, env = "ROVER_HOST", default_value = rover_link::config::DEFAULT_HOST)]
    host: String,
    /// Rover port
    #[arg(long, env = "ROVER_PORT", default_value_t = rover_link::config::DEFAULT_PORT)]
    port: u16,
    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, env = "ROVER_RECONNECT_MS", default_value_t = 5000)]
    reconnect_ms: u64,
    /// How long to wait for a command to complete, in seconds
    #[arg(long, env = "ROVER_COMMAND_TIMEOUT", default_value_t = 60)]
    command_timeout: u64,
    /// How long to wait for a reporter value, in seconds
    #[arg(long, env = "ROVER_QUERY_TIMEOUT", default_value_t = 10)]
    query_timeout: u64,
    /// What to do with a request that conflicts with a pending one: reject, queue or supersede
    #[arg(
        long,
        env = "ROVER_CONFLICT_POLICY",
        default_value = "reject",
        value_parser = parse_policy
    )]
    conflict_policy: ConflictPolicy,
    /// Do not reset the rover when the link opens
    #[arg(long)]
    no_reset: bool,
}

fn parse_policy(s: &str) -> Result<ConflictPolicy, String> {
    ConflictPolicy::try_from(s)
}

impl From<Cli> for EngineConfig {
    fn from(cli: Cli) -> Self {
        EngineConfig {
            host: cli.host,
            port: cli.port,
            reconnect_interval: Duration::from_millis(cli.reconnect_ms),
            command_timeout: Duration::from_secs(cli.command_timeout),
            query_timeout: Duration::from_secs(cli.query_timeout),
            conflict_policy: cli.conflict_policy,
            reset_on_connect: !cli.no_reset,
        }
    }
}

/// Submit through `op` and block until its continuation fires.
fn wait<R, F>(op: F) -> Result<R, EngineError>
where
    R: Send + 'static,
    F: FnOnce(Box<dyn FnOnce(Result<R, EngineError>) + Send>),
{
    let (tx, rx) = mpsc::channel();
    op(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.recv().map_err(|_| EngineError::Shutdown)?
}

fn run(rover: &Rover, cmd: Command) -> Result<String, EngineError> {
    let done = |_: ()| "done".to_string();

    match cmd {
        Command::Forward(d) => wait(|cb| rover.move_forward(d, cb)).map(done),
        Command::Backward(d) => wait(|cb| rover.move_backward(d, cb)).map(done),
        Command::Left(a) => wait(|cb| rover.turn_left(a, cb)).map(done),
        Command::Right(a) => wait(|cb| rover.turn_right(a, cb)).map(done),
        Command::Detect => wait(|cb| rover.detect_artifact(cb)).map(done),
        Command::Query(Query::Position(axis)) => wait(|cb| rover.query_position(axis, cb)),
        Command::Query(Query::ArtifactId) => wait(|cb| rover.query_artifact_id(cb)),
        Command::Query(Query::ArtifactPosition(axis)) => {
            wait(|cb| rover.query_artifact_position(axis, cb))
        }
        Command::Query(Query::ObstaclePosition { id, axis }) => {
            wait(|cb| rover.query_obstacle_position(id, axis, cb))
        }
        Command::Query(Query::UltrasonicRange) => wait(|cb| rover.query_ultrasonic_range(cb)),
        Command::Reset => rover.reset_all().map(done),
        Command::Connect => {
            rover.reconnect();
            Ok("connecting".to_string())
        }
        Command::Status => Ok(match rover.get_status() {
            Status::Ready => "ready".to_string(),
            Status::NotConnected => "not connected".to_string(),
        }),
        Command::Exit => Ok(String::new()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config: EngineConfig = cli.into();
    info!("driving rover at {}:{}", config.host, config.port);

    let rover = Arc::new(Rover::connect(config)?);

    // A Ctrl-C while the prompt is reading only takes effect once the line is
    // entered; a second Ctrl-C exits straight away.
    let interrupt = Arc::new(Interrupt::new(&rover));
    {
        let interrupt = Arc::clone(&interrupt);
        ctrlc::set_handler(move || {
            if interrupt.hit() {
                process::exit(130);
            }
        })?;
    }

    let mut stdout = io::stdout();
    loop {
        if interrupt.interrupted() {
            break;
        }

        let cmd = match prompt(io::stdin().lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if cmd == Command::Exit {
            break;
        }

        match run(&rover, cmd) {
            Ok(out) => writeln!(stdout, "{out}")?,
            Err(e) => eprintln!("rover error: {e}"),
        }
    }

    if let Ok(rover) = Arc::try_unwrap(rover) {
        rover.shutdown();
    }
    Ok(())
}
