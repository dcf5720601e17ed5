use std::path::PathBuf;
use std::process::ExitCode;

use battery_rul::assessment::{self, HealthBand};
use battery_rul::client::{ClientError, PredictionClient};
use battery_rul::config::{
    self, env_non_empty, ClientArgs, ClientConfig, ServeArgs, ServerConfig,
};
use battery_rul::file_utils::ArtifactPaths;
use battery_rul::validator::UserInput;
use battery_rul::{preview_features, start_server};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Battery Remaining Useful Life prediction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the model artifacts and serve predictions over HTTP
    Serve(ServeArgs),
    /// Ask a running server for a prediction
    Predict {
        #[command(flatten)]
        client: ClientArgs,
        #[command(flatten)]
        measurements: Measurements,
    },
    /// Check whether a running server has its model loaded
    Health(ClientArgs),
    /// Print the feature vector the model would receive
    Features {
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
        #[command(flatten)]
        measurements: Measurements,
    },
}

#[derive(Debug, Args)]
struct Measurements {
    /// Battery temperature in °C
    #[arg(long, allow_hyphen_values = true)]
    temperature: f64,
    /// Voltage in V
    #[arg(long)]
    voltage: f64,
    /// Current in A
    #[arg(long)]
    current: f64,
    /// Charging cycles completed
    #[arg(long)]
    cycles: f64,
    /// State of charge in percent
    #[arg(long)]
    soc: f64,
}

impl Measurements {
    fn to_input(&self) -> Result<UserInput, String> {
        UserInput::new(
            self.temperature,
            self.voltage,
            self.current,
            self.cycles,
            self.soc,
        )
        .map_err(|e| e.to_string())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(env_non_empty("RUST_LOG")))
        .init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` directives when set and valid, otherwise `info`.
fn log_filter(directives: Option<String>) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(LevelFilter::INFO.into());
    match directives {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
        None => fallback(),
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Serve(args) => {
            let config = ServerConfig::resolve(args, env_non_empty).map_err(|e| e.to_string())?;
            let server = start_server(&config).map_err(|e| e.to_string())?;
            server.run();
            Ok(())
        }
        Command::Predict {
            client,
            measurements,
        } => {
            let input = measurements.to_input()?;
            let client = PredictionClient::new(ClientConfig::resolve(client, env_non_empty))
                .map_err(|e| e.to_string())?;
            let report = client
                .predict_when_ready(&input)
                .map_err(|e| e.to_string())?;

            let health = report.battery_health_percentage;
            println!("Predicted RUL: {:.2} cycles", report.predicted_rul);
            println!("Battery health: {}", HealthBand::from_percentage(health));
            println!("{}", assessment::health_bar(health, 40));
            let hints = assessment::recommendations(&input, health);
            if hints.is_empty() {
                println!("All parameters are within optimal ranges!");
            }
            for hint in hints {
                println!("- {hint}");
            }
            Ok(())
        }
        Command::Health(args) => {
            let client = PredictionClient::new(ClientConfig::resolve(args, env_non_empty))
                .map_err(|e| e.to_string())?;
            let report = client.health().map_err(|e| e.to_string())?;
            println!(
                "status: {}, model loaded: {}, scaler loaded: {}",
                report.status, report.model_loaded, report.scaler_loaded
            );
            if report.ready() {
                Ok(())
            } else {
                Err(ClientError::NotReady.to_string())
            }
        }
        Command::Features {
            artifact_dir,
            measurements,
        } => {
            let input = measurements.to_input()?;
            let dir =
                config::artifact_dir(artifact_dir, env_non_empty).map_err(|e| e.to_string())?;
            let (catalog, vector) = preview_features(&ArtifactPaths::in_dir(&dir), &input)
                .map_err(|e| e.to_string())?;
            for (name, value) in catalog.names().iter().zip(vector.values()) {
                println!("{name}: {value}");
            }
            Ok(())
        }
    }
}
