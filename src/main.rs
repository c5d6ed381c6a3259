use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fpga_sched::config::{ModelEndpoints, RuntimeOpts};
use fpga_sched::error::{self, RuntimeError};
use fpga_sched::hal::SyntheticAccelerator;
use fpga_sched::monitor::probe::SyntheticProbe;
use fpga_sched::runtime;

/// Workload manager for slot-based reconfigurable accelerators.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Number of workloads to run, or `info` to print the configuration.
    #[arg(value_name = "NUM_WORKLOADS")]
    target: String,

    /// Connect to a model service (train and predict endpoints on their
    /// default ports) instead of running standalone.
    #[arg(long)]
    model: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut opts = RuntimeOpts::default();
    if cli.model {
        opts.model = Some(ModelEndpoints::default());
    }

    if cli.target == "info" {
        print!("{opts}");
        return ExitCode::SUCCESS;
    }

    let num_workloads: usize = match cli.target.parse() {
        Ok(n) if n > 0 => n,
        _ => {
            eprintln!("expected a positive workload count or `info`, got `{}`", cli.target);
            return ExitCode::FAILURE;
        }
    };

    let hal = Arc::new(SyntheticAccelerator::default());
    let probe = Box::new(SyntheticProbe::default());
    if let Err(e) = runtime::run(opts, num_workloads, hal, probe) {
        // A rejected workload input failed before anything was admitted;
        // the runtime has already torn down cleanly on the way out, so
        // it gets a plain failure exit. Every other kind is fatal.
        return match e {
            RuntimeError::Admission { .. } => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
            e => error::fatal(&e),
        };
    }
    ExitCode::SUCCESS
}
