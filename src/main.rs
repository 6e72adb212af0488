use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use espresso::config::DEFAULT_MAX_CALL_DEPTH;
use espresso::{ExecutionConfig, NoTrace, TraceHook, TraceWriter, Vm, VmError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "espresso")]
#[command(about = "Run the main method of a Java class file")]
struct Cli {
    /// Path to a compiled .class file
    class: PathBuf,

    /// Print every executed instruction to stdout
    #[arg(long)]
    trace: bool,

    /// Abort after executing this many instructions
    #[arg(long)]
    instruction_limit: Option<u64>,

    /// Maximum number of nested frames
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Wall-clock budget in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

impl Cli {
    fn config(&self) -> ExecutionConfig {
        ExecutionConfig {
            instruction_limit: self.instruction_limit,
            max_call_depth: self.max_call_depth,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

fn run<H: TraceHook>(cli: &Cli, hook: H) -> Result<i32, VmError> {
    let mut vm = Vm::with_hook(hook).with_config(cli.config());
    vm.execute(&cli.class)
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "espresso=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Running {}", cli.class.display());

    let result = if cli.trace {
        run(&cli, TraceWriter::stdout())
    } else {
        run(&cli, NoTrace)
    };
    match result {
        Ok(value) => println!("{value}"),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
