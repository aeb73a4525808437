//! CLI entry point for the iteration supervisor.

use clap::Parser;

use supervisor::exit_codes;
use supervisor::io::work_items::TasksCliStore;
use supervisor::io::worker::ClaudeWorker;
use supervisor::looping::{LoopOptions, LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "supervisor",
    version,
    about = "Autonomous iteration supervisor for unattended agent work loops"
)]
struct Cli {
    /// Initialize the project: persist the goal document and have the first
    /// session generate the initial work items.
    #[arg(long, value_name = "TEXT", conflicts_with = "request")]
    init: Option<String>,

    /// Inject a one-time request into the first session of an existing
    /// project.
    #[arg(long, value_name = "TEXT")]
    request: Option<String>,

    /// Maximum worker sessions before stopping with a resumable exit.
    #[arg(long, value_name = "N", default_value_t = 50)]
    max_iterations: u32,

    /// Model name passed through to the worker.
    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// Run the worker under the sandbox enforcement wrapper (the default).
    #[arg(long, overrides_with = "no_sandbox")]
    sandbox: bool,

    /// Run the worker without sandbox enforcement.
    #[arg(long, overrides_with = "sandbox")]
    no_sandbox: bool,
}

fn main() {
    supervisor::logging::init();
    let cli = Cli::parse();

    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: cannot resolve working directory: {err}");
            std::process::exit(exit_codes::FATAL);
        }
    };

    let options = LoopOptions {
        max_iterations: cli.max_iterations,
        sandbox_enabled: !cli.no_sandbox,
        model: cli.model,
        init: cli.init,
        request: cli.request,
    };

    let worker = ClaudeWorker;
    let store = TasksCliStore::new(&root);

    match run_loop(&root, &worker, &store, &options) {
        Ok(outcome) => match outcome.stop {
            LoopStop::Complete => {
                eprintln!(
                    "all work complete after {} session(s); logs under .supervisor/sessions/",
                    outcome.sessions_run
                );
                std::process::exit(exit_codes::OK);
            }
            LoopStop::BudgetExhausted {
                iterations,
                remaining,
            } => {
                eprintln!(
                    "iteration budget exhausted after {iterations} session(s) with {remaining} \
                     item(s) remaining; rerun to resume (logs under .supervisor/sessions/)"
                );
                std::process::exit(exit_codes::BUDGET_EXHAUSTED);
            }
        },
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_codes::FATAL);
        }
    }
}
