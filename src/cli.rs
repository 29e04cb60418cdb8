use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::dispatch::{DispatchConfig, DispatchError, Dispatcher};
use crate::executor::ShellRunner;
use crate::registry::Registry;

const PROGRAM: &str = "pf";

#[derive(Debug, Parser)]
#[command(
    name = "pf",
    version,
    about = "Run project tasks backed by scripts in ./scripts"
)]
pub struct Cli {
    /// Task to run, followed by extra parameters that are accepted but not
    /// forwarded. Options after the task name belong to the parameters.
    #[arg(
        value_name = "TASK",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
    /// Directory holding the task scripts, relative to the working directory
    #[arg(long, value_name = "DIR", default_value = "scripts")]
    scripts_dir: PathBuf,
    /// Run as if started in DIR
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    directory: PathBuf,
    /// List available tasks and exit
    #[arg(long)]
    list: bool,
    /// Print the resolved plan as JSON instead of running it
    #[arg(long)]
    plan: bool,
    /// Emit compact JSON for --plan
    #[arg(long, requires = "plan")]
    raw: bool,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn task(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    fn params(&self) -> &[String] {
        self.args.get(1..).unwrap_or(&[])
    }

    fn config(&self) -> DispatchConfig {
        DispatchConfig {
            root: self.directory.clone(),
            scripts_dir: self.scripts_dir.clone(),
        }
    }
}

/// Parse the process arguments, run the requested task and return the exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { 1 } else { 0 };
        }
    };

    init_logging(cli.verbose);
    let stdout = io::stdout();
    run_with(&cli, &mut stdout.lock())
}

fn run_with<W: Write>(cli: &Cli, out: &mut W) -> i32 {
    let registry = Registry::builtin();
    if let Err(err) = registry
        .validate()
        .context("validating built-in task registry")
    {
        let _ = writeln!(out, "ERROR: {err:#}");
        return 1;
    }

    if cli.list {
        let _ = write!(out, "{}", task_table(&registry));
        return 0;
    }

    if !cli.params().is_empty() {
        debug!(params = ?cli.params(), "ignoring extra parameters");
    }

    let dispatcher = Dispatcher::new(registry, cli.config());
    let task = cli.task();

    if cli.plan {
        return match dispatcher.plan(task) {
            Ok(plan) => match print_plan(out, &plan, cli.raw) {
                Ok(()) => 0,
                Err(err) => {
                    let _ = writeln!(out, "ERROR: {err:#}");
                    1
                }
            },
            Err(err) => report(out, dispatcher.registry(), &err),
        };
    }

    match dispatcher.dispatch(task, &mut ShellRunner, out) {
        Ok(summary) => {
            debug!(
                task = %summary.task,
                completed = summary.completed_steps,
                total = summary.total_steps,
                "task succeeded"
            );
            0
        }
        Err(err) => report(out, dispatcher.registry(), &err),
    }
}

fn report<W: Write>(out: &mut W, registry: &Registry, err: &DispatchError) -> i32 {
    match err {
        DispatchError::Usage => {
            let _ = write!(out, "{}", usage(registry));
        }
        DispatchError::UnknownTask { .. } => {
            let _ = writeln!(out, "ERROR: {err}");
            let _ = writeln!(
                out,
                "Run '{PROGRAM}' without arguments to see available tasks"
            );
        }
        _ => {
            let _ = writeln!(out, "ERROR: {err}");
        }
    }
    err.exit_code()
}

fn print_plan<W: Write>(
    out: &mut W,
    plan: &crate::planner::TaskPlan,
    raw: bool,
) -> anyhow::Result<()> {
    let rendered = if raw {
        serde_json::to_string(plan)?
    } else {
        serde_json::to_string_pretty(plan)?
    };
    writeln!(out, "{rendered}").context("writing plan")?;
    Ok(())
}

fn usage(registry: &Registry) -> String {
    format!(
        "Usage: {PROGRAM} <task> [params...]\n\n{}",
        task_table(registry)
    )
}

fn task_table(registry: &Registry) -> String {
    let width = registry
        .tasks()
        .iter()
        .map(|task| task.name.len())
        .max()
        .unwrap_or(0);

    let mut table = String::from("Available tasks:\n");
    for task in registry.tasks() {
        table.push_str(&format!(
            "  {:<width$} - {}\n",
            task.name,
            task.summary,
            width = width
        ));
    }
    table
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
