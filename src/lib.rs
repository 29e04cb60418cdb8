pub mod cli;
pub mod dispatch;
pub mod executor;
pub mod planner;
pub mod registry;

/// Run the command line interface and return an exit code.
pub fn run_cli() -> i32 {
    cli::run()
}
