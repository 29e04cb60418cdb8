use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, ExitStatus};

use tracing::{debug, info, warn};

use crate::planner::TaskPlan;

/// Runs one shell command to completion and reports its exit code.
///
/// The command inherits the parent's stdio and environment. Implementations
/// must block until the command finishes.
pub trait CommandRunner {
    fn run(&mut self, command: &str, cwd: &Path) -> io::Result<i32>;
}

/// Runs commands through the host shell.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str, cwd: &Path) -> io::Result<i32> {
        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        };

        debug!(shell, command, cwd = %cwd.display(), "spawning command");
        let status = Command::new(shell)
            .arg(flag)
            .arg(command)
            .current_dir(cwd)
            .status()?;

        Ok(exit_code(status))
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            warn!(signal, "command terminated by signal");
            return 128 + signal;
        }
    }

    1
}

#[derive(Debug)]
pub struct ExecutionSummary {
    pub task: String,
    pub completed_steps: usize,
    pub total_steps: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Command failed with exit code {code}")]
    StepFailed {
        index: usize,
        task: String,
        command: String,
        code: i32,
    },
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write progress output: {0}")]
    Output(#[from] io::Error),
}

impl ExecutionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionError::StepFailed { code, .. } => *code,
            ExecutionError::Spawn { .. } | ExecutionError::Output(_) => 1,
        }
    }
}

/// Run every step of `plan` in order, stopping at the first non-zero exit.
pub fn execute_plan<R, W>(
    plan: &TaskPlan,
    cwd: &Path,
    runner: &mut R,
    out: &mut W,
) -> Result<ExecutionSummary, ExecutionError>
where
    R: CommandRunner + ?Sized,
    W: Write + ?Sized,
{
    let total = plan.steps.len();
    info!(task = %plan.task, steps = total, "executing task");

    for (idx, step) in plan.steps.iter().enumerate() {
        writeln!(out, "==> {}", step.description)?;
        writeln!(out, "Running: {}", step.command)?;
        out.flush()?;

        let code = runner
            .run(&step.command, cwd)
            .map_err(|source| ExecutionError::Spawn {
                command: step.command.clone(),
                source,
            })?;
        debug!(task = %step.task, code, "command finished");

        if code != 0 {
            return Err(ExecutionError::StepFailed {
                index: idx,
                task: step.task.clone(),
                command: step.command.clone(),
                code,
            });
        }
    }

    Ok(ExecutionSummary {
        task: plan.task.clone(),
        completed_steps: total,
        total_steps: total,
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;

    use super::stub::RecordingRunner;
    use super::{CommandRunner, ExecutionError, ShellRunner, execute_plan};
    use crate::planner::plan_task;
    use crate::registry::Registry;

    struct BrokenShell;

    impl CommandRunner for BrokenShell {
        fn run(&mut self, _command: &str, _cwd: &Path) -> io::Result<i32> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no shell"))
        }
    }

    fn dev_plan() -> crate::planner::TaskPlan {
        plan_task(&Registry::builtin(), "dev", Path::new("scripts")).unwrap()
    }

    #[test]
    fn prints_progress_before_each_step() {
        let mut runner = RecordingRunner::new();
        let mut out = Vec::new();
        let summary = execute_plan(&dev_plan(), Path::new("."), &mut runner, &mut out).unwrap();
        assert_eq!(summary.completed_steps, 3);
        assert_eq!(summary.total_steps, 3);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "==> Building af_packet library\nRunning: ./scripts/build.sh\n\
             ==> Running test suite\nRunning: ./scripts/test.sh\n\
             ==> Running code quality checks\nRunning: ./scripts/lint.sh\n"
        );
    }

    #[test]
    fn stops_at_first_failure() {
        let mut runner = RecordingRunner::new().fail_on("test.sh", 4);
        let mut out = Vec::new();
        let err = execute_plan(&dev_plan(), Path::new("."), &mut runner, &mut out)
            .expect_err("test step fails");

        assert!(matches!(
            err,
            ExecutionError::StepFailed { index: 1, ref task, code: 4, .. } if task == "test"
        ));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(
            runner.commands(),
            vec!["./scripts/build.sh", "./scripts/test.sh"]
        );
    }

    #[test]
    fn commands_run_in_the_given_directory() {
        let mut runner = RecordingRunner::new();
        let plan = plan_task(&Registry::builtin(), "docs", Path::new("scripts")).unwrap();
        execute_plan(&plan, Path::new("/work"), &mut runner, &mut io::sink()).unwrap();
        assert_eq!(runner.calls[0].1, Path::new("/work"));
    }

    #[test]
    fn spawn_failure_maps_to_exit_code_one() {
        let plan = plan_task(&Registry::builtin(), "build", Path::new("scripts")).unwrap();
        let err = execute_plan(&plan, Path::new("."), &mut BrokenShell, &mut io::sink())
            .expect_err("shell is missing");
        assert!(matches!(err, ExecutionError::Spawn { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn shell_runner_reports_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ShellRunner;
        assert_eq!(runner.run("true", dir.path()).unwrap(), 0);
        assert_eq!(runner.run("exit 7", dir.path()).unwrap(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn shell_runner_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let mut runner = ShellRunner;
        assert_eq!(runner.run("test -f marker", dir.path()).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn signal_termination_maps_to_128_plus_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ShellRunner;
        assert_eq!(runner.run("kill -9 $$", dir.path()).unwrap(), 137);
    }
}
