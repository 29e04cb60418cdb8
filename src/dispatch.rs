use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::executor::{CommandRunner, ExecutionError, ExecutionSummary, execute_plan};
use crate::planner::{PlanError, TaskPlan, plan_task};
use crate::registry::Registry;

/// Where tasks run and where their scripts live.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Working directory for every command.
    pub root: PathBuf,
    /// Scripts directory, resolved against `root` when relative.
    pub scripts_dir: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            scripts_dir: PathBuf::from("scripts"),
        }
    }
}

impl DispatchConfig {
    pub fn scripts_path(&self) -> PathBuf {
        self.root.join(&self.scripts_dir)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no task given")]
    Usage,
    #[error("{}/ directory not found", .path.display())]
    MissingEnvironment { path: PathBuf },
    #[error("Unknown task '{name}'")]
    UnknownTask { name: String },
    #[error(transparent)]
    Plan(PlanError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl From<PlanError> for DispatchError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::UnknownTask(name) => DispatchError::UnknownTask { name },
            other => DispatchError::Plan(other),
        }
    }
}

impl DispatchError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Execution(err) => err.exit_code(),
            DispatchError::Usage
            | DispatchError::MissingEnvironment { .. }
            | DispatchError::UnknownTask { .. }
            | DispatchError::Plan(_) => 1,
        }
    }
}

pub struct Dispatcher {
    registry: Registry,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Registry, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Check the environment and resolve `task` without running anything.
    pub fn plan(&self, task: Option<&str>) -> Result<TaskPlan, DispatchError> {
        let task = task.ok_or(DispatchError::Usage)?;

        let scripts = self.config.scripts_path();
        if !scripts.is_dir() {
            debug!(path = %scripts.display(), "scripts directory missing");
            return Err(DispatchError::MissingEnvironment {
                path: self.config.scripts_dir.clone(),
            });
        }

        Ok(plan_task(&self.registry, task, &self.config.scripts_dir)?)
    }

    /// Resolve `task` and run its commands in order, failing fast.
    pub fn dispatch<R, W>(
        &self,
        task: Option<&str>,
        runner: &mut R,
        out: &mut W,
    ) -> Result<ExecutionSummary, DispatchError>
    where
        R: CommandRunner + ?Sized,
        W: Write + ?Sized,
    {
        let plan = self.plan(task)?;
        Ok(execute_plan(&plan, self.root(), runner, out)?)
    }

    fn root(&self) -> &Path {
        &self.config.root
    }
}
