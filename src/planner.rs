use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::registry::{Action, Registry, SCRIPTS_PLACEHOLDER};

#[derive(Debug, Serialize)]
pub struct TaskPlan {
    pub task: String,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedStep {
    pub task: String,
    pub description: String,
    pub command: String,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("task '{0}' includes itself through its steps")]
    Cycle(String),
}

/// Flatten `name` into the ordered list of leaf invocations it runs.
pub fn plan_task(
    registry: &Registry,
    name: &str,
    scripts_dir: &Path,
) -> Result<TaskPlan, PlanError> {
    let scripts = scripts_display(scripts_dir);
    let mut steps = Vec::new();
    let mut stack = Vec::new();
    collect_steps(registry, name, &scripts, &mut stack, &mut steps)?;

    Ok(TaskPlan {
        task: name.to_string(),
        steps,
    })
}

fn collect_steps(
    registry: &Registry,
    name: &str,
    scripts: &str,
    stack: &mut Vec<String>,
    steps: &mut Vec<PlannedStep>,
) -> Result<(), PlanError> {
    let task = registry
        .get(name)
        .ok_or_else(|| PlanError::UnknownTask(name.to_string()))?;

    if stack.iter().any(|entry| entry == name) {
        return Err(PlanError::Cycle(name.to_string()));
    }

    match &task.action {
        Action::Leaf {
            description,
            command,
        } => steps.push(PlannedStep {
            task: task.name.clone(),
            description: description.clone(),
            command: command.replace(SCRIPTS_PLACEHOLDER, scripts),
        }),
        Action::Composite { steps: names } => {
            stack.push(task.name.clone());
            for sub in names {
                collect_steps(registry, sub, scripts, stack, steps)?;
            }
            stack.pop();
        }
    }

    Ok(())
}

/// Relative directories are rendered with a leading `./` so the shell runs
/// the script by path instead of searching `PATH`.
fn scripts_display(scripts_dir: &Path) -> String {
    let raw = scripts_dir.display().to_string();
    let raw = raw.trim_end_matches(['/', '\\']);
    if scripts_dir.is_absolute() || scripts_dir.starts_with(".") || scripts_dir.starts_with("..")
    {
        raw.to_string()
    } else {
        format!("./{raw}")
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{PlanError, plan_task, scripts_display};
    use crate::registry::{Registry, Task};

    #[test]
    fn leaf_task_renders_script_path() {
        let plan = plan_task(&Registry::builtin(), "build", Path::new("scripts"))
            .expect("build should plan");
        assert_eq!(plan.task, "build");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].command, "./scripts/build.sh");
        assert_eq!(plan.steps[0].description, "Building af_packet library");
    }

    #[test]
    fn dev_flattens_to_build_test_lint() {
        let plan =
            plan_task(&Registry::builtin(), "dev", Path::new("scripts")).expect("dev should plan");
        let commands: Vec<&str> = plan.steps.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(
            commands,
            vec![
                "./scripts/build.sh",
                "./scripts/test.sh",
                "./scripts/lint.sh"
            ]
        );
        let tasks: Vec<&str> = plan.steps.iter().map(|s| s.task.as_str()).collect();
        assert_eq!(tasks, vec!["build", "test", "lint"]);
    }

    #[test]
    fn unknown_task_is_rejected() {
        let err = plan_task(&Registry::builtin(), "deploy", Path::new("scripts"))
            .expect_err("deploy is not a task");
        assert!(matches!(err, PlanError::UnknownTask(name) if name == "deploy"));
    }

    #[test]
    fn cycles_are_reported_instead_of_recursing() {
        let registry = Registry::new(vec![
            Task::composite("a", "a", &["b"]),
            Task::composite("b", "b", &["a"]),
        ]);
        let err = plan_task(&registry, "a", Path::new("scripts")).expect_err("cycle");
        assert!(matches!(err, PlanError::Cycle(name) if name == "a"));
    }

    #[test]
    fn scripts_directory_rendering() {
        assert_eq!(scripts_display(Path::new("scripts")), "./scripts");
        assert_eq!(scripts_display(Path::new("scripts/")), "./scripts");
        assert_eq!(scripts_display(Path::new("./tools")), "./tools");
        assert_eq!(scripts_display(Path::new("../shared/scripts")), "../shared/scripts");
        #[cfg(unix)]
        assert_eq!(scripts_display(Path::new("/opt/scripts")), "/opt/scripts");
    }
}
