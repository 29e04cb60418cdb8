use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Placeholder substituted with the configured scripts directory.
pub const SCRIPTS_PLACEHOLDER: &str = "{scripts}";

#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub summary: String,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub enum Action {
    Leaf { description: String, command: String },
    Composite { steps: Vec<String> },
}

impl Task {
    pub fn leaf(name: &str, summary: &str, description: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            summary: summary.to_string(),
            action: Action::Leaf {
                description: description.to_string(),
                command: command.to_string(),
            },
        }
    }

    pub fn composite(name: &str, summary: &str, steps: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            summary: summary.to_string(),
            action: Action::Composite {
                steps: steps.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("task '{0}' is defined more than once")]
    DuplicateTask(String),
    #[error("task '{task}' references undefined task '{missing}'")]
    DanglingReference { task: String, missing: String },
    #[error("composite task '{0}' has no steps")]
    EmptyComposite(String),
    #[error("task '{0}' has an empty command")]
    EmptyCommand(String),
    #[error("composite tasks form a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Ordered, immutable table of known tasks.
#[derive(Debug, Clone)]
pub struct Registry {
    tasks: Vec<Task>,
}

impl Registry {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Task::leaf(
                "build",
                "Build the library",
                "Building af_packet library",
                "{scripts}/build.sh",
            ),
            Task::leaf(
                "test",
                "Run all tests",
                "Running test suite",
                "{scripts}/test.sh",
            ),
            Task::leaf(
                "bench",
                "Run performance benchmarks",
                "Running performance benchmarks",
                "{scripts}/bench.sh",
            ),
            Task::leaf(
                "clean",
                "Clean build artifacts",
                "Cleaning build artifacts",
                "{scripts}/clean.sh",
            ),
            Task::leaf(
                "docs",
                "Generate documentation",
                "Generating documentation",
                "{scripts}/docs.sh",
            ),
            Task::leaf(
                "lint",
                "Run code quality checks",
                "Running code quality checks",
                "{scripts}/lint.sh",
            ),
            Task::leaf(
                "security",
                "Run security audit",
                "Running security audit",
                "{scripts}/security.sh",
            ),
            Task::leaf(
                "container-build",
                "Build in container environment",
                "Building in container",
                "{scripts}/container-build.sh",
            ),
            Task::leaf(
                "integration-test",
                "Run SDK integration tests",
                "Running SDK integration tests",
                "{scripts}/integration-test.sh",
            ),
            Task::composite(
                "dev",
                "Development superset (build, test, lint)",
                &["build", "test", "lint"],
            ),
            Task::leaf(
                "prod",
                "Production build with optimizations",
                "Production build",
                "{scripts}/prod-build.sh",
            ),
            Task::leaf(
                "setup",
                "Setup development environment",
                "Setting up development environment",
                "{scripts}/setup.sh",
            ),
            Task::leaf(
                "metrics",
                "Collect and display performance metrics",
                "Collecting performance metrics",
                "{scripts}/metrics.sh",
            ),
        ])
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = BTreeSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(RegistryError::DuplicateTask(task.name.clone()));
            }
        }

        for task in &self.tasks {
            match &task.action {
                Action::Leaf { command, .. } if command.trim().is_empty() => {
                    return Err(RegistryError::EmptyCommand(task.name.clone()));
                }
                Action::Leaf { .. } => {}
                Action::Composite { steps } => {
                    if steps.is_empty() {
                        return Err(RegistryError::EmptyComposite(task.name.clone()));
                    }
                    if let Some(missing) = steps.iter().find(|step| self.get(step).is_none()) {
                        return Err(RegistryError::DanglingReference {
                            task: task.name.clone(),
                            missing: missing.clone(),
                        });
                    }
                }
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), RegistryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            registry: &'a Registry,
            name: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<(), RegistryError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(name.to_string());
                    return Err(RegistryError::Cycle(cycle));
                }
                None => {}
            }

            marks.insert(name, Mark::Visiting);
            path.push(name);
            if let Some(Task {
                action: Action::Composite { steps },
                ..
            }) = registry.get(name)
            {
                for step in steps {
                    visit(registry, step, marks, path)?;
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        for task in &self.tasks {
            visit(self, &task.name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}
