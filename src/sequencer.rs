use crate::context::RunContext;
use crate::error::ProvisionError;
use crate::exec::Executor;
use crate::package::PackageManager;
use crate::prompt::Prompter;
use crate::template::TemplateEngine;
use anyhow::{Context, Result};
use serde::Serialize;
use std::cell::{Cell, OnceCell};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Everything a step may touch during one run.
pub struct Session<'a> {
    pub ctx: &'a RunContext,
    pub exec: &'a dyn Executor,
    pub prompt: &'a dyn Prompter,
    pub templates: &'a TemplateEngine,
    packages: OnceCell<PackageManager>,
    refreshed: Cell<bool>,
}

impl<'a> Session<'a> {
    pub fn new(
        ctx: &'a RunContext,
        exec: &'a dyn Executor,
        prompt: &'a dyn Prompter,
        templates: &'a TemplateEngine,
    ) -> Self {
        Self {
            ctx,
            exec,
            prompt,
            templates,
            packages: OnceCell::new(),
            refreshed: Cell::new(false),
        }
    }

    /// Detected on first use and remembered for the rest of the run.
    pub fn package_manager(&self) -> Result<PackageManager> {
        if let Some(pm) = self.packages.get() {
            return Ok(*pm);
        }
        let pm = PackageManager::detect(self.exec)?;
        info!("Using package manager: {pm:?}");
        Ok(*self.packages.get_or_init(|| pm))
    }

    /// Refresh the package catalog at most once per run.
    pub fn refresh_packages(&self) -> Result<()> {
        if self.refreshed.get() {
            return Ok(());
        }
        if let Some(cmd) = self.package_manager()?.refresh_command() {
            info!("Refreshing package catalog...");
            self.exec.run(&cmd)?.check()?;
        }
        self.refreshed.set(true);
        Ok(())
    }
}

/// How a step that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Nothing to do, or the operator declined.
    Skipped(String),
    /// Completed, but something guarded went wrong along the way.
    Warned(String),
}

pub type Guard = fn(&Session) -> Result<bool>;
pub type Action = fn(&Session) -> Result<StepOutcome>;

/// One named unit of the workflow.
pub struct Step {
    pub name: &'static str,
    /// Returns true when the goal state already holds and `action` can be skipped.
    pub satisfied: Guard,
    pub action: Action,
    /// A failing fatal step stops the run; a non-fatal one only warns.
    pub fatal: bool,
}

/// Guard for steps that always run (their mutations carry their own checks).
pub fn never(_: &Session) -> Result<bool> {
    Ok(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Done,
    Skipped,
    Warned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: &'static str,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What happened to each step, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<&'static str>,
}

impl RunReport {
    fn record(&mut self, step: &'static str, status: Status, detail: Option<String>) {
        self.steps.push(StepRecord { step, status, detail });
    }

    #[cfg(test)]
    pub fn status_of(&self, step: &str) -> Option<Status> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.status)
    }

    /// `server-init.log` -> `server-init.log.report.json`
    pub fn path_for(log_path: &Path) -> PathBuf {
        let mut name = log_path.as_os_str().to_owned();
        name.push(".report.json");
        PathBuf::from(name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content + "\n")
            .with_context(|| format!("Failed to write run report {}", path.display()))
    }

    /// Save the report, then hand back the run's own outcome. A report that
    /// cannot be written never hides which step failed.
    pub fn settle(
        &self,
        path: &Path,
        outcome: Result<(), ProvisionError>,
    ) -> Result<(), ProvisionError> {
        match self.save(path) {
            Ok(()) => info!("Run report written to {}", path.display()),
            Err(e) => warn!("Could not write run report: {e:#}"),
        }
        outcome
    }
}

/// Runs a fixed, ordered list of steps and stops at the first fatal failure.
pub struct Sequencer {
    steps: Vec<Step>,
}

impl Sequencer {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn run(&self, session: &Session, report: &mut RunReport) -> Result<(), ProvisionError> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, total, step.name);

            let result = (step.satisfied)(session).and_then(|satisfied| {
                if satisfied {
                    Ok(StepOutcome::Skipped("already satisfied".to_string()))
                } else {
                    (step.action)(session)
                }
            });

            match result {
                Ok(StepOutcome::Done) => {
                    info!("{}: done", step.name);
                    report.record(step.name, Status::Done, None);
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    info!("{}: skipped ({reason})", step.name);
                    report.record(step.name, Status::Skipped, Some(reason));
                }
                Ok(StepOutcome::Warned(reason)) => {
                    warn!("{}: finished with warnings: {reason}", step.name);
                    report.record(step.name, Status::Warned, Some(reason));
                }
                Err(err) if !step.fatal => {
                    warn!("{}: failed, continuing: {err:#}", step.name);
                    report.record(step.name, Status::Failed, Some(format!("{err:#}")));
                }
                Err(err) => {
                    error!("{}: failed: {err:#}", step.name);
                    report.record(step.name, Status::Failed, Some(format!("{err:#}")));
                    report.failed_step = Some(step.name);
                    return Err(ProvisionError::StepFailed {
                        step: step.name,
                        source: err.into(),
                    });
                }
            }
        }
        Ok(())
    }
}
