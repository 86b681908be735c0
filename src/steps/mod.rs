mod account;
mod environment;
mod git;
mod hostname;
mod runtime;
mod shell;
mod theme;

use crate::preflight;
use crate::sequencer::{never, Step};

/// The provisioning workflow, in order.
pub fn plan() -> Vec<Step> {
    vec![
        Step {
            name: "detect platform",
            satisfied: never,
            action: preflight::run,
            fatal: true,
        },
        Step {
            name: "hostname",
            satisfied: never,
            action: hostname::run,
            fatal: true,
        },
        Step {
            name: "target account",
            satisfied: never,
            action: account::run,
            fatal: true,
        },
        Step {
            name: "account environment",
            satisfied: never,
            action: environment::run,
            fatal: true,
        },
        Step {
            name: "shell and plugins",
            satisfied: never,
            action: shell::run,
            fatal: true,
        },
        Step {
            name: "language runtime",
            satisfied: runtime::satisfied,
            action: runtime::run,
            fatal: true,
        },
        Step {
            name: "prompt theme",
            satisfied: never,
            action: theme::run,
            fatal: false,
        },
        Step {
            name: "git identity",
            satisfied: never,
            action: git::run,
            fatal: true,
        },
    ]
}
