use crate::context::{Account, Target};
use crate::error::ProvisionError;
use crate::exec::{lookup_account, Cmd};
use crate::sequencer::{Session, StepOutcome};
use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

/// Choose the account the rest of the run configures: the invoking one, an
/// existing one, or a newly created one.
pub fn run(s: &Session) -> Result<StepOutcome> {
    let invoker = &s.ctx.invoker;
    let keep = s.prompt.confirm(
        "account.keep_current",
        !s.ctx.is_root,
        &format!("Continue as the current user '{}'?", invoker.name),
    )?;
    if keep {
        s.ctx.select_target(Target {
            account: invoker.clone(),
            created: false,
        })?;
        info!("Target account: {}", invoker.name);
        return Ok(StepOutcome::Done);
    }

    let target = if s.prompt.confirm("account.create", true, "Create a new user account?")? {
        create(s)?
    } else {
        Target {
            account: existing(s)?,
            created: false,
        }
    };
    info!(
        "Target account: {} ({})",
        target.account.name,
        if target.created { "created" } else { "existing" }
    );
    s.ctx.select_target(target)?;
    Ok(StepOutcome::Done)
}

fn existing(s: &Session) -> Result<Account> {
    loop {
        let name = s.prompt.ask("account.name", "Existing account to configure")?;
        if let Some(account) = lookup_account(s.exec, &name)? {
            return Ok(account);
        }
        if !s.prompt.interactive() {
            return Err(ProvisionError::UnknownAccount(name).into());
        }
        println!("No account named '{name}'.");
    }
}

fn create(s: &Session) -> Result<Target> {
    let name = ask_username(s)?;

    // A previous run may already have created it.
    if let Some(account) = lookup_account(s.exec, &name)? {
        info!("Account {name} already exists; using it");
        return Ok(Target {
            account,
            created: false,
        });
    }

    let mut useradd = Cmd::new("useradd").args(["-m", "-s", "/bin/bash"]);
    let question = format!("Grant '{name}' administrator (sudo) rights?");
    if s.prompt.confirm("account.admin", true, &question)? {
        useradd = useradd.args(["-G", s.package_manager()?.admin_group()]);
    }
    s.exec.run(&useradd.arg(name.as_str()))?.check()?;
    info!("Created account {name}");

    set_password(s, &name)?;

    let account = lookup_account(s.exec, &name)?
        .with_context(|| format!("Account {name} missing after useradd"))?;
    Ok(Target {
        account,
        created: true,
    })
}

fn ask_username(s: &Session) -> Result<String> {
    let valid = Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$")?;
    loop {
        let name = s.prompt.ask("account.name", "Username for the new account")?;
        if valid.is_match(&name) {
            return Ok(name);
        }
        let reason = if name.is_empty() {
            "username must not be empty".to_string()
        } else {
            format!("'{name}' is not a valid username (lowercase letters, digits, '_' and '-')")
        };
        if !s.prompt.interactive() {
            return Err(ProvisionError::InvalidInput {
                key: "account.name".to_string(),
                reason,
            }
            .into());
        }
        println!("{reason}");
    }
}

/// Ask until two identical, non-empty entries arrive, then set the password
/// once through `chpasswd` (stdin, never the command line).
fn set_password(s: &Session, name: &str) -> Result<()> {
    let password = loop {
        let first = s.prompt.ask_secret("account.password", &format!("Password for {name}"))?;
        let second = s.prompt.ask_secret("account.password_confirm", "Repeat password")?;

        let problem = if first.is_empty() {
            "password must not be empty"
        } else if first != second {
            "passwords do not match"
        } else {
            break first;
        };
        if !s.prompt.interactive() {
            return Err(ProvisionError::InvalidInput {
                key: "account.password".to_string(),
                reason: problem.to_string(),
            }
            .into());
        }
        warn!("{problem}, try again");
    };

    s.exec
        .run(&Cmd::new("chpasswd").stdin(format!("{name}:{password}\n")))?
        .check()
        .context("Failed to set password")?;
    info!("Password set for {name}");
    Ok(())
}
