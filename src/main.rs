mod color;
mod config;
mod context;
mod error;
mod exec;
mod guard;
mod logging;
mod package;
mod preflight;
mod prompt;
mod sequencer;
mod steps;
mod system;
mod template;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Answers;
use context::RunContext;
use exec::SystemExecutor;
use prompt::{Prompter, Terminal};
use sequencer::{RunReport, Sequencer, Session};
use std::path::PathBuf;
use std::process::exit;
use template::TemplateEngine;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "server-init")]
#[command(about = "Provision a fresh Linux server, one confirmed step at a time.", version)]
struct Cli {
    /// Answer prompts from a TOML file instead of the terminal
    #[arg(long, value_name = "FILE")]
    answers: Option<String>,

    /// Run log, appended to on every run
    #[arg(long, value_name = "FILE", default_value = "server-init.log")]
    log_file: String,

    /// Root for /etc paths the workflow edits
    #[arg(long, value_name = "DIR", default_value = "/", hide = true)]
    sysroot: String,

    /// More terminal output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the 256-color palette used by the prompt theme step
    Palette,

    /// List the workflow steps in order
    Plan,
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Palette) => {
            print!("{}", color::palette_table());
            exit(0);
        }
        Some(Commands::Plan) => {
            for (i, step) in steps::plan().iter().enumerate() {
                let kind = if step.fatal { "" } else { " (non-fatal)" };
                println!("{:>2}. {}{kind}", i + 1, step.name);
            }
            exit(0);
        }
        None => {}
    }

    let log_path = expand(&cli.log_file);
    if let Err(e) = logging::setup_logger(cli.verbose, &log_path) {
        eprintln!("[server-init] {e:#}");
        exit(1);
    }

    if let Err(e) = run(&cli, log_path) {
        error!("{e:#}");
        exit(1);
    }
    exit(0)
}

fn run(cli: &Cli, log_path: PathBuf) -> Result<()> {
    let answers = cli.answers.as_deref().map(|p| Answers::load(&expand(p))).transpose()?;
    let terminal = Terminal;
    let prompt: &dyn Prompter = match &answers {
        Some(answers) => answers,
        None => &terminal,
    };

    let ctx = RunContext::detect(expand(&cli.sysroot), log_path)?;
    let exec = SystemExecutor::detect(&ctx.invoker, ctx.is_root);
    let templates = TemplateEngine::embedded()?;
    let session = Session::new(&ctx, &exec, prompt, &templates);

    info!("Logging to {}", ctx.log_path.display());
    let sequencer = Sequencer::new(steps::plan());
    let mut report = RunReport::default();
    let outcome = sequencer.run(&session, &mut report);

    let report_path = RunReport::path_for(&ctx.log_path);
    report.settle(&report_path, outcome)?;
    info!("All steps finished");
    Ok(())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
