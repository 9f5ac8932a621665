//! `clicra`: describe a task, get a shell command back from a local model.
//!
//! The generated command (or script) is shown and, after confirmation or with
//! `--run`, executed. Failed runs are sent back to the model for a diagnosis.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;

use clicra::core::extract::FencedBlockParser;
use clicra::core::types::{AbortReason, ArtifactKind, Outcome, PromptStrategy};
use clicra::exit_codes;
use clicra::io::config::{ClicraConfig, config_path, load_config};
use clicra::io::confirm::TerminalConfirm;
use clicra::io::executor::ShellExecutor;
use clicra::io::model::OllamaClient;
use clicra::io::process::{CancelToken, Echo};
use clicra::io::prompt::{Platform, PromptComposer};
use clicra::logging;
use clicra::session::{Console, Session, SessionOptions};

#[derive(Parser, Debug)]
#[command(
    name = "clicra",
    version,
    about = "Generate shell commands with a local model, run them, and explain failures"
)]
struct Cli {
    /// What you want done, in plain words.
    #[arg(required = true, num_args = 1.., value_name = "TASK")]
    task: Vec<String>,

    /// Run the generated command without asking; failures are analyzed.
    #[arg(short, long, conflicts_with_all = ["script", "prompt"])]
    run: bool,

    /// Generate a multi-line script instead of a single command.
    #[arg(short, long, conflicts_with = "prompt")]
    script: bool,

    /// Reason with a prompting strategy and print the answer; nothing is run.
    #[arg(short, long, value_enum, value_name = "STRATEGY")]
    prompt: Option<StrategyArg>,

    /// Command whose output is given to the model as context.
    #[arg(short = 'f', long, value_name = "CMD")]
    refer: Option<String>,

    /// Model name (overrides config).
    #[arg(short, long, value_name = "NAME")]
    model: Option<String>,

    /// Character limit for reference output and analyzed output (overrides config).
    #[arg(short = 'M', long, value_name = "N")]
    max_chars: Option<usize>,

    /// Config file (default: $CLICRA_CONFIG, then the user config directory).
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print composed prompts and debug logs.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Step by step.
    Sbs,
    /// Tree of thought.
    Tot,
}

impl From<StrategyArg> for PromptStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sbs => PromptStrategy::StepByStep,
            StrategyArg::Tot => PromptStrategy::TreeOfThought,
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            err.print().context("print usage")?;
            return Ok(code);
        }
    };
    logging::init(cli.verbose);

    let cfg = resolve_config(&cli)?;
    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel)?;

    let client = OllamaClient::new(&cfg.endpoint, cfg.request_timeout())?;
    let parser = FencedBlockParser::new(cfg.unfenced);
    let executor = ShellExecutor::new(&cfg.shell, cfg.capture_limit_bytes, Echo::Terminal);
    let composer = PromptComposer::new(Platform::detect(&cfg.shell), cfg.max_chars);
    let session = Session {
        model: &client,
        parser: &parser,
        executor: &executor,
        confirm: &TerminalConfirm,
        composer: &composer,
        cancel: &cancel,
    };

    let options = session_options(&cli, &cfg);
    // Unlocked handles: executed children echo through the same streams from reader threads.
    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    let report = session.run(
        &options,
        &mut Console {
            out: &mut out,
            err: &mut err,
        },
    )?;
    debug!(trail = ?report.trail, "session trail");

    if let Outcome::Aborted(reason) = &report.outcome {
        eprintln!("clicra: {reason}");
        if matches!(reason, AbortReason::Transport(_)) {
            eprintln!("clicra: is a model server running at {}?", client.endpoint());
        }
    }
    Ok(exit_code_for(&report.outcome))
}

/// Config file first, then `OLLAMA_HOST`, then flags.
fn resolve_config(cli: &Cli) -> Result<ClicraConfig> {
    let mut cfg = match config_path(cli.config.as_deref()) {
        Some(path) => load_config(&path)?,
        None => ClicraConfig::default(),
    };
    cfg.apply_env_overrides();
    if let Some(model) = &cli.model {
        cfg.model = model.clone();
    }
    if let Some(max_chars) = cli.max_chars {
        cfg.max_chars = max_chars;
    }
    cfg.validate().context("invalid settings")?;
    Ok(cfg)
}

fn session_options(cli: &Cli, cfg: &ClicraConfig) -> SessionOptions {
    SessionOptions {
        task: cli.task.join(" "),
        model: cfg.model.clone(),
        kind: if cli.script {
            ArtifactKind::Script
        } else {
            ArtifactKind::Command
        },
        strategy: cli.prompt.map(PromptStrategy::from),
        refer: cli.refer.clone(),
        max_chars: cfg.max_chars,
        shell: cfg.shell.clone(),
        run_immediately: cli.run,
        show_prompts: cli.verbose,
    }
}

/// Ctrl-C kills a running artifact; anywhere else it ends the process.
fn install_interrupt_handler(cancel: &CancelToken) -> Result<()> {
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        if token.is_armed() {
            token.cancel();
        } else {
            std::process::exit(exit_codes::INTERRUPTED);
        }
    })
    .context("install Ctrl-C handler")
}

fn exit_code_for(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Staged(_) | Outcome::Explained(_) => exit_codes::OK,
        Outcome::Executed { result, .. } => match result.exit_code() {
            0 => exit_codes::OK,
            code @ 1..=255 => code,
            _ => exit_codes::INVALID,
        },
        Outcome::Interrupted { .. } => exit_codes::INTERRUPTED,
        Outcome::Aborted(_) => exit_codes::ABORTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clicra::core::types::{Artifact, ExecutionResult};

    #[test]
    fn parse_joins_task_words() {
        let cli = Cli::parse_from(["clicra", "list", "all", "files"]);
        let options = session_options(&cli, &ClicraConfig::default());
        assert_eq!(options.task, "list all files");
        assert_eq!(options.kind, ArtifactKind::Command);
        assert!(!options.run_immediately);
        assert_eq!(options.strategy, None);
    }

    #[test]
    fn parse_script_and_refer() {
        let cli = Cli::parse_from(["clicra", "-s", "-f", "ls -la", "rename", "these"]);
        let options = session_options(&cli, &ClicraConfig::default());
        assert_eq!(options.kind, ArtifactKind::Script);
        assert_eq!(options.refer.as_deref(), Some("ls -la"));
    }

    #[test]
    fn parse_prompt_strategy() {
        let cli = Cli::parse_from(["clicra", "--prompt", "tot", "why"]);
        assert_eq!(cli.prompt, Some(StrategyArg::Tot));
        assert_eq!(
            PromptStrategy::from(StrategyArg::Sbs),
            PromptStrategy::StepByStep
        );
    }

    #[test]
    fn run_conflicts_with_script_and_prompt() {
        assert!(Cli::try_parse_from(["clicra", "-r", "-s", "x"]).is_err());
        assert!(Cli::try_parse_from(["clicra", "-r", "-p", "sbs", "x"]).is_err());
        assert!(Cli::try_parse_from(["clicra", "-s", "-p", "sbs", "x"]).is_err());
    }

    #[test]
    fn task_is_required() {
        assert!(Cli::try_parse_from(["clicra"]).is_err());
        assert!(Cli::try_parse_from(["clicra", "--run"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["clicra", "-m", "mistral", "-M", "50", "-r", "x"]);
        let mut cfg = ClicraConfig::default();
        cfg.model = cli.model.clone().expect("model");
        cfg.max_chars = cli.max_chars.expect("max chars");
        let options = session_options(&cli, &cfg);
        assert_eq!(options.model, "mistral");
        assert_eq!(options.max_chars, 50);
        assert!(options.run_immediately);
    }

    #[test]
    fn exit_code_follows_outcome() {
        let artifact = Artifact::new(ArtifactKind::Command, "ls").expect("artifact");
        let executed = |code| Outcome::Executed {
            artifact: artifact.clone(),
            result: ExecutionResult::new(code, "", ""),
            analysis: None,
        };
        assert_eq!(exit_code_for(&Outcome::Staged(artifact.clone())), exit_codes::OK);
        assert_eq!(exit_code_for(&executed(0)), exit_codes::OK);
        assert_eq!(exit_code_for(&executed(1)), 1);
        assert_eq!(exit_code_for(&executed(127)), 127);
        assert_eq!(exit_code_for(&executed(-1)), exit_codes::INVALID);
        assert_eq!(
            exit_code_for(&Outcome::Interrupted { artifact }),
            exit_codes::INTERRUPTED
        );
        assert_eq!(
            exit_code_for(&Outcome::Aborted(AbortReason::Transport("down".to_string()))),
            exit_codes::ABORTED
        );
    }
}
