//! Terminal prompts for operator decisions

use std::io::{self, BufRead, Write};

use action_flow::AutoDecision;
use async_trait::async_trait;
use beaconcheck_core_types::{Decision, DecisionPrompt, ExternalDecision};
use tracing::{info, warn};

/// Asks the operator on stdin. When stdin is closed or unreadable the
/// fallback policy answers instead.
#[derive(Debug, Clone, Default)]
pub struct TerminalDecision {
    fallback: AutoDecision,
}

impl TerminalDecision {
    pub fn new(fallback: AutoDecision) -> Self {
        Self { fallback }
    }
}

fn question(prompt: &DecisionPrompt) -> &'static str {
    match prompt {
        DecisionPrompt::BotChallenge { .. } => {
            "Solve the check in the browser window, then press ENTER to continue (q to stop): "
        }
        DecisionPrompt::StepFailed { .. } => "Continue with the next step? [y/N]: ",
        DecisionPrompt::ManualCheckpoint { .. } => "Press ENTER to continue (q to stop): ",
    }
}

/// Maps a typed answer onto a decision. Step failures need an explicit yes;
/// the other prompts continue unless the operator asks to stop.
pub fn parse_answer(prompt: &DecisionPrompt, answer: &str) -> Decision {
    let answer = answer.trim().to_ascii_lowercase();
    match prompt {
        DecisionPrompt::StepFailed { .. } => match answer.as_str() {
            "y" | "yes" => Decision::Continue,
            _ => Decision::Halt,
        },
        DecisionPrompt::BotChallenge { .. } | DecisionPrompt::ManualCheckpoint { .. } => {
            match answer.as_str() {
                "q" | "quit" | "n" | "no" | "stop" => Decision::Halt,
                _ => Decision::Continue,
            }
        }
    }
}

fn read_answer(text: String) -> io::Result<Option<String>> {
    let mut stderr = io::stderr().lock();
    writeln!(stderr)?;
    write!(stderr, "{text}")?;
    stderr.flush()?;

    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    Ok((read > 0).then_some(line))
}

#[async_trait]
impl ExternalDecision for TerminalDecision {
    async fn decide(&self, prompt: DecisionPrompt) -> Decision {
        let text = format!("{prompt}\n{}", question(&prompt));
        let answer = tokio::task::spawn_blocking(move || read_answer(text)).await;
        let decision = match answer {
            Ok(Ok(Some(line))) => parse_answer(&prompt, &line),
            Ok(Ok(None)) => {
                warn!(%prompt, "stdin closed, using configured policy");
                self.fallback.answer(&prompt)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read answer, using configured policy");
                self.fallback.answer(&prompt)
            }
            Err(err) => {
                warn!(error = %err, "prompt task failed, using configured policy");
                self.fallback.answer(&prompt)
            }
        };
        info!(step = prompt.step(), ?decision, "operator decision");
        decision
    }
}
