use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// Decision taken by the operator after an exception is surfaced.
///
/// These are expected branches, not errors: the batch loop inspects the
/// choice and either moves to the next file, ends the pass keeping the
/// results accumulated so far, or unwinds the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorChoice {
    /// Skip the current file and proceed with the batch.
    Continue,
    /// Stop the conversion loop early, preserving already-accepted results.
    Stop,
    /// Abort the whole program.
    Abort,
}

/// Blocking operator-interaction capability.
///
/// Injected into the extractor and the orchestrator so interactive console
/// loops can be swapped for a scripted strategy in tests or unattended runs.
/// Implementations must block until a usable answer is available; `resolve`
/// in particular is an unlimited-retry loop from the caller's perspective.
pub trait Prompter {
    /// Asks the operator for replacement text after an ambiguous or absent
    /// extraction. `context` names the task, `original` is the text the
    /// extraction ran against, `prompt` describes what is needed.
    fn resolve(&mut self, context: &str, original: &str, prompt: &str) -> Result<String>;

    /// Surfaces an exception and asks how to proceed with the batch.
    fn decide(&mut self, context: &str) -> Result<OperatorChoice>;

    /// Surfaces a suspect condition for manual review. Returns true only
    /// when the operator explicitly accepts it.
    fn confirm(&mut self, context: &str) -> Result<bool>;

    /// Missing-export either/or: returns true to accept the source file as
    /// genuinely empty, false to treat the absence as a hard failure.
    fn accept_empty(&mut self, context: &str) -> Result<bool>;

    /// Asks the operator to reconfigure the external tool for `revision`
    /// before the next retry pass. Returns false to stop instead.
    fn confirm_reconfigured(&mut self, revision: &str) -> Result<bool>;
}

/// Interactive prompter reading one line at a time from stdin.
///
/// Every prompt prints the full field values and filenames involved before
/// reading, so the operator can cross-reference source files without
/// re-opening them.
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    /// Creates a new console prompter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        std::io::stdout()
            .flush()
            .map_err(|e| Error::prompt(e.to_string()))?;
        let n = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::prompt(e.to_string()))?;
        if n == 0 {
            return Err(Error::prompt("stdin closed"));
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for ConsolePrompter {
    fn resolve(&mut self, context: &str, original: &str, prompt: &str) -> Result<String> {
        println!("\n{context}");
        println!("  original text: {original}");
        print!("  {prompt}: ");
        self.read_line()
    }

    fn decide(&mut self, context: &str) -> Result<OperatorChoice> {
        println!("\n{context}");
        loop {
            print!("  [c]ontinue with next file / [s]top conversion loop / [a]bort program: ");
            match self.read_line()?.to_lowercase().as_str() {
                "c" | "continue" => return Ok(OperatorChoice::Continue),
                "s" | "stop" => return Ok(OperatorChoice::Stop),
                "a" | "abort" => return Ok(OperatorChoice::Abort),
                other => println!("  unrecognized answer '{other}'"),
            }
        }
    }

    fn confirm(&mut self, context: &str) -> Result<bool> {
        println!("\n{context}");
        loop {
            print!("  accept? [y/n]: ");
            match self.read_line()?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                other => println!("  unrecognized answer '{other}'"),
            }
        }
    }

    fn accept_empty(&mut self, context: &str) -> Result<bool> {
        println!("\n{context}");
        loop {
            print!("  accept as genuinely empty? [y/n]: ");
            match self.read_line()?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                other => println!("  unrecognized answer '{other}'"),
            }
        }
    }

    fn confirm_reconfigured(&mut self, revision: &str) -> Result<bool> {
        println!("\nDeferred files require tool revision '{revision}'.");
        loop {
            print!("  reconfigure the tool for '{revision}' and press [y] to retry, [n] to stop: ");
            match self.read_line()?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                other => println!("  unrecognized answer '{other}'"),
            }
        }
    }
}

/// Non-interactive prompter fed with queued answers.
///
/// Useful for unattended runs with known fixups and for tests. Each
/// capability drains its own queue; an exhausted queue is a prompt failure
/// rather than a silent default, so scripts that fall short fail loudly.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    replacements: VecDeque<String>,
    choices: VecDeque<OperatorChoice>,
    confirmations: VecDeque<bool>,
    accept_empty: VecDeque<bool>,
    reconfigure: VecDeque<bool>,
}

impl ScriptedPrompter {
    /// Creates an empty script. Any prompt against it fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a replacement text for the next `resolve` call.
    #[must_use]
    pub fn with_replacement(mut self, text: impl Into<String>) -> Self {
        self.replacements.push_back(text.into());
        self
    }

    /// Queues an operator choice for the next `decide` call.
    #[must_use]
    pub fn with_choice(mut self, choice: OperatorChoice) -> Self {
        self.choices.push_back(choice);
        self
    }

    /// Queues an answer for the next `confirm` call.
    #[must_use]
    pub fn with_confirmation(mut self, accept: bool) -> Self {
        self.confirmations.push_back(accept);
        self
    }

    /// Queues an answer for the next `accept_empty` call.
    #[must_use]
    pub fn with_accept_empty(mut self, accept: bool) -> Self {
        self.accept_empty.push_back(accept);
        self
    }

    /// Queues an answer for the next `confirm_reconfigured` call.
    #[must_use]
    pub fn with_reconfigured(mut self, ready: bool) -> Self {
        self.reconfigure.push_back(ready);
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn resolve(&mut self, context: &str, _original: &str, _prompt: &str) -> Result<String> {
        self.replacements
            .pop_front()
            .ok_or_else(|| Error::prompt(format!("no scripted replacement for: {context}")))
    }

    fn decide(&mut self, context: &str) -> Result<OperatorChoice> {
        self.choices
            .pop_front()
            .ok_or_else(|| Error::prompt(format!("no scripted choice for: {context}")))
    }

    fn confirm(&mut self, context: &str) -> Result<bool> {
        self.confirmations
            .pop_front()
            .ok_or_else(|| Error::prompt(format!("no scripted confirmation for: {context}")))
    }

    fn accept_empty(&mut self, context: &str) -> Result<bool> {
        self.accept_empty
            .pop_front()
            .ok_or_else(|| Error::prompt(format!("no scripted accept-empty answer for: {context}")))
    }

    fn confirm_reconfigured(&mut self, revision: &str) -> Result<bool> {
        self.reconfigure.pop_front().ok_or_else(|| {
            Error::prompt(format!("no scripted reconfigure answer for: {revision}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replacements_in_order() {
        let mut prompter = ScriptedPrompter::new()
            .with_replacement("3123456")
            .with_replacement("20230815");

        assert_eq!(prompter.resolve("ctx", "orig", "p").unwrap(), "3123456");
        assert_eq!(prompter.resolve("ctx", "orig", "p").unwrap(), "20230815");
    }

    #[test]
    fn test_scripted_exhaustion_is_error() {
        let mut prompter = ScriptedPrompter::new();
        let err = prompter.resolve("serial for x.cpf", "x", "enter serial");
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("serial for x.cpf"));
    }

    #[test]
    fn test_scripted_choices() {
        let mut prompter = ScriptedPrompter::new()
            .with_choice(OperatorChoice::Continue)
            .with_choice(OperatorChoice::Abort);

        assert_eq!(prompter.decide("err").unwrap(), OperatorChoice::Continue);
        assert_eq!(prompter.decide("err").unwrap(), OperatorChoice::Abort);
        assert!(prompter.decide("err").is_err());
    }

    #[test]
    fn test_scripted_binary_answers() {
        let mut prompter = ScriptedPrompter::new()
            .with_confirmation(true)
            .with_accept_empty(true)
            .with_reconfigured(false);

        assert!(prompter.confirm("suspect serial").unwrap());
        assert!(prompter.accept_empty("missing export").unwrap());
        assert!(!prompter.confirm_reconfigured("rev B").unwrap());
        assert!(prompter.confirm("suspect serial").is_err());
    }
}
