//! Interactive overwrite decisions.
//!
//! Every worker that needs an answer goes through one [`OverwriteState`]. Its
//! mutex keeps a single question on screen at a time, and the "apply to all"
//! bits it guards are re-checked once the lock is held, so a worker that was
//! queued behind an `N` answer never asks again.

use crate::error::{Error, Result};
use crate::ui::prelude::*;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of answers to overwrite questions.
pub trait Prompter: Send + Sync {
    /// Show `question` and wait for one line. `Ok(None)` means input is closed.
    fn ask(&self, question: &str, cancel: &CancellationToken) -> Result<Option<String>>;
}

type LineSource = Box<dyn Read + Send>;

/// Reads answers line by line from one input stream. The reader thread is
/// started on the first question, so runs that never prompt leave stdin alone.
pub struct LinePrompter {
    source: Mutex<Option<LineSource>>,
    lines: OnceLock<Mutex<Receiver<String>>>,
}

impl LinePrompter {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::stdin())
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            source: Mutex::new(Some(Box::new(reader))),
            lines: OnceLock::new(),
        }
    }

    fn receiver(&self) -> &Mutex<Receiver<String>> {
        self.lines.get_or_init(|| {
            let (tx, rx) = mpsc::channel();
            let source = self.source.lock().ok().and_then(|mut guard| guard.take());
            if let Some(source) = source {
                std::thread::spawn(move || {
                    let reader = BufReader::new(source);
                    for line in reader.lines() {
                        let Ok(line) = line else { break };
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
            Mutex::new(rx)
        })
    }
}

impl Prompter for LinePrompter {
    fn ask(&self, question: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "{}", question);
            let _ = stderr.flush();
        }

        let rx = self
            .receiver()
            .lock()
            .map_err(|_| Error::Prompt("input reader lock poisoned".into()))?;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::OperationCanceled);
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => return Ok(Some(line)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decisions {
    pub overwrite_all: bool,
    pub preserve_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    YesToAll,
    NoToAll,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim() {
        "y" => Some(Answer::Yes),
        "n" => Some(Answer::No),
        "Y" => Some(Answer::YesToAll),
        "N" => Some(Answer::NoToAll),
        _ => None,
    }
}

/// Process-wide overwrite/preserve bits and the lock that serializes prompts.
#[derive(Debug, Default)]
pub struct OverwriteState {
    decisions: Mutex<Decisions>,
}

impl OverwriteState {
    pub fn new(overwrite_all: bool, preserve_all: bool) -> Self {
        Self {
            decisions: Mutex::new(Decisions {
                overwrite_all,
                preserve_all,
            }),
        }
    }

    pub fn decisions(&self) -> Decisions {
        self.decisions.lock().map(|d| *d).unwrap_or_default()
    }

    /// Whether `field` may be replaced. Asks through `prompter` unless a
    /// global decision already exists.
    pub fn should_overwrite(
        &self,
        label: &str,
        field: &str,
        current: &str,
        proposed: &str,
        prompter: &dyn Prompter,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let mut decisions = self
            .decisions
            .lock()
            .map_err(|_| Error::Prompt("overwrite state lock poisoned".into()))?;
        if decisions.overwrite_all {
            return Ok(true);
        }
        if decisions.preserve_all {
            return Ok(false);
        }

        let question = format!(
            "{}: field '{}' is \"{}\", replace with \"{}\"? [y/n, Y/N for all] ",
            label, field, current, proposed
        );
        loop {
            if cancel.is_cancelled() {
                return Err(Error::OperationCanceled);
            }
            let Some(line) = prompter.ask(&question, cancel)? else {
                emit(
                    Level::Warn,
                    "prompt.closed",
                    "Input closed; keeping existing values for the rest of the batch",
                    None,
                );
                decisions.preserve_all = true;
                return Ok(false);
            };
            match parse_answer(&line) {
                Some(Answer::Yes) => return Ok(true),
                Some(Answer::No) => return Ok(false),
                Some(Answer::YesToAll) => {
                    decisions.overwrite_all = true;
                    return Ok(true);
                }
                Some(Answer::NoToAll) => {
                    decisions.preserve_all = true;
                    return Ok(false);
                }
                None => emit(
                    Level::Warn,
                    "prompt.invalid",
                    &format!("'{}' is not one of y, n, Y, N", line.trim()),
                    None,
                ),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Replays canned answers and counts questions.
    pub(crate) struct ScriptedPrompter {
        answers: Mutex<VecDeque<String>>,
        pub asked: Mutex<usize>,
    }

    impl ScriptedPrompter {
        pub(crate) fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
                asked: Mutex::new(0),
            }
        }

        pub(crate) fn asked(&self) -> usize {
            *self.asked.lock().unwrap()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&self, _question: &str, _cancel: &CancellationToken) -> Result<Option<String>> {
            *self.asked.lock().unwrap() += 1;
            Ok(self.answers.lock().unwrap().pop_front())
        }
    }

    #[test]
    fn test_uppercase_no_flips_preserve_bit() {
        let state = OverwriteState::default();
        let prompter = ScriptedPrompter::new(&["N"]);
        let cancel = CancellationToken::new();

        assert!(!state.should_overwrite("a", "title", "Old", "New", &prompter, &cancel).unwrap());
        assert!(state.decisions().preserve_all);
        assert!(!state.should_overwrite("b", "title", "Old", "New", &prompter, &cancel).unwrap());
        assert_eq!(prompter.asked(), 1);
    }

    #[test]
    fn test_poisoned_state_fails_as_prompt_error() {
        let state = OverwriteState::default();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.decisions.lock().unwrap();
            panic!("worker died while asking");
        }));
        let prompter = ScriptedPrompter::new(&["y"]);
        let err = state
            .should_overwrite("a", "title", "Old", "New", &prompter, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Prompt(_)));
        assert_eq!(err.kind(), "prompt");
        assert_eq!(prompter.asked(), 0);
    }

    #[test]
    fn test_lowercase_answers_stay_local() {
        let state = OverwriteState::default();
        let prompter = ScriptedPrompter::new(&["maybe", "y", "n"]);
        let cancel = CancellationToken::new();

        assert!(state.should_overwrite("a", "title", "x", "y", &prompter, &cancel).unwrap());
        assert!(!state.should_overwrite("a", "title", "x", "y", &prompter, &cancel).unwrap());
        assert_eq!(state.decisions(), Decisions::default());
        assert_eq!(prompter.asked(), 3);
    }

    #[test]
    fn test_global_bits_skip_prompt() {
        let prompter = ScriptedPrompter::new(&[]);
        let cancel = CancellationToken::new();
        let overwrite = OverwriteState::new(true, false);
        assert!(overwrite.should_overwrite("a", "t", "x", "y", &prompter, &cancel).unwrap());
        let preserve = OverwriteState::new(false, true);
        assert!(!preserve.should_overwrite("a", "t", "x", "y", &prompter, &cancel).unwrap());
        assert_eq!(prompter.asked(), 0);
    }

    #[test]
    fn test_cancellation_before_prompt() {
        let state = OverwriteState::default();
        let prompter = ScriptedPrompter::new(&["y"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = state
            .should_overwrite("a", "t", "x", "y", &prompter, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::OperationCanceled));
    }

    #[test]
    fn test_line_prompter_reads_lines_then_reports_close() {
        let prompter = LinePrompter::from_reader(Cursor::new("Y\n"));
        let cancel = CancellationToken::new();
        assert_eq!(prompter.ask("? ", &cancel).unwrap(), Some("Y".to_string()));
        assert_eq!(prompter.ask("? ", &cancel).unwrap(), None);
    }
}
