//! # User Input
//!
//! Where the contact activity gets its answers from. The console version asks
//! the person at the terminal to confirm every value; the scripted version
//! replays canned answers for demos and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Typing this at a console prompt cancels input
pub const CANCEL_COMMAND: &str = ":exit";

#[async_trait]
pub trait UserInput: Send + Sync {
    /// Ask for one value; `None` means the user cancelled
    async fn prompt_for_value(&self, label: &str) -> Option<String>;

    /// Show an informational line
    async fn show(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleUserInput;

impl ConsoleUserInput {
    pub fn new() -> Self {
        Self
    }

    fn read_line(stdin: &io::Stdin) -> Option<String> {
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn prompt_with_confirmation(label: &str) -> Option<String> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("{label}: ");
            let _ = stdout.flush();
            let value = Self::read_line(&stdin)?;
            if value == CANCEL_COMMAND {
                return None;
            }

            println!("You entered: {value}");
            print!("Use this value? (y/n): ");
            let _ = stdout.flush();
            let confirmation = Self::read_line(&stdin)?.to_lowercase();

            if confirmation == "y" {
                return Some(value);
            }
            if confirmation.starts_with('y') {
                println!("You can enter only 'y' or 'Y' to confirm your choice.");
                println!("Extra characters in the response aren't recognized.");
            } else {
                println!("Please re-enter your input, or type '{CANCEL_COMMAND}' to cancel input.");
            }
        }
    }
}

#[async_trait]
impl UserInput for ConsoleUserInput {
    async fn prompt_for_value(&self, label: &str) -> Option<String> {
        let label = label.to_string();
        tokio::task::spawn_blocking(move || Self::prompt_with_confirmation(&label))
            .await
            .ok()
            .flatten()
    }

    async fn show(&self, message: &str) {
        println!("{message}");
    }
}

/// Replays answers in order; an exhausted script behaves like a cancel
#[derive(Debug, Default)]
pub struct ScriptedUserInput {
    answers: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedUserInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_answers(answers.into_iter().map(|a| Some(a.into())))
    }

    /// `None` entries cancel the prompt they answer
    pub fn from_answers(answers: impl IntoIterator<Item = Option<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Labels asked so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }
}

#[async_trait]
impl UserInput for ScriptedUserInput {
    async fn prompt_for_value(&self, label: &str) -> Option<String> {
        self.prompts.lock().push(label.to_string());
        self.answers.lock().pop_front().flatten()
    }
}
