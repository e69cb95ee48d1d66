//! User-facing output and yes/no questions.

use std::io::{self, BufRead, Write};

use tracing::warn;

pub trait Console {
    fn announce(&mut self, message: &str);

    /// Ask a yes/no question. Only an explicit yes returns `true`.
    fn confirm(&mut self, question: &str) -> bool;
}

/// Console on stdout/stdin.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn announce(&mut self, message: &str) {
        println!("{message}");
    }

    fn confirm(&mut self, question: &str) -> bool {
        print!("{question}");
        if let Err(err) = io::stdout().flush() {
            warn!(error = %err, "failed to flush stdout");
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(err) => {
                warn!(error = %err, "failed to read answer, treating as no");
                false
            }
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}
