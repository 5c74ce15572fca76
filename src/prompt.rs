use std::io::{self, BufRead, Write};

/// Source of yes/no answers before a destructive step.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

/// Asks on stdin, repeating the question until it gets a yes or a no.
///
/// End of input counts as "no".
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let stdin = io::stdin();
        ask(&mut stdin.lock(), &mut io::stdout(), question)
    }
}

/// Answers yes without asking (`--yes`).
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str) -> io::Result<bool> {
        Ok(true)
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<bool> {
    let mut line = String::new();
    loop {
        write!(out, "{}", question)?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}
