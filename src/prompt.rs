use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Where answers come from. Every prompt carries a stable dotted `key` so an
/// unattended source can answer it; the terminal ignores the key.
pub trait Prompter {
    /// Yes/no question. An empty answer takes `default`.
    fn confirm(&self, key: &str, default: bool, message: &str) -> Result<bool>;

    /// Free text, trimmed.
    fn ask(&self, key: &str, message: &str) -> Result<String>;

    /// Free text that is not echoed.
    fn ask_secret(&self, key: &str, message: &str) -> Result<String>;

    /// Whether invalid input can be corrected by asking again.
    fn interactive(&self) -> bool {
        true
    }
}

/// Reads answers from the controlling terminal.
#[derive(Debug, Default)]
pub struct Terminal;

impl Terminal {
    fn read_line(&self) -> Result<Option<String>> {
        io::stdout().flush()?;
        let mut input = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut input)
            .context("Failed to read from terminal")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}

impl Prompter for Terminal {
    fn confirm(&self, _key: &str, default: bool, message: &str) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            print!("{message} [{hint}] ");
            let Some(input) = self.read_line()? else {
                println!();
                return Ok(default);
            };
            match interpret_answer(&input, default) {
                Some(answer) => return Ok(answer),
                None => println!("Please answer yes or no."),
            }
        }
    }

    fn ask(&self, _key: &str, message: &str) -> Result<String> {
        print!("{message}: ");
        Ok(self.read_line()?.unwrap_or_default())
    }

    fn ask_secret(&self, _key: &str, message: &str) -> Result<String> {
        rpassword::prompt_password(format!("{message}: "))
            .context("Failed to read secret from terminal")
    }
}

/// `Some(bool)` for a recognised yes/no token or an empty line, `None` for
/// anything that should be asked again.
pub fn interpret_answer(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_tokens() {
        let cases = [
            ("y", false, Some(true)),
            ("YES", false, Some(true)),
            ("  n ", true, Some(false)),
            ("No", true, Some(false)),
            ("", true, Some(true)),
            ("", false, Some(false)),
            ("yep", true, None),
            ("0", false, None),
        ];
        for (input, default, expected) in cases {
            assert_eq!(interpret_answer(input, default), expected, "{input:?}");
        }
    }
}
