use crate::error::Result;
use std::io::{self, BufRead, Write};

/// The person running a test. Prompts go to them and their answers come
/// back as typed.
pub trait Operator {
    /// Ask a question and return the answer without its line ending.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Show an instruction that needs no answer.
    fn notify(&mut self, message: &str) -> Result<()>;

    /// Ask a yes or no question.
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(is_yes(&self.ask(&format!("{prompt} [Y/N] "))?))
    }

    /// Wait for the operator to acknowledge an instruction.
    fn pause(&mut self, message: &str) -> Result<()> {
        self.ask(&format!("{message} Hit enter to continue."))?;
        Ok(())
    }
}

/// True when an answer contains a `Y` in either case.
pub fn is_yes(answer: &str) -> bool {
    answer.to_uppercase().contains('Y')
}

/// Operator at the terminal.
pub struct ConsoleOperator<R = io::StdinLock<'static>, W = io::Stdout> {
    input: R,
    output: W,
}

impl ConsoleOperator {
    pub fn new() -> Self {
        Self {
            input: io::stdin().lock(),
            output: io::stdout(),
        }
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    /// Operator on arbitrary streams.
    pub fn with_streams(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Y", true)]
    #[case("yes", true)]
    #[case("okay", true)]
    #[case("n", false)]
    #[case("", false)]
    fn test_is_yes(#[case] answer: &str, #[case] expected: bool) {
        assert_eq!(is_yes(answer), expected);
    }

    #[test]
    fn test_console_operator_reads_lines() {
        let input = io::Cursor::new(b"Jane Doe\r\ny\n".to_vec());
        let mut output = Vec::new();
        let mut operator = ConsoleOperator::with_streams(input, &mut output);
        assert_eq!(operator.ask("QCT Conductor: ").unwrap(), "Jane Doe");
        assert!(operator.confirm("Did the pump shut off?").unwrap());
        operator.notify("Sensors should now be off.").unwrap();
        drop(operator);
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(
            shown,
            "QCT Conductor: Did the pump shut off? [Y/N] Sensors should now be off.\n"
        );
    }
}
