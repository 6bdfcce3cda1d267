//! Line-oriented terminal chooser.
//!
//! Choices are written as a numbered list; the operator answers with one line:
//!
//! - `N` selects choice `N` (1-based)
//! - `<prefix>N` selects choice `N` with the modifier held (`!3` by default)
//! - `b` or `back` selects the back choice
//! - an empty line, `q` or end of input selects nothing
//!
//! Anything else is reported and the prompt repeats.

use std::io::{self, BufRead, Write};

use tracing::warn;
use treetrail_core::choice::Choice;
use treetrail_core::interaction::Chooser;

/// A parsed answer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Zero-based index into the posted choices.
    Pick { index: usize, modifier: bool },
    Back,
    Nothing,
}

/// Parse one answer line against a list of `count` choices.
pub fn parse_reply(line: &str, modifier_prefix: &str, count: usize) -> Result<Reply, String> {
    let line = line.trim();
    match line {
        "" | "q" => return Ok(Reply::Nothing),
        "b" | "back" => return Ok(Reply::Back),
        _ => {}
    }

    let (modifier, digits) = match line.strip_prefix(modifier_prefix) {
        Some(rest) if !modifier_prefix.is_empty() => (true, rest.trim_start()),
        _ => (false, line),
    };
    let number: usize = digits
        .parse()
        .map_err(|_| format!("not a choice: {:?}", line))?;
    if number == 0 || number > count {
        return Err(format!("choose a number from 1 to {}", count));
    }
    Ok(Reply::Pick {
        index: number - 1,
        modifier,
    })
}

/// Render a numbered choice list, marking `preselected` with `>`.
pub fn render_choices(choices: &[Choice], preselected: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(choices.len() * 2);
    for (offset, choice) in choices.iter().enumerate() {
        let marker = if offset == preselected { '>' } else { ' ' };
        lines.push(format!("{}{:>3}. {}", marker, offset + 1, choice.text));
        if !choice.subtext.is_empty() {
            lines.push(format!("       {}", choice.subtext));
        }
    }
    lines
}

/// What the operator picked.
#[derive(Debug, Clone, Default)]
pub struct Picked {
    pub choice: Option<Choice>,
    pub modifier: bool,
}

/// Chooser reading answers from `R` and drawing on `W`.
pub struct TerminalChooser<R, W> {
    input: R,
    output: W,
    modifier_prefix: String,
    posted: Vec<Choice>,
    shown: bool,
    eof: bool,
}

impl<R: BufRead, W: Write> TerminalChooser<R, W> {
    pub fn new(input: R, output: W, modifier_prefix: impl Into<String>) -> Self {
        TerminalChooser {
            input,
            output,
            modifier_prefix: modifier_prefix.into(),
            posted: Vec::new(),
            shown: false,
            eof: false,
        }
    }

    /// Whether input has been exhausted.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Block until the operator answers the posted list.
    pub fn read_selection(&mut self) -> io::Result<Picked> {
        loop {
            write!(self.output, "choice> ")?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                self.shown = false;
                return Ok(Picked::default());
            };

            match parse_reply(&line, &self.modifier_prefix, self.posted.len()) {
                Ok(Reply::Nothing) => {
                    self.shown = false;
                    return Ok(Picked::default());
                }
                Ok(Reply::Back) => match self.posted.iter().find(|choice| choice.is_back()) {
                    Some(back) => {
                        self.shown = false;
                        return Ok(Picked {
                            choice: Some(back.clone()),
                            modifier: false,
                        });
                    }
                    None => writeln!(self.output, "already at the root")?,
                },
                Ok(Reply::Pick { index, modifier }) => {
                    self.shown = false;
                    return Ok(Picked {
                        choice: Some(self.posted[index].clone()),
                        modifier,
                    });
                }
                Err(message) => writeln!(self.output, "{}", message)?,
            }
        }
    }

    /// Ask a free-form question. `None` at end of input.
    pub fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        self.read_line()
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn draw(&mut self, lines: &[String]) {
        for line in lines {
            if let Err(err) = writeln!(self.output, "{}", line) {
                warn!(error = %err, "terminal write failed");
                return;
            }
        }
    }
}

impl<R: BufRead, W: Write> Chooser for TerminalChooser<R, W> {
    fn post(&mut self, choices: &[Choice], preselected: usize) {
        self.posted = choices.to_vec();
        self.shown = true;
        let mut lines = vec![String::new()];
        lines.extend(render_choices(choices, preselected));
        self.draw(&lines);
    }

    fn is_currently_shown(&self) -> bool {
        self.shown
    }

    fn dismiss(&mut self) {
        self.shown = false;
        self.draw(&["(chooser hidden)".to_string()]);
    }

    fn show_status(&mut self, message: &str) {
        self.draw(&[format!("-- {}", message)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use treetrail_core::choice::{ChoiceKind, Selector};

    fn attribute(name: &str, subtext: &str) -> Choice {
        Choice {
            text: name.to_string(),
            subtext: subtext.to_string(),
            kind: ChoiceKind::Value,
            selector: Selector::Attribute(name.to_string()),
            settable: false,
        }
    }

    fn chooser(input: &str) -> TerminalChooser<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalChooser::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), "!")
    }

    fn output(chooser: TerminalChooser<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(chooser.into_parts().1).unwrap()
    }

    #[test]
    fn parses_numbers_prefixes_and_words() {
        assert_eq!(
            parse_reply("2", "!", 3),
            Ok(Reply::Pick {
                index: 1,
                modifier: false
            })
        );
        assert_eq!(
            parse_reply(" !3 ", "!", 3),
            Ok(Reply::Pick {
                index: 2,
                modifier: true
            })
        );
        assert_eq!(parse_reply("back", "!", 3), Ok(Reply::Back));
        assert_eq!(parse_reply("", "!", 3), Ok(Reply::Nothing));
        assert_eq!(parse_reply("q", "!", 3), Ok(Reply::Nothing));
        assert!(parse_reply("4", "!", 3).is_err());
        assert!(parse_reply("0", "!", 3).is_err());
        assert!(parse_reply("x", "!", 3).is_err());
    }

    #[test]
    fn parse_reply_with_word_prefix() {
        assert_eq!(
            parse_reply("mod 1", "mod", 1),
            Ok(Reply::Pick {
                index: 0,
                modifier: true
            })
        );
    }

    #[test]
    fn post_renders_numbered_list() {
        let mut chooser = chooser("");
        chooser.post(&[attribute("title", "Value: \"X\""), attribute("count", "")], 1);
        assert!(chooser.is_currently_shown());
        let text = output(chooser);
        assert_eq!(text, "\n   1. title\n       Value: \"X\"\n>  2. count\n");
    }

    #[test]
    fn read_selection_reprompts_on_bad_input() {
        let mut chooser = chooser("7\nnope\n!2\n");
        chooser.post(&[attribute("a", ""), attribute("b", "")], 0);
        let picked = chooser.read_selection().unwrap();
        assert_eq!(picked.choice.unwrap().text, "b");
        assert!(picked.modifier);
        assert!(!chooser.is_currently_shown());

        let text = output(chooser);
        assert!(text.contains("choose a number from 1 to 2"));
        assert!(text.contains("not a choice: \"nope\""));
    }

    #[test]
    fn back_without_back_choice_reprompts() {
        let mut chooser = chooser("b\n1\n");
        chooser.post(&[attribute("a", "")], 0);
        let picked = chooser.read_selection().unwrap();
        assert_eq!(picked.choice.unwrap().text, "a");
        assert!(output(chooser).contains("already at the root"));
    }

    #[test]
    fn back_picks_back_choice() {
        let mut chooser = chooser("b\n");
        chooser.post(&[Choice::back("root"), attribute("a", "")], 0);
        let picked = chooser.read_selection().unwrap();
        assert!(picked.choice.unwrap().is_back());
    }

    #[test]
    fn eof_selects_nothing() {
        let mut chooser = chooser("");
        chooser.post(&[attribute("a", "")], 0);
        let picked = chooser.read_selection().unwrap();
        assert!(picked.choice.is_none());
        assert!(chooser.at_eof());
        assert_eq!(chooser.prompt_line("again? ").unwrap(), None);
    }

    #[test]
    fn status_and_dismiss() {
        let mut chooser = chooser("");
        chooser.show_status("root is no longer valid");
        chooser.dismiss();
        assert_eq!(
            output(chooser),
            "-- root is no longer valid\n(chooser hidden)\n"
        );
    }
}
