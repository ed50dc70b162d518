//! Options dialog
//!
//! The dialog turns configuration defaults into the parameters of one run.
//! [`DefaultsDialog`] accepts the defaults as they are, [`PromptDialog`]
//! asks for each option on a text stream.

use crate::config::{PluginParams, MAX_ERODE_SIZE};
use crate::error::{RemovalError, Result};
use crate::models::Model;
use std::io::{BufRead, Write};

/// How the user left the dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcome {
    Accepted(PluginParams),
    Cancelled,
}

/// Collects run parameters from the user
pub trait OptionsDialog {
    /// Show the dialog pre-filled with `defaults`
    ///
    /// # Errors
    /// I/O failures talking to the user, or defaults that do not validate.
    fn run(&mut self, defaults: PluginParams) -> Result<DialogOutcome>;
}

/// Non-interactive dialog: accepts the defaults after validating them
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultsDialog;

impl OptionsDialog for DefaultsDialog {
    fn run(&mut self, defaults: PluginParams) -> Result<DialogOutcome> {
        defaults.validate()?;
        Ok(DialogOutcome::Accepted(defaults))
    }
}

/// Text prompt dialog over any reader/writer pair
///
/// An empty answer keeps the shown default, an invalid answer repeats the
/// question, and `q` or end of input cancels.
pub struct PromptDialog<R, W> {
    input: R,
    output: W,
}

enum Answer<T> {
    Value(T),
    Cancel,
}

impl<R: BufRead, W: Write> PromptDialog<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the underlying streams
    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    fn ask<T>(
        &mut self,
        question: &str,
        default_label: &str,
        parse: impl Fn(&str) -> std::result::Result<T, String>,
        default: T,
    ) -> Result<Answer<T>> {
        loop {
            write!(self.output, "{question} [{default_label}]: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Answer::Cancel);
            }
            let answer = line.trim();
            if answer.eq_ignore_ascii_case("q") {
                return Ok(Answer::Cancel);
            }
            if answer.is_empty() {
                return Ok(Answer::Value(default));
            }
            match parse(answer) {
                Ok(value) => return Ok(Answer::Value(value)),
                Err(reason) => writeln!(self.output, "  {reason}")?,
            }
        }
    }

    fn ask_bool(&mut self, question: &str, default: bool) -> Result<Answer<bool>> {
        let label = if default { "Y/n" } else { "y/N" };
        self.ask(question, label, parse_bool, default)
    }

    fn ask_model(&mut self, default: Model) -> Result<Answer<Model>> {
        let choices = Model::ALL
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{i}={m}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(self.output, "Models: {choices}")?;
        self.ask("Model", default.name(), parse_model, default)
    }

    fn ask_erode(&mut self, default: u32) -> Result<Answer<u32>> {
        let question = format!("Alpha matting erode size (0-{MAX_ERODE_SIZE})");
        self.ask(&question, &default.to_string(), parse_erode, default)
    }
}

macro_rules! answer {
    ($expr:expr) => {
        match $expr? {
            Answer::Value(value) => value,
            Answer::Cancel => return Ok(DialogOutcome::Cancelled),
        }
    };
}

impl<R: BufRead, W: Write> OptionsDialog for PromptDialog<R, W> {
    fn run(&mut self, defaults: PluginParams) -> Result<DialogOutcome> {
        writeln!(self.output, "AI Remove Background Settings")?;

        let as_mask = answer!(self.ask_bool("Use as mask", defaults.as_mask));
        let model = answer!(self.ask_model(defaults.model));
        let alpha_matting = answer!(self.ask_bool("Alpha matting", defaults.alpha_matting));
        let erode_size = if alpha_matting {
            answer!(self.ask_erode(defaults.erode_size))
        } else {
            defaults.erode_size
        };
        let make_square = answer!(self.ask_bool("Make square", defaults.make_square));
        let process_all_images =
            answer!(self.ask_bool("Process all open images", defaults.process_all_images));
        let keep_layers = if as_mask {
            defaults.keep_layers
        } else {
            answer!(self.ask_bool("Keep layers (skip flatten)", defaults.keep_layers))
        };

        if !answer!(self.ask_bool("Proceed", true)) {
            return Ok(DialogOutcome::Cancelled);
        }

        let params = PluginParams::builder()
            .as_mask(as_mask)
            .model(model)
            .alpha_matting(alpha_matting)
            .erode_size(erode_size)
            .make_square(make_square)
            .process_all_images(process_all_images)
            .keep_layers(keep_layers)
            .build()?;
        Ok(DialogOutcome::Accepted(params))
    }
}

fn parse_bool(answer: &str) -> std::result::Result<bool, String> {
    match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "on" => Ok(true),
        "n" | "no" | "false" | "0" | "off" => Ok(false),
        other => Err(format!("Please answer y or n (got '{other}')")),
    }
}

fn parse_model(answer: &str) -> std::result::Result<Model, String> {
    if let Ok(index) = answer.parse::<usize>() {
        return Model::from_index(index)
            .ok_or_else(|| format!("Model index must be below {}", Model::ALL.len()));
    }
    answer.parse::<Model>().map_err(|e: RemovalError| e.to_string())
}

fn parse_erode(answer: &str) -> std::result::Result<u32, String> {
    match answer.parse::<u32>() {
        Ok(value) if value <= MAX_ERODE_SIZE => Ok(value),
        _ => Err(format!("Enter a whole number from 0 to {MAX_ERODE_SIZE}")),
    }
}
