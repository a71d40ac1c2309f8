//! Step lines, headings and count tables for command output

use super::context::UiContext;
use console::{style, StyledObject};
use std::fmt::Display;

/// How a step line is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Note,
    Warn,
    Fail,
}

impl Tone {
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Self::Ok => style("[OK]").green(),
            Self::Note => style("[INFO]").cyan(),
            Self::Warn => style("[WARN]").yellow(),
            Self::Fail => style("[FAIL]").red(),
        }
    }

    fn log(self, message: String) {
        let _ = match self {
            Self::Ok => cliclack::log::success(message),
            Self::Note => cliclack::log::info(message),
            Self::Warn => cliclack::log::warning(message),
            Self::Fail => cliclack::log::error(message),
        };
    }
}

/// Title of a long-running command
pub fn banner(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
        println!();
    }
}

/// Closing line: the problem when there is one, `done` otherwise
pub fn conclude(ctx: &UiContext, problem: Option<&str>, done: &str) {
    let (tone, message) = match problem {
        Some(problem) => (Tone::Warn, style(problem).yellow().bold()),
        None => (Tone::Ok, style(done).green().bold()),
    };
    if ctx.use_fancy_output() {
        cliclack::outro(message).ok();
    } else {
        println!();
        println!("{} {}", tone.tag(), message);
    }
}

pub fn heading(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step(ctx: &UiContext, tone: Tone, message: &str) {
    if ctx.use_fancy_output() {
        tone.log(message.to_string());
    } else {
        println!("  {} {}", tone.tag(), message);
    }
}

/// A step followed by a parenthesised detail (a path, a hint, an error)
pub fn step_detail(ctx: &UiContext, tone: Tone, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        let detail = if tone == Tone::Fail {
            style(detail).red()
        } else {
            style(detail).dim()
        };
        tone.log(format!("{} ({})", message, detail));
    } else {
        println!("  {} {} ({})", tone.tag(), message, detail);
    }
}

pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Labelled counts, one per line, with the numbers aligned
pub fn tally<T: Display>(ctx: &UiContext, rows: &[(&str, T)]) {
    for (label, line) in rows.iter().zip(tally_lines(rows)) {
        if ctx.use_fancy_output() {
            let value = &line[label.0.len() + 1..];
            println!("  {}:{}", style(label.0).dim(), value);
        } else {
            println!("  {}", line);
        }
    }
}

fn tally_lines<T: Display>(rows: &[(&str, T)]) -> Vec<String> {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(label, count)| {
            let pad = width - label.len();
            format!("{}:{} {}", label, " ".repeat(pad), count)
        })
        .collect()
}
