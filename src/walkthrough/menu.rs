//! Numbered interactive menu shared by the walkthroughs
//!
//! Steps are numbered from 1 in declaration order; the option after the last
//! step exits. End of input also exits.

use std::io::{self, BufRead, Write};
use strum::IntoEnumIterator;

/// A walkthrough step that can be listed in the menu
pub trait MenuStep: Copy + IntoEnumIterator + 'static {
    fn label(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice<S> {
    Run(S),
    Exit,
}

/// Number of the exit option
pub fn exit_option<S: MenuStep>() -> usize {
    S::iter().count() + 1
}

/// Maps a typed line to a menu choice, `None` if it is not a valid option
pub fn parse_choice<S: MenuStep>(line: &str) -> Option<MenuChoice<S>> {
    let number: usize = line.trim().parse().ok()?;

    if number == exit_option::<S>() {
        return Some(MenuChoice::Exit);
    }

    number
        .checked_sub(1)
        .and_then(|index| S::iter().nth(index))
        .map(MenuChoice::Run)
}

pub fn render<S: MenuStep>(title: &str, out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== {title} ===")?;
    for (index, step) in S::iter().enumerate() {
        writeln!(out, "  {}) {}", index + 1, step.label())?;
    }
    writeln!(out, "  {}) Exit", exit_option::<S>())?;
    Ok(())
}

/// Shows the menu and reads until a valid choice or end of input
///
/// # Errors
///
/// Returns `Err` if reading input or writing output fails.
pub fn prompt<S: MenuStep>(
    title: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<MenuChoice<S>> {
    loop {
        render::<S>(title, out)?;
        write!(out, "Select an option [1-{}]: ", exit_option::<S>())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(MenuChoice::Exit);
        }

        match parse_choice::<S>(&line) {
            Some(choice) => return Ok(choice),
            None => writeln!(out, "Invalid option '{}'", line.trim())?,
        }
    }
}

/// Prints the banner shown before a step runs
pub fn announce<S: MenuStep>(step: S, out: &mut impl Write) -> io::Result<()> {
    let position = S::iter()
        .position(|s| s.label() == step.label())
        .map_or(0, |p| p + 1);
    writeln!(out)?;
    writeln!(
        out,
        "==> [{position}/{}] {}",
        S::iter().count(),
        step.label()
    )
}
