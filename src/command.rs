//! Serial command line.
//!
//! ```text
//! XY <x> <y>              0..65535
//! SXY <x> <y>             -32768..32767
//! STAT                    read and clear status -> STAT 0x..
//! PAT CIRCLE|SQUARE|OFF
//! HELP
//! ```
//!
//! Lines end with `\n` or `\r`, keywords are case insensitive. Every line
//! is answered with `OK`, `STAT 0x..`, the help text or `ERR <reason>`.

use core::fmt;
use core::str::FromStr;

use crate::pattern::{Pattern, Shape};
use crate::{Sample, Status, TransferWord, Transmitter};

pub const HELP: &str = "XY x y | SXY x y | STAT | PAT CIRCLE|SQUARE|OFF | HELP";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Pos(u16, u16),
    SignedPos(i16, i16),
    Status,
    Pattern(Shape),
    Help,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    Empty,
    UnknownCommand,
    MissingArgument,
    BadNumber,
    TrailingInput,
    LineTooLong,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandError::Empty => "empty line",
            CommandError::UnknownCommand => "unknown command",
            CommandError::MissingArgument => "missing argument",
            CommandError::BadNumber => "bad number",
            CommandError::TrailingInput => "unexpected argument",
            CommandError::LineTooLong => "line too long",
        })
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_ascii_whitespace();
        let keyword = words.next().ok_or(CommandError::Empty)?;

        let command = if keyword.eq_ignore_ascii_case("XY") {
            Command::Pos(arg(&mut words)?, arg(&mut words)?)
        } else if keyword.eq_ignore_ascii_case("SXY") {
            Command::SignedPos(arg(&mut words)?, arg(&mut words)?)
        } else if keyword.eq_ignore_ascii_case("STAT") {
            Command::Status
        } else if keyword.eq_ignore_ascii_case("PAT") {
            let name = words.next().ok_or(CommandError::MissingArgument)?;
            Command::Pattern(
                [
                    ("CIRCLE", Shape::Circle),
                    ("SQUARE", Shape::Square),
                    ("OFF", Shape::Off),
                ]
                .into_iter()
                .find(|(n, _)| name.eq_ignore_ascii_case(n))
                .map(|(_, shape)| shape)
                .ok_or(CommandError::UnknownCommand)?,
            )
        } else if keyword.eq_ignore_ascii_case("HELP") {
            Command::Help
        } else {
            return Err(CommandError::UnknownCommand);
        };

        match words.next() {
            Some(_) => Err(CommandError::TrailingInput),
            None => Ok(command),
        }
    }
}

fn arg<'a, T: FromStr>(words: &mut impl Iterator<Item = &'a str>) -> Result<T, CommandError> {
    words
        .next()
        .ok_or(CommandError::MissingArgument)?
        .parse()
        .map_err(|_| CommandError::BadNumber)
}

/// Accumulates received bytes into lines of at most `N` bytes.
pub struct LineReader<const N: usize> {
    buf: heapless::String<N>,
    overflow: bool,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::String::new(),
            overflow: false,
        }
    }

    /// `Some` once a line is complete. Blank lines are skipped, so a `\r\n`
    /// pair ends one line only.
    pub fn feed(&mut self, byte: u8) -> Option<Result<Command, CommandError>> {
        if byte == b'\n' || byte == b'\r' {
            let result = if self.overflow {
                Some(Err(CommandError::LineTooLong))
            } else if self.buf.trim().is_empty() {
                None
            } else {
                Some(self.buf.parse())
            };

            self.buf.clear();
            self.overflow = false;
            result
        } else {
            if self.buf.push(byte as char).is_err() {
                self.overflow = true;
            }
            None
        }
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reply {
    Ok,
    Status(Status),
    Help,
    Err(CommandError),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("OK"),
            Reply::Status(status) => write!(f, "STAT 0x{:02x}", status.bits()),
            Reply::Help => f.write_str(HELP),
            Reply::Err(e) => write!(f, "ERR {}", e),
        }
    }
}

impl From<Result<Command, CommandError>> for Reply {
    fn from(result: Result<Command, CommandError>) -> Self {
        match result {
            Ok(Command::Help) => Reply::Help,
            Ok(_) => Reply::Ok,
            Err(e) => Reply::Err(e),
        }
    }
}

/// Runs `command` against the galvo output.
///
/// Explicit positions stop the running pattern. `PAT OFF` parks the beam at
/// the center.
pub fn execute<W: TransferWord>(
    command: Command,
    tx: &mut Transmitter<W>,
    pattern: &mut Pattern,
) -> Reply {
    trace!("command: {}", command);

    match command {
        Command::Pos(x, y) => {
            pattern.set_shape(Shape::Off);
            tx.set_pos(x, y);
        }
        Command::SignedPos(x, y) => {
            pattern.set_shape(Shape::Off);
            tx.set_signed_pos(x, y);
        }
        Command::Status => return Reply::Status(tx.read_and_clear_status()),
        Command::Pattern(shape) => {
            pattern.set_shape(shape);
            if shape == Shape::Off {
                tx.set_sample(Sample::CENTER);
            }
        }
        Command::Help => return Reply::Help,
    }
    Reply::Ok
}
