//! Script commands.
//!
//! One command per line, verb first:
//!
//! ```text
//! # comment
//! enable <type> <name>
//! disable <type> <name>
//! dieHorribly <seconds>
//! sleep <seconds>
//! ```

use std::fmt;

use crate::error::SimError;
use crate::registry::Device;

/// Lines starting with this are comments.
pub const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable(Device),
    Disable(Device),
    /// Go silent for this many seconds, then re-announce.
    DieHorribly(u64),
    /// Idle for this many one-second heartbeat ticks.
    Sleep(u64),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Enable(device) => write!(f, "enable {}", device),
            Command::Disable(device) => write!(f, "disable {}", device),
            Command::DieHorribly(seconds) => write!(f, "dieHorribly {}", seconds),
            Command::Sleep(seconds) => write!(f, "sleep {}", seconds),
        }
    }
}

/// Parses one script line. Comments and blank lines yield `Ok(None)`.
///
/// Blank lines are skipped like comments, so they get no trailing
/// heartbeat. The FREEDM Python controller treated them as commands and
/// still sent one.
///
/// `number` is 1-based and only used in error messages.
pub fn parse_line(number: usize, line: &str) -> Result<Option<Command>, SimError> {
    if line.starts_with(COMMENT_MARKER) || line.trim().is_empty() {
        return Ok(None);
    }

    let syntax = |reason: String| SimError::Script {
        line: number,
        reason,
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let command = match tokens.as_slice() {
        ["enable", kind, name] => Command::Enable(Device::new(*kind, *name)),
        ["disable", kind, name] => Command::Disable(Device::new(*kind, *name)),
        ["enable" | "disable", ..] => {
            return Err(syntax(format!("expected `{} <type> <name>`", tokens[0])))
        }
        ["dieHorribly", seconds] => {
            let seconds = parse_duration(seconds).map_err(&syntax)?;
            Command::DieHorribly(non_negative(seconds, "die")?)
        }
        ["sleep", seconds] => {
            let seconds = parse_duration(seconds).map_err(&syntax)?;
            Command::Sleep(non_negative(seconds, "sleep")?)
        }
        ["dieHorribly" | "sleep", ..] => {
            return Err(syntax(format!("expected `{} <seconds>`", tokens[0])))
        }
        [verb, ..] => return Err(syntax(format!("unknown command {:?}", verb))),
        [] => return Ok(None),
    };
    Ok(Some(command))
}

fn parse_duration(token: &str) -> Result<i64, String> {
    token
        .parse::<i64>()
        .map_err(|_| format!("expected a whole number of seconds, found {:?}", token))
}

fn non_negative(seconds: i64, verb: &str) -> Result<u64, SimError> {
    u64::try_from(seconds).map_err(|_| {
        SimError::InvalidArgument(format!("it's nonsense to {} for {}s", verb, seconds))
    })
}
