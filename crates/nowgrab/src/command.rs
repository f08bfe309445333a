//! Operator commands: single-line textual input.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// `q`: stop the coordinator and flush the session log.
    Quit,
    /// `s`: drop the current item without fetching and advance.
    Skip,
    /// `p`: drop the most recently queued item.
    DiscardNewest,
    /// A 1-based index into the current candidate list.
    Select(usize),
    /// Anything else while an item is current: fetch this id directly.
    FetchId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("{index} is out of range (no results to choose from)")]
    NoCandidates { index: i64 },
    #[error("{index} is out of range (1-{available})")]
    OutOfRange { index: i64, available: usize },
    #[error("command could not be executed: {0} (nothing is waiting to be fetched)")]
    NoCurrentItem(String),
}

/// Parse one line of operator input.
///
/// `candidates` is the size of the live candidate list, `None` when there is
/// none. Numeric input is only ever an index; it is never taken as an id.
pub fn parse(
    input: &str,
    candidates: Option<usize>,
    has_current: bool,
) -> Result<OperatorCommand, CommandError> {
    let input = input.trim();
    match input {
        "" => return Err(CommandError::Empty),
        "q" => return Ok(OperatorCommand::Quit),
        "s" => return Ok(OperatorCommand::Skip),
        "p" => return Ok(OperatorCommand::DiscardNewest),
        _ => {}
    }

    if let Ok(index) = input.parse::<i64>() {
        return match candidates {
            None => Err(CommandError::NoCandidates { index }),
            Some(available) if index >= 1 && index as usize <= available => {
                Ok(OperatorCommand::Select(index as usize))
            }
            Some(available) => Err(CommandError::OutOfRange { index, available }),
        };
    }

    if !has_current {
        return Err(CommandError::NoCurrentItem(input.to_string()));
    }
    Ok(OperatorCommand::FetchId(input.to_string()))
}
