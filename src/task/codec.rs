//! Compact Task Descriptor Codec
//!
//! ```text
//! task := [owner '|'] body
//! body := start ',' end ',' step
//!       | "RANGE" '.' var '.' '{' start ',' end ',' step '}'
//!       | "SET"   '.' var '.' '{' int (',' int)* '}'
//! ```
//!
//! The bare `start,end,step` shorthand binds the default iteration variable `i`.

use super::types::Task;
use crate::error::{Result, WorkerError};

pub const DEFAULT_ITER_VAR: &str = "i";

const RANGE_TAG: &str = "RANGE";
const SET_TAG: &str = "SET";
const OWNER_DELIM: char = '|';

pub struct TaskCodec;

impl TaskCodec {
    /// Decodes a serialized task. Any syntax or value error is a decode failure.
    pub fn parse(input: &str) -> Result<Task> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(malformed(input, "empty task descriptor"));
        }

        let (owner, body) = match trimmed.split_once(OWNER_DELIM) {
            Some((owner, body)) => {
                let owner = owner.trim();
                if owner.is_empty() {
                    return Err(malformed(input, "empty task owner"));
                }
                (Some(owner), body.trim())
            }
            None => (None, trimmed),
        };

        let task = if body.starts_with(RANGE_TAG) || body.starts_with(SET_TAG) {
            parse_tagged(input, body)?
        } else {
            let values = parse_list(input, body)?;
            match values.as_slice() {
                [start, end, step] => range(input, DEFAULT_ITER_VAR, *start, *end, *step)?,
                _ => return Err(malformed(input, "expected start,end,step")),
            }
        };

        Ok(match owner {
            Some(owner) => task.with_owner(owner),
            None => task,
        })
    }

    pub fn encode(task: &Task) -> String {
        task.to_compact_string()
    }
}

fn parse_tagged(input: &str, body: &str) -> Result<Task> {
    let (tag, rest) = body
        .split_once('.')
        .ok_or_else(|| malformed(input, "missing iteration variable"))?;
    let (iter_var, list) = rest
        .split_once('.')
        .ok_or_else(|| malformed(input, "missing iteration list"))?;

    if !is_identifier(iter_var) {
        return Err(malformed(
            input,
            &format!("invalid iteration variable '{}'", iter_var),
        ));
    }

    let inner = list
        .strip_prefix('{')
        .and_then(|l| l.strip_suffix('}'))
        .ok_or_else(|| malformed(input, "iteration list must be enclosed in braces"))?;
    let values = parse_list(input, inner)?;

    match tag {
        RANGE_TAG => match values.as_slice() {
            [start, end, step] => range(input, iter_var, *start, *end, *step),
            _ => Err(malformed(input, "range needs exactly start,end,step")),
        },
        SET_TAG => Task::set(iter_var, values).map_err(|_| malformed(input, "empty iteration set")),
        other => Err(malformed(input, &format!("unknown task kind '{}'", other))),
    }
}

fn range(input: &str, iter_var: &str, start: i64, end: i64, step: i64) -> Result<Task> {
    Task::range(iter_var, start, end, step).map_err(|_| malformed(input, "range step must not be zero"))
}

fn parse_list(input: &str, list: &str) -> Result<Vec<i64>> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| malformed(input, &format!("'{}' is not an integer", v.trim())))
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn malformed(input: &str, reason: &str) -> WorkerError {
    WorkerError::Decode {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
