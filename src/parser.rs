use chrono::{DateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till1},
    character::complete::multispace1,
    combinator::{map, map_res},
    sequence::preceded,
    IResult,
};

use crate::error::InvalidTarget;
use crate::model::Timestamp;

/// A search target as written by the user.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Target {
    Now,
    At(Timestamp),
}

impl Target {
    /// Pins `Now` to the current instant.
    pub fn instant(self) -> Timestamp {
        match self {
            Target::Now => Utc::now(),
            Target::At(ts) => ts,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Find { target: Target },
    Stats,
    Help,
    Exit,
}

/// Accepts `now` (any case) or an RFC 3339 date-time.
pub fn parse_target(input: &str) -> Result<Target, InvalidTarget> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidTarget {
            input: input.to_string(),
            reason: "empty timestamp".to_string(),
        });
    }
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(Target::Now);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| Target::At(ts.with_timezone(&Utc)))
        .map_err(|e| InvalidTarget {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

// --- HELPERS ---

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_till1(char::is_whitespace)(input)
}

// --- COMMAND PARSERS ---

fn parse_find(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("FIND"), tag_ci("AT")))(input)?;
    let (input, target) = preceded(multispace1, map_res(token, parse_target))(input)?;
    Ok((input, Command::Find { target }))
}

fn parse_stats(input: &str) -> IResult<&str, Command> {
    map(alt((tag_ci("STATS"), tag_ci("CACHE"))), |_| Command::Stats)(input)
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_find,
        parse_stats,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context = if e.input.chars().count() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(format!("Invalid syntax near: '{}'", context))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
