use std::fmt;

use bringup_core::reset::ResetCode;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{delimited, eof, separated, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::board::FaultTarget;

/// Reset the simulated board comes up with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootKind {
    PowerOn,
    Software,
    Brownout,
    DeepSleep,
    Other,
}

impl BootKind {
    const ALL: [BootKind; 5] = [
        BootKind::PowerOn,
        BootKind::Software,
        BootKind::Brownout,
        BootKind::DeepSleep,
        BootKind::Other,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            BootKind::PowerOn => "power-on",
            BootKind::Software => "software",
            BootKind::Brownout => "brownout",
            BootKind::DeepSleep => "deep-sleep",
            BootKind::Other => "other",
        }
    }

    /// Raw code latched in the reset register for this kind of boot.
    pub const fn reset_code(self) -> ResetCode {
        match self {
            BootKind::PowerOn => ResetCode::POWER_ON,
            BootKind::Software => ResetCode::SOFTWARE_CPU,
            BootKind::Brownout => ResetCode::BROWNOUT,
            BootKind::DeepSleep => ResetCode::DEEP_SLEEP,
            BootKind::Other => ResetCode::TIMER_GROUP0_WATCHDOG,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(tag))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HealTarget {
    One(FaultTarget),
    All,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Boot(BootKind),
    Fail(FaultTarget),
    Heal(HealTarget),
    PowerLoss,
    Tick(u32),
    Status,
    Help(Option<String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandError {
    Syntax { offset: usize },
    UnknownCommand(String),
    MissingArgument { command: &'static str, expected: &'static str },
    InvalidArgument { command: &'static str, value: String },
    UnexpectedArgument(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax { offset } => write!(f, "syntax error at column {}", offset + 1),
            CommandError::UnknownCommand(name) => write!(f, "unknown command `{name}`"),
            CommandError::MissingArgument { command, expected } => {
                write!(f, "`{command}` expects {expected}")
            }
            CommandError::InvalidArgument { command, value } => {
                write!(f, "`{command}` does not accept `{value}`")
            }
            CommandError::UnexpectedArgument(value) => write!(f, "unexpected argument `{value}`"),
        }
    }
}

const BOOT_ARGS: &str = "one of power-on, software, brownout, deep-sleep, other";
const FAULT_ARGS: &str = "one of storage, client, ap, time, config, collaborators, power, runtime";

fn word<'a>(input: &mut &'a str) -> Result<&'a str, ContextError> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_').parse_next(input)
}

fn words<'a>(input: &mut &'a str) -> Result<Vec<&'a str>, ContextError> {
    delimited(space0, separated(1.., word, space1), terminated(space0, eof)).parse_next(input)
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let tokens = words
        .parse(line)
        .map_err(|err| CommandError::Syntax {
            offset: err.offset(),
        })?;
    let (verb, args) = tokens
        .split_first()
        .ok_or(CommandError::Syntax { offset: 0 })?;

    let verb = verb.to_ascii_lowercase();
    let command = match verb.as_str() {
        "boot" => {
            let tag = required(args, "boot", BOOT_ARGS)?;
            BootKind::from_tag(tag)
                .map(Command::Boot)
                .ok_or_else(|| invalid("boot", tag))?
        }
        "fail" => {
            let tag = required(args, "fail", FAULT_ARGS)?;
            FaultTarget::from_tag(tag)
                .map(Command::Fail)
                .ok_or_else(|| invalid("fail", tag))?
        }
        "heal" => {
            let tag = required(args, "heal", "a fault target or `all`")?;
            if tag.eq_ignore_ascii_case("all") {
                Command::Heal(HealTarget::All)
            } else {
                FaultTarget::from_tag(tag)
                    .map(|target| Command::Heal(HealTarget::One(target)))
                    .ok_or_else(|| invalid("heal", tag))?
            }
        }
        "power-loss" => Command::PowerLoss,
        "tick" => match args.first() {
            Some(count) => Command::Tick(tick_count(count)?),
            None => Command::Tick(1),
        },
        "status" => Command::Status,
        "help" => Command::Help(args.first().map(|topic| topic.to_ascii_lowercase())),
        _ => return Err(CommandError::UnknownCommand(verb)),
    };

    let allowed = match command {
        Command::PowerLoss | Command::Status => 0,
        _ => 1,
    };
    match args.get(allowed) {
        Some(extra) => Err(CommandError::UnexpectedArgument((*extra).to_owned())),
        None => Ok(command),
    }
}

fn required<'a>(
    args: &[&'a str],
    command: &'static str,
    expected: &'static str,
) -> Result<&'a str, CommandError> {
    args.first()
        .copied()
        .ok_or(CommandError::MissingArgument { command, expected })
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        command,
        value: value.to_owned(),
    }
}

fn tick_count(value: &str) -> Result<u32, CommandError> {
    dec_uint::<_, u32, ContextError>
        .parse(value)
        .ok()
        .filter(|count| *count > 0)
        .ok_or_else(|| invalid("tick", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_boot_kind() {
        for kind in BootKind::ALL {
            let line = format!("boot {}", kind.tag());
            assert_eq!(parse(&line), Ok(Command::Boot(kind)));
        }
        assert_eq!(parse("  BOOT   Brownout "), Ok(Command::Boot(BootKind::Brownout)));
    }

    #[test]
    fn brownout_latches_the_brownout_code() {
        assert_eq!(BootKind::Brownout.reset_code(), ResetCode::BROWNOUT);
        assert_eq!(BootKind::Software.reset_code(), ResetCode(12));
    }

    #[test]
    fn fault_commands() {
        assert_eq!(parse("fail ap"), Ok(Command::Fail(FaultTarget::AccessPoint)));
        assert_eq!(parse("heal all"), Ok(Command::Heal(HealTarget::All)));
        assert_eq!(
            parse("heal storage"),
            Ok(Command::Heal(HealTarget::One(FaultTarget::Storage)))
        );
        assert_eq!(
            parse("fail radio"),
            Err(CommandError::InvalidArgument {
                command: "fail",
                value: "radio".to_owned()
            })
        );
    }

    #[test]
    fn tick_defaults_to_one() {
        assert_eq!(parse("tick"), Ok(Command::Tick(1)));
        assert_eq!(parse("tick 5"), Ok(Command::Tick(5)));
        assert!(matches!(parse("tick 0"), Err(CommandError::InvalidArgument { .. })));
        assert!(matches!(parse("tick soon"), Err(CommandError::InvalidArgument { .. })));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            parse("boot"),
            Err(CommandError::MissingArgument {
                command: "boot",
                expected: BOOT_ARGS
            })
        );
        assert_eq!(
            parse("status now"),
            Err(CommandError::UnexpectedArgument("now".to_owned()))
        );
        assert_eq!(
            parse("reboot"),
            Err(CommandError::UnknownCommand("reboot".to_owned()))
        );
        assert!(matches!(parse("boot power-on!"), Err(CommandError::Syntax { .. })));
    }

    #[test]
    fn help_topic_is_optional() {
        assert_eq!(parse("help"), Ok(Command::Help(None)));
        assert_eq!(parse("help Tick"), Ok(Command::Help(Some("tick".to_owned()))));
    }
}
