//! Run-command codec and the full command set.
//!
//! Wire format of a run: seven comma-separated integers in the order
//! initial-fire, initial-skip, steps, step-fire, step-skip, pre-throw-skip,
//! throw, e.g. `-1,500,30,55,55,0,400`. Only the first field may be `-1`.

use std::fmt;

use super::params::{TrialParameters, FIELD_COUNT, MAX_FIELD_VALUE};
use super::{Malformation, MalformedCommand};

/// Wire encoding of one [`TrialParameters`] (without the `r ` prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(String);

impl CommandFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes parameters as a single comma-separated line.
pub fn encode(params: &TrialParameters) -> CommandFrame {
    let initial_fire = params
        .initial_fire_ms()
        .map(i64::from)
        .unwrap_or(-1);
    CommandFrame(format!(
        "{},{},{},{},{},{},{}",
        initial_fire,
        params.initial_skip_ms(),
        params.num_steps(),
        params.step_fire_ms(),
        params.step_skip_ms(),
        params.pre_throw_skip_ms(),
        params.throw_ms()
    ))
}

/// Decodes a comma-separated line back into parameters.
///
/// Strict inverse of [`encode`]. Fails when the field count is not seven,
/// when a field is not an integer, or when a value is outside the protocol's
/// range.
pub fn decode(line: &str) -> Result<TrialParameters, MalformedCommand> {
    let line = line.trim();
    let got = line.split(',').count();
    if got != FIELD_COUNT {
        return Err(Malformation::FieldCount {
            expected: FIELD_COUNT,
            got,
        }
        .into());
    }

    let mut values = [0i64; FIELD_COUNT];
    for (idx, field) in line.split(',').enumerate() {
        values[idx] = field
            .trim()
            .parse::<i64>()
            .map_err(|_| Malformation::NotNumeric { field: idx + 1 })?;
    }

    let initial_fire = match values[0] {
        -1 => None,
        value => Some(to_field(1, value)?),
    };

    TrialParameters::new(
        initial_fire,
        to_field(2, values[1])?,
        to_field(3, values[2])?,
        to_field(4, values[3])?,
        to_field(5, values[4])?,
        to_field(6, values[5])?,
        to_field(7, values[6])?,
    )
}

fn to_field(field: usize, value: i64) -> Result<u32, MalformedCommand> {
    if !(0..=i64::from(MAX_FIELD_VALUE)).contains(&value) {
        return Err(Malformation::OutOfRange { field, value }.into());
    }
    Ok(value as u32)
}

/// Joystick directions for single-step nudges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Primitives available while no run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAction {
    Nudge(Direction),
    Fire,
}

/// Everything the host can ask the firmware to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Manual(ManualAction),
    Run(TrialParameters),
}

impl Command {
    /// Parses one received line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, MalformedCommand> {
        let line = line.trim();
        let action = match line {
            "w" => ManualAction::Nudge(Direction::Up),
            "s" => ManualAction::Nudge(Direction::Down),
            "a" => ManualAction::Nudge(Direction::Left),
            "d" => ManualAction::Nudge(Direction::Right),
            "f" => ManualAction::Fire,
            _ => {
                return match line.strip_prefix("r ") {
                    Some(csv) => decode(csv).map(Command::Run),
                    None => Err(Malformation::UnknownCommand.into()),
                };
            }
        };
        Ok(Command::Manual(action))
    }

    /// Serializes the command as a newline-terminated line.
    pub fn to_line(&self) -> String {
        let body = match self {
            Command::Manual(ManualAction::Nudge(Direction::Up)) => "w".to_string(),
            Command::Manual(ManualAction::Nudge(Direction::Down)) => "s".to_string(),
            Command::Manual(ManualAction::Nudge(Direction::Left)) => "a".to_string(),
            Command::Manual(ManualAction::Nudge(Direction::Right)) => "d".to_string(),
            Command::Manual(ManualAction::Fire) => "f".to_string(),
            Command::Run(params) => format!("r {}", encode(params)),
        };
        format!("{}\n", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_reference_run() {
        let params = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        assert_eq!(encode(&params).as_str(), "-1,500,30,55,55,0,400");
    }

    #[test]
    fn test_decode_reference_run() {
        let params = decode("-1,500,30,55,55,0,400").unwrap();
        assert_eq!(params.initial_fire_ms(), None);
        assert_eq!(params.initial_skip_ms(), 500);
        assert_eq!(params.num_steps(), 30);
        assert_eq!(params.step_fire_ms(), 55);
        assert_eq!(params.step_skip_ms(), 55);
        assert_eq!(params.pre_throw_skip_ms(), 0);
        assert_eq!(params.throw_ms(), 400);
    }

    #[test]
    fn test_decode_too_few_fields() {
        assert_eq!(
            decode("1,2,3").unwrap_err(),
            MalformedCommand(Malformation::FieldCount { expected: 7, got: 3 })
        );
    }

    #[test]
    fn test_decode_too_many_fields() {
        assert_eq!(
            decode("1,2,3,4,5,6,7,8").unwrap_err(),
            MalformedCommand(Malformation::FieldCount { expected: 7, got: 8 })
        );
    }

    #[test]
    fn test_decode_non_numeric_field() {
        assert_eq!(
            decode("-1,500,x,55,55,0,400").unwrap_err(),
            MalformedCommand(Malformation::NotNumeric { field: 3 })
        );
        assert_eq!(
            decode("-1,500,30,55,,0,400").unwrap_err(),
            MalformedCommand(Malformation::NotNumeric { field: 5 })
        );
    }

    #[test]
    fn test_sentinel_only_in_first_field() {
        assert_eq!(
            decode("-1,-1,30,55,55,0,400").unwrap_err(),
            MalformedCommand(Malformation::OutOfRange { field: 2, value: -1 })
        );
        assert!(decode("-2,0,30,55,55,0,400").is_err());
    }

    #[test]
    fn test_decode_tolerates_whitespace() {
        let params = decode(" -1, 500,30 ,55,55,0,400\r").unwrap();
        assert_eq!(params.num_steps(), 30);
    }

    #[test]
    fn test_parse_manual_commands() {
        assert_eq!(
            Command::parse("w").unwrap(),
            Command::Manual(ManualAction::Nudge(Direction::Up))
        );
        assert_eq!(
            Command::parse("d").unwrap(),
            Command::Manual(ManualAction::Nudge(Direction::Right))
        );
        assert_eq!(
            Command::parse("f\r").unwrap(),
            Command::Manual(ManualAction::Fire)
        );
    }

    #[test]
    fn test_parse_run_command() {
        let cmd = Command::parse("r -1,500,30,55,55,0,400").unwrap();
        let expected = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        assert_eq!(cmd, Command::Run(expected));
        assert_eq!(cmd.to_line(), "r -1,500,30,55,55,0,400\n");
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("x").unwrap_err(),
            MalformedCommand(Malformation::UnknownCommand)
        );
        assert_eq!(
            Command::parse("run").unwrap_err(),
            MalformedCommand(Malformation::UnknownCommand)
        );
    }

    fn valid_params() -> impl Strategy<Value = TrialParameters> {
        let max = MAX_FIELD_VALUE;
        (
            proptest::option::of(0..=max),
            0..=max,
            1..=max,
            1..=max,
            0..=max,
            0..=max,
            1..=max,
        )
            .prop_map(|(fi, si, steps, fr, sr, st, lt)| {
                TrialParameters::new(fi, si, steps, fr, sr, st, lt).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(params in valid_params()) {
            let frame = encode(&params);
            prop_assert_eq!(decode(frame.as_str()).unwrap(), params);
        }

        #[test]
        fn prop_run_command_line_parses_back(params in valid_params()) {
            let line = Command::Run(params).to_line();
            prop_assert!(line.len() <= crate::protocol::MAX_COMMAND_LEN + 1);
            prop_assert_eq!(Command::parse(line.trim_end()).unwrap(), Command::Run(params));
        }
    }
}
