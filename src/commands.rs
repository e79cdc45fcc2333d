// Operator commands
//
// One command per line on the console's stdin, e.g. `pan 50` or `zoom out`.

use crate::error::TelemetryError;
use crate::timeline::RecordingEdge;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Press and hold SET
    Set,
    /// Release SET
    Release,
    /// Abandon a held SET
    Cancel,
    Pause,
    Resume,
    /// Pan to an offset in samples back from the newest
    Pan(usize),
    Zoom(ZoomDirection),
    Sensitivity(f64),
    Smoothing(f64),
    Tone(f64),
    Record(RecordingEdge),
    Export(Option<PathBuf>),
    Status,
}

fn number(command: &str, arg: Option<&str>) -> Result<f64, TelemetryError> {
    let raw = arg.ok_or_else(|| TelemetryError::InvalidCommand(format!("{} needs a value", command)))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| TelemetryError::InvalidCommand(format!("{}: '{}' is not a number", command, raw)))?;
    if !value.is_finite() {
        return Err(TelemetryError::InvalidCommand(format!(
            "{}: value must be finite",
            command
        )));
    }
    Ok(value)
}

impl FromStr for OperatorCommand {
    type Err = TelemetryError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| TelemetryError::InvalidCommand("empty command".to_string()))?
            .to_ascii_lowercase();
        let arg = parts.next();

        let parsed = match command.as_str() {
            "set" => Self::Set,
            "release" => Self::Release,
            "cancel" => Self::Cancel,
            "pause" => Self::Pause,
            "resume" | "live" => Self::Resume,
            "pan" => {
                let raw = arg.ok_or_else(|| {
                    TelemetryError::InvalidCommand("pan needs an offset".to_string())
                })?;
                Self::Pan(raw.parse().map_err(|_| {
                    TelemetryError::InvalidCommand(format!("pan: '{}' is not an offset", raw))
                })?)
            }
            "zoom" => match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("in") | Some("+") => Self::Zoom(ZoomDirection::In),
                Some("out") | Some("-") => Self::Zoom(ZoomDirection::Out),
                _ => {
                    return Err(TelemetryError::InvalidCommand(
                        "zoom takes 'in' or 'out'".to_string(),
                    ))
                }
            },
            "sensitivity" | "sens" => Self::Sensitivity(number("sensitivity", arg)?),
            "smoothing" => Self::Smoothing(number("smoothing", arg)?),
            "tone" => Self::Tone(number("tone", arg)?),
            "record" => match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("start") => Self::Record(RecordingEdge::Start),
                Some("stop") | Some("end") => Self::Record(RecordingEdge::End),
                _ => {
                    return Err(TelemetryError::InvalidCommand(
                        "record takes 'start' or 'stop'".to_string(),
                    ))
                }
            },
            "export" => Self::Export(arg.map(PathBuf::from)),
            "status" => Self::Status,
            other => {
                return Err(TelemetryError::InvalidCommand(format!(
                    "unknown command '{}'",
                    other
                )))
            }
        };

        if let Some(extra) = parts.next() {
            return Err(TelemetryError::InvalidCommand(format!(
                "unexpected argument '{}'",
                extra
            )));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("set".parse::<OperatorCommand>().unwrap(), OperatorCommand::Set);
        assert_eq!("  PAUSE ".parse::<OperatorCommand>().unwrap(), OperatorCommand::Pause);
        assert_eq!("live".parse::<OperatorCommand>().unwrap(), OperatorCommand::Resume);
        assert_eq!("status".parse::<OperatorCommand>().unwrap(), OperatorCommand::Status);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!("pan 50".parse::<OperatorCommand>().unwrap(), OperatorCommand::Pan(50));
        assert_eq!(
            "zoom out".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Zoom(ZoomDirection::Out)
        );
        assert_eq!(
            "sensitivity 12.5".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Sensitivity(12.5)
        );
        assert_eq!(
            "record stop".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Record(RecordingEdge::End)
        );
        assert_eq!(
            "export /tmp/a.json".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Export(Some(PathBuf::from("/tmp/a.json")))
        );
        assert_eq!("export".parse::<OperatorCommand>().unwrap(), OperatorCommand::Export(None));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "fly", "pan", "pan -3", "zoom sideways", "tone loud", "tone NaN", "set now"] {
            assert!(
                matches!(bad.parse::<OperatorCommand>(), Err(TelemetryError::InvalidCommand(_))),
                "expected error for {:?}",
                bad
            );
        }
    }
}
