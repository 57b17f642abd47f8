//! Operator commands read from the console's standard input.

use crate::dispatcher::CloseSide;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid argument {arg}: {reason}")]
    InvalidArgument { arg: String, reason: String },
}

/// One operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    /// Status line, progress and link state.
    Status,
    Positions,
    /// Latest `n` log entries.
    Log(usize),
    Settings,
    Metrics,
    /// Pull the position list again.
    Refresh,
    /// Pull settings again, dropping unsaved edits.
    Reload,
    /// Re-create the engine link.
    Reconnect,
    Select(String),
    Deselect(String),
    Toggle(String),
    ClearSelection,
    Open,
    SyncSltp,
    Close { full_symbol: String, ratio: Decimal },
    CloseSide { side: CloseSide, ratio: Decimal },
    CloseSelected { ratio: Decimal },
    Stop,
    /// Edit one settings field; the value is JSON, bare words are strings.
    Set { key: String, value: Value },
    /// Replace the long and short coin lists.
    Coins { long: Vec<String>, short: Vec<String> },
    /// Save settings immediately instead of waiting for the debounce.
    Save,
    Quit,
}

/// Help text listing every command.
pub const HELP: &str = "\
status                         status line, progress and link
positions                      open positions and totals
log [n]                        latest log entries (default 20)
settings                       current settings snapshot
metrics                        prometheus metrics
refresh                        reload positions
reload                         reload settings from the engine
reconnect                      re-create the engine link
select|deselect|toggle <sym>   edit the selection
clear                          clear the selection
open                           open positions from settings
sync                           re-place SL/TP orders
close <sym> [ratio]            close one position
close-side <long|short|all> [ratio]
close-selected [ratio]         close the selection
stop                           stop the running task
set <field> <value>            edit a setting (JSON value)
coins <long,...> <short,...>   replace coin lists (- for empty)
save                           save settings now
quit";

const DEFAULT_LOG_LINES: usize = 20;

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Usage("help"));
        };
        let args: Vec<&str> = words.collect();

        let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("help" | "?", []) => Self::Help,
            ("status", []) => Self::Status,
            ("positions" | "pos", []) => Self::Positions,
            ("log", []) => Self::Log(DEFAULT_LOG_LINES),
            ("log", [n]) => Self::Log(parse_arg(n)?),
            ("settings", []) => Self::Settings,
            ("metrics", []) => Self::Metrics,
            ("refresh", []) => Self::Refresh,
            ("reload", []) => Self::Reload,
            ("reconnect", []) => Self::Reconnect,
            ("select", [sym]) => Self::Select(sym.to_string()),
            ("deselect", [sym]) => Self::Deselect(sym.to_string()),
            ("toggle", [sym]) => Self::Toggle(sym.to_string()),
            ("clear", []) => Self::ClearSelection,
            ("open", []) => Self::Open,
            ("sync", []) => Self::SyncSltp,
            ("close", [sym]) => Self::Close {
                full_symbol: sym.to_string(),
                ratio: Decimal::ONE,
            },
            ("close", [sym, ratio]) => Self::Close {
                full_symbol: sym.to_string(),
                ratio: parse_arg(ratio)?,
            },
            ("close", _) => return Err(CommandError::Usage("close <sym> [ratio]")),
            ("close-side", [side]) => Self::CloseSide {
                side: parse_arg(side)?,
                ratio: Decimal::ONE,
            },
            ("close-side", [side, ratio]) => Self::CloseSide {
                side: parse_arg(side)?,
                ratio: parse_arg(ratio)?,
            },
            ("close-side", _) => {
                return Err(CommandError::Usage("close-side <long|short|all> [ratio]"))
            }
            ("close-selected", []) => Self::CloseSelected {
                ratio: Decimal::ONE,
            },
            ("close-selected", [ratio]) => Self::CloseSelected {
                ratio: parse_arg(ratio)?,
            },
            ("stop", []) => Self::Stop,
            ("set", [key, rest @ ..]) if !rest.is_empty() => Self::Set {
                key: key.to_string(),
                value: parse_value(&rest.join(" ")),
            },
            ("set", _) => return Err(CommandError::Usage("set <field> <value>")),
            ("coins", [long, short]) => Self::Coins {
                long: parse_list(long),
                short: parse_list(short),
            },
            ("coins", _) => return Err(CommandError::Usage("coins <long,...> <short,...>")),
            ("save", []) => Self::Save,
            ("quit" | "exit", []) => Self::Quit,
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn parse_arg<T>(arg: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    arg.parse().map_err(|e: T::Err| CommandError::InvalidArgument {
        arg: arg.to_string(),
        reason: e.to_string(),
    })
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_list(raw: &str) -> Vec<String> {
    if raw == "-" {
        return Vec::new();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_simple_commands() {
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("  STOP ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("log".parse::<Command>().unwrap(), Command::Log(20));
        assert_eq!("log 5".parse::<Command>().unwrap(), Command::Log(5));
    }

    #[test]
    fn test_close_commands() {
        assert_eq!(
            "close BTC/USDT:USDT".parse::<Command>().unwrap(),
            Command::Close {
                full_symbol: "BTC/USDT:USDT".to_string(),
                ratio: dec!(1),
            }
        );
        assert_eq!(
            "close-side short 0.25".parse::<Command>().unwrap(),
            Command::CloseSide {
                side: CloseSide::Short,
                ratio: dec!(0.25),
            }
        );
        assert!(matches!(
            "close-side sideways".parse::<Command>(),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "close".parse::<Command>(),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn test_set_parses_json_or_string() {
        assert_eq!(
            "set leverage 15".parse::<Command>().unwrap(),
            Command::Set {
                key: "leverage".to_string(),
                value: json!(15),
            }
        );
        assert_eq!(
            "set rebalance_method momentum first".parse::<Command>().unwrap(),
            Command::Set {
                key: "rebalance_method".to_string(),
                value: json!("momentum first"),
            }
        );
        assert_eq!(
            r#"set long_custom_weights {"BTC": 2}"#.parse::<Command>().unwrap(),
            Command::Set {
                key: "long_custom_weights".to_string(),
                value: json!({"BTC": 2}),
            }
        );
    }

    #[test]
    fn test_coin_lists() {
        assert_eq!(
            "coins btc,eth -".parse::<Command>().unwrap(),
            Command::Coins {
                long: vec!["BTC".to_string(), "ETH".to_string()],
                short: vec![],
            }
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            "launch".parse::<Command>(),
            Err(CommandError::Unknown("launch".to_string()))
        );
    }
}
