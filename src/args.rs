use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use winbridge_commons::PathStrategy;
use winbridge_runner::{BridgeError, TextEncoding};

const EXAMPLES: &str = "\
Examples:
  winrun -- cmd.exe /c echo hello
  winrun --convert-paths -- cmd.exe /c type ./myfile.txt
  winrun --encoding cp1252 -- cmd.exe /c chcp
  winrun --interactive -- python.exe
  winrun --env MY_VAR=hello --tunnel-env -- cmd.exe /c echo %MY_VAR%
  winrun --concurrency 4 --timeout 30s -- powershell.exe -Command Get-Process";

/// Programs that get interactive mode automatically when stdin is a terminal.
const INTERACTIVE_PROGRAMS: &[&str] = &["python", "node", "mysql", "psql", "irb", "bash"];

/// Execute Windows binaries from WSL with path translation and env bridging.
#[derive(Debug, Parser)]
#[command(name = "winrun", version, after_help = EXAMPLES)]
pub struct Cli {
    /// Max concurrent executions (default: one per CPU)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Convert path-shaped arguments to Windows form
    #[arg(long)]
    pub convert_paths: bool,

    /// Output encoding: utf8, cp1252, utf16le, utf16be, auto
    #[arg(long, value_name = "ENC", value_parser = parse_encoding)]
    pub encoding: Option<TextEncoding>,

    /// Set an environment variable (repeatable)
    #[arg(long = "env", value_name = "KEY=VAL", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Publish --env variables to the Windows side through WSLENV
    #[arg(long)]
    pub tunnel_env: bool,

    /// Connect the command directly to this terminal instead of capturing output
    #[arg(long)]
    pub interactive: bool,

    /// Max execution time, e.g. 30s or 5m
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Path translation strategy: mount-table or wslpath
    #[arg(long, value_name = "STRATEGY", value_parser = parse_strategy)]
    pub path_strategy: Option<PathStrategy>,

    /// Configuration file (default: ./winbridge.toml, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Whether `command` looks like a REPL that wants the terminal.
    pub fn wants_terminal(&self) -> bool {
        let Some(program) = self.command.first() else {
            return false;
        };
        let program = program.to_ascii_lowercase();
        INTERACTIVE_PROGRAMS
            .iter()
            .any(|known| program.contains(known))
    }
}

fn parse_encoding(raw: &str) -> Result<TextEncoding, BridgeError> {
    raw.parse()
}

fn parse_strategy(raw: &str) -> Result<PathStrategy, String> {
    raw.parse()
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid env format {raw:?}, expected KEY=VAL")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags_and_trailing_command() {
        let cli = Cli::try_parse_from([
            "winrun",
            "--concurrency",
            "3",
            "--env",
            "A=1=2",
            "--env",
            "B=",
            "--timeout",
            "1m",
            "--encoding",
            "UTF-16LE",
            "--path-strategy",
            "wslpath",
            "--",
            "cmd.exe",
            "/c",
            "echo",
            "--not-a-flag",
        ])
        .unwrap();

        assert_eq!(cli.concurrency, Some(3));
        assert_eq!(
            cli.env,
            vec![
                ("A".to_string(), "1=2".to_string()),
                ("B".to_string(), String::new())
            ]
        );
        assert_eq!(cli.timeout, Some(Duration::from_secs(60)));
        assert_eq!(cli.encoding, Some(TextEncoding::Utf16Le));
        assert_eq!(cli.path_strategy, Some(PathStrategy::Wslpath));
        assert_eq!(cli.command, vec!["cmd.exe", "/c", "echo", "--not-a-flag"]);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(Cli::try_parse_from(["winrun", "--env", "NOEQUALS", "--", "x"]).is_err());
        assert!(Cli::try_parse_from(["winrun", "--env", "=v", "--", "x"]).is_err());
        assert!(Cli::try_parse_from(["winrun", "--encoding", "ebcdic", "--", "x"]).is_err());
        assert!(Cli::try_parse_from(["winrun", "--timeout", "soon", "--", "x"]).is_err());
        assert!(Cli::try_parse_from(["winrun"]).is_err());
    }

    #[test]
    fn detects_repl_like_programs() {
        let cli = Cli::try_parse_from(["winrun", "--", "Python.exe"]).unwrap();
        assert!(cli.wants_terminal());
        let cli = Cli::try_parse_from(["winrun", "--", "cmd.exe", "/c", "dir"]).unwrap();
        assert!(!cli.wants_terminal());
    }
}
