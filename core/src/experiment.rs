use std::{env, str::FromStr};

use anyhow::{anyhow, Error, Result};

/// How much of the training budget a run spends.
///
/// `Full` reproduces the configured schedule, `Test` trims it down to a quick
/// smoke run whose final metrics can be pinned in a benchmark snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExperimentMode {
    Full,
    Test,
}

impl FromStr for ExperimentMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "full" => Ok(Self::Full),
            "test" => Ok(Self::Test),
            other => Err(anyhow!("invalid mode: {other} (expected full or test)")),
        }
    }
}

impl ExperimentMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Test => "test",
        }
    }

    pub fn select<T>(&self, full: T, test: T) -> T {
        match self {
            Self::Full => full,
            Self::Test => test,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExperimentModeArgs {
    mode: ExperimentMode,
    help_requested: bool,
}

impl ExperimentModeArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut mode = ExperimentMode::Full;
        let mut help_requested = false;
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--mode" | "-m" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow!("expected value after {arg}"))?;
                    mode = value.parse()?;
                }
                "--help" | "-h" => help_requested = true,
                other => match other.strip_prefix("--mode=") {
                    Some(value) => mode = value.parse()?,
                    None => return Err(anyhow!("unexpected argument: {other}")),
                },
            }
        }

        Ok(Self {
            mode,
            help_requested,
        })
    }

    pub fn help_requested(&self) -> bool {
        self.help_requested
    }

    pub fn mode(&self) -> ExperimentMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ExperimentModeArgs> {
        ExperimentModeArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn defaults_to_full_mode() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.mode(), ExperimentMode::Full);
        assert!(!args.help_requested());
    }

    #[test]
    fn accepts_every_mode_spelling() {
        assert_eq!(parse(&["--mode", "test"]).unwrap().mode(), ExperimentMode::Test);
        assert_eq!(parse(&["-m", "test"]).unwrap().mode(), ExperimentMode::Test);
        assert_eq!(parse(&["--mode=full"]).unwrap().mode(), ExperimentMode::Full);
    }

    #[test]
    fn rejects_unknown_values_and_flags() {
        assert!(parse(&["--mode", "fast"]).is_err());
        assert!(parse(&["--mode"]).is_err());
        assert!(parse(&["--epochs", "3"]).is_err());
    }

    #[test]
    fn select_follows_mode() {
        assert_eq!(ExperimentMode::Full.select(200, 2), 200);
        assert_eq!(ExperimentMode::Test.select(200, 2), 2);
        assert!(parse(&["-h"]).unwrap().help_requested());
    }
}
