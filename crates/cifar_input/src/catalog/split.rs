//! Split names and slice specifiers.
//!
//! ```text
//! train            → the whole train split
//! train[:95%]      → first 95%
//! train[95%:]      → everything after the first 95%
//! test[10%:20%]    → a window
//! train[:1000]     → absolute boundaries work too
//! ```
//!
//! Percent boundaries resolve to `round(pct * n / 100)` with ties to even,
//! so `train[:x%]` and `train[x%:]` always partition the split.

use crate::error::ConfigError;
use anyhow::{ensure, Result};
use serde::Deserialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// The nominal split a caller asks a pipeline for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    /// Carved from the tail of the train split.
    Validation,
}

impl Split {
    pub fn is_train(self) -> bool {
        self == Self::Train
    }
}

impl FromStr for Split {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            "validation" | "valid" => Ok(Self::Validation),
            _ => Err(ConfigError::InvalidSplit(s.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Validation => "validation",
        })
    }
}

/// A split that physically exists in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseSplit {
    Train,
    Test,
}

impl BaseSplit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

/// One side of a split slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Percent(u32),
    Absolute(usize),
}

impl Boundary {
    fn resolve(self, num_examples: usize) -> usize {
        match self {
            Self::Percent(pct) => {
                let exact = pct as f64 * num_examples as f64 / 100.0;
                (exact.round_ties_even() as usize).min(num_examples)
            }
            Self::Absolute(n) => n.min(num_examples),
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(pct) => write!(f, "{}%", pct),
            Self::Absolute(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Boundary {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSplit(s.to_string());
        match s.strip_suffix('%') {
            Some(pct) => {
                let pct: u32 = pct.trim().parse().map_err(|_| invalid())?;
                if pct > 100 {
                    return Err(invalid());
                }
                Ok(Self::Percent(pct))
            }
            None => s.trim().parse().map(Self::Absolute).map_err(|_| invalid()),
        }
    }
}

/// A base split with an optional `[from:to]` slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSpec {
    pub base: BaseSplit,
    pub from: Option<Boundary>,
    pub to: Option<Boundary>,
}

impl SplitSpec {
    pub fn full(base: BaseSplit) -> Self {
        Self {
            base,
            from: None,
            to: None,
        }
    }

    /// `base[:pct%]`
    pub fn head_percent(base: BaseSplit, pct: u32) -> Self {
        Self {
            base,
            from: None,
            to: Some(Boundary::Percent(pct)),
        }
    }

    /// `base[pct%:]`
    pub fn tail_percent(base: BaseSplit, pct: u32) -> Self {
        Self {
            base,
            from: Some(Boundary::Percent(pct)),
            to: None,
        }
    }

    /// Example range this spec selects from a base split of `num_examples`.
    pub fn resolve(&self, num_examples: usize) -> Result<Range<usize>> {
        let start = self.from.map_or(0, |b| b.resolve(num_examples));
        let end = self.to.map_or(num_examples, |b| b.resolve(num_examples));
        ensure!(
            start <= end,
            "Split '{}' selects an empty, inverted range {}..{}",
            self,
            start,
            end
        );
        Ok(start..end)
    }
}

impl fmt::Display for SplitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())?;
        if self.from.is_none() && self.to.is_none() {
            return Ok(());
        }
        f.write_str("[")?;
        if let Some(from) = self.from {
            write!(f, "{}", from)?;
        }
        f.write_str(":")?;
        if let Some(to) = self.to {
            write!(f, "{}", to)?;
        }
        f.write_str("]")
    }
}

impl FromStr for SplitSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSplit(s.to_string());
        let s = s.trim();
        let (name, slice) = match s.split_once('[') {
            Some((name, rest)) => (name, Some(rest.strip_suffix(']').ok_or_else(invalid)?)),
            None => (s, None),
        };
        let base = match name {
            "train" => BaseSplit::Train,
            "test" => BaseSplit::Test,
            _ => return Err(invalid()),
        };

        let Some(slice) = slice else {
            return Ok(Self::full(base));
        };
        let (from, to) = slice.split_once(':').ok_or_else(invalid)?;
        let parse = |side: &str| -> Result<Option<Boundary>, ConfigError> {
            if side.trim().is_empty() {
                Ok(None)
            } else {
                side.parse().map(Some).map_err(|_| invalid())
            }
        };
        Ok(Self {
            base,
            from: parse(from)?,
            to: parse(to)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() -> Result<()> {
        for text in ["train", "test", "train[:95%]", "train[95%:]", "test[10%:20%]", "train[:1000]"] {
            let spec: SplitSpec = text.parse()?;
            assert_eq!(spec.to_string(), text);
        }
        assert_eq!(
            "train[:95%]".parse::<SplitSpec>()?,
            SplitSpec::head_percent(BaseSplit::Train, 95)
        );
        Ok(())
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["validation", "train[", "train[95%]", "train[:101%]", "train[:x%]", "tra"] {
            assert!(
                matches!(text.parse::<SplitSpec>(), Err(ConfigError::InvalidSplit(_))),
                "{} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_resolve_closest_rounding() -> Result<()> {
        assert_eq!(SplitSpec::head_percent(BaseSplit::Train, 95).resolve(50_000)?, 0..47_500);
        assert_eq!(SplitSpec::tail_percent(BaseSplit::Train, 95).resolve(50_000)?, 47_500..50_000);
        // 10% of 15 is 1.5, which rounds to 2.
        assert_eq!(SplitSpec::head_percent(BaseSplit::Test, 10).resolve(15)?, 0..2);
        // 10% of 25 is 2.5, which rounds to 2.
        assert_eq!(SplitSpec::head_percent(BaseSplit::Test, 10).resolve(25)?, 0..2);
        assert_eq!("test[10%:20%]".parse::<SplitSpec>()?.resolve(100)?, 10..20);
        assert_eq!("train[:1000]".parse::<SplitSpec>()?.resolve(10)?, 0..10);
        assert!("test[20%:10%]".parse::<SplitSpec>()?.resolve(100).is_err());
        Ok(())
    }

    #[test]
    fn test_head_and_tail_partition() -> Result<()> {
        for n in [7, 10, 333, 50_000] {
            for pct in [0, 5, 33, 95, 100] {
                let head = SplitSpec::head_percent(BaseSplit::Train, pct).resolve(n)?;
                let tail = SplitSpec::tail_percent(BaseSplit::Train, pct).resolve(n)?;
                assert_eq!(head.end, tail.start);
                assert_eq!(head.len() + tail.len(), n);
            }
        }
        Ok(())
    }

    #[test]
    fn test_nominal_split_names() -> Result<()> {
        assert_eq!("train".parse::<Split>()?, Split::Train);
        assert_eq!("Validation".parse::<Split>()?, Split::Validation);
        assert_eq!(Split::Test.to_string(), "test");
        assert!("dev".parse::<Split>().is_err());
        Ok(())
    }
}
