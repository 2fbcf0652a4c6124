use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

/// Major version shipped in this container unless configured otherwise.
pub const DEFAULT_TARGET_VERSION: &str = "17";

/// A PostgreSQL major version as spelled in `PG_VERSION`.
///
/// Releases before 10 carry a two-part major (`9.6`); later releases use a
/// single number (`15`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MajorVersion {
    major: u32,
    minor: Option<u32>,
}

impl MajorVersion {
    pub const fn new(major: u32) -> Self {
        Self { major, minor: None }
    }

    pub const fn legacy(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor: Some(minor),
        }
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("major version must not be empty"));
        }

        let (major_raw, minor_raw) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (trimmed, None),
        };
        let major = parse_component(major_raw)
            .with_context(|| format!("invalid major version '{trimmed}'"))?;

        match (major < 10, minor_raw) {
            (true, Some(minor_raw)) => {
                let minor = parse_component(minor_raw)
                    .with_context(|| format!("invalid major version '{trimmed}'"))?;
                Ok(Self::legacy(major, minor))
            }
            (true, None) => Err(anyhow!(
                "major version '{trimmed}' predates 10 and must use the two-part form"
            )),
            (false, Some(_)) => Err(anyhow!(
                "major version '{trimmed}' must be a single number from 10 onwards"
            )),
            (false, None) => Ok(Self::new(major)),
        }
    }
}

fn parse_component(raw: &str) -> anyhow::Result<u32> {
    if raw.is_empty() || !raw.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(anyhow!("version component '{raw}' is not a number"));
    }
    raw.parse::<u32>()
        .with_context(|| format!("version component '{raw}' is out of range"))
}

impl fmt::Display for MajorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

impl FromStr for MajorVersion {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl TryFrom<String> for MajorVersion {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MajorVersion> for String {
    fn from(value: MajorVersion) -> Self {
        value.to_string()
    }
}
