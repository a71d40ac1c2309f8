//! Supported target platforms and their `meta.broken` predicates

use crate::error::{NbError, NbResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system half of a platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Linux,
    Darwin,
}

impl Os {
    /// Both OSes, in the order their short predicates are emitted
    pub fn all() -> &'static [Self] {
        &[Self::Linux, Self::Darwin]
    }

    /// Host predicate that is true for every platform of this OS
    pub fn predicate(&self) -> &'static str {
        match self {
            Self::Linux => "stdenv.hostPlatform.isLinux",
            Self::Darwin => "stdenv.hostPlatform.isDarwin",
        }
    }

    /// The two platforms running this OS
    pub fn platforms(&self) -> [Platform; 2] {
        match self {
            Self::Linux => [Platform::Aarch64Linux, Platform::X86_64Linux],
            Self::Darwin => [Platform::Aarch64Darwin, Platform::X86_64Darwin],
        }
    }
}

/// Architecture half of a platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    X86_64,
}

impl Arch {
    pub fn predicate(&self) -> &'static str {
        match self {
            Self::Aarch64 => "stdenv.hostPlatform.isAarch64",
            Self::X86_64 => "stdenv.hostPlatform.isx86_64",
        }
    }
}

/// One of the four platforms built by the CI service
///
/// Variants are declared in identifier order so `Ord` matches sorting the
/// identifier strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "aarch64-darwin")]
    Aarch64Darwin,
    #[serde(rename = "aarch64-linux")]
    Aarch64Linux,
    #[serde(rename = "x86_64-darwin")]
    X86_64Darwin,
    #[serde(rename = "x86_64-linux")]
    X86_64Linux,
}

impl Platform {
    /// All supported platforms, sorted
    pub fn all() -> &'static [Self] {
        &[
            Self::Aarch64Darwin,
            Self::Aarch64Linux,
            Self::X86_64Darwin,
            Self::X86_64Linux,
        ]
    }

    /// System identifier as used by Nix and the CI service
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aarch64Darwin => "aarch64-darwin",
            Self::Aarch64Linux => "aarch64-linux",
            Self::X86_64Darwin => "x86_64-darwin",
            Self::X86_64Linux => "x86_64-linux",
        }
    }

    pub fn os(&self) -> Os {
        match self {
            Self::Aarch64Linux | Self::X86_64Linux => Os::Linux,
            Self::Aarch64Darwin | Self::X86_64Darwin => Os::Darwin,
        }
    }

    pub fn arch(&self) -> Arch {
        match self {
            Self::Aarch64Darwin | Self::Aarch64Linux => Arch::Aarch64,
            Self::X86_64Darwin | Self::X86_64Linux => Arch::X86_64,
        }
    }

    /// Explicit OS-and-architecture predicate for this platform
    pub fn predicate(&self) -> String {
        format!("{} && {}", self.os().predicate(), self.arch().predicate())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = NbError;

    fn from_str(s: &str) -> NbResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| NbError::UnsupportedPlatform(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_platforms() {
        for platform in Platform::all() {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), *platform);
        }
    }

    #[test]
    fn parse_unknown_platform() {
        let err = "i686-linux".parse::<Platform>().unwrap_err();
        assert!(matches!(err, NbError::UnsupportedPlatform(ref s) if s == "i686-linux"));
    }

    #[test]
    fn ord_matches_identifier_order() {
        let mut names: Vec<_> = Platform::all().iter().map(|p| p.as_str()).collect();
        names.sort();
        let platforms: Vec<_> = Platform::all().iter().map(|p| p.as_str()).collect();
        assert_eq!(names, platforms);
    }

    #[test]
    fn predicate_text() {
        assert_eq!(
            Platform::X86_64Linux.predicate(),
            "stdenv.hostPlatform.isLinux && stdenv.hostPlatform.isx86_64"
        );
        assert_eq!(
            Platform::Aarch64Darwin.predicate(),
            "stdenv.hostPlatform.isDarwin && stdenv.hostPlatform.isAarch64"
        );
    }
}
