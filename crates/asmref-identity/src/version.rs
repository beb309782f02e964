use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::IdentityParseError;

/// Four-part assembly version (`major.minor.build.revision`).
///
/// Missing trailing components parse as `0`, so `1.2` and `1.2.0.0` are the
/// same version. Ordering is numeric, component by component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssemblyVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl AssemblyVersion {
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IdentityParseError> {
        let trimmed = raw.trim();
        let invalid = || IdentityParseError::InvalidVersion(raw.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u16; 4];
        let mut count = 0usize;
        for segment in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = segment.trim().parse::<u16>().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl FromStr for AssemblyVersion {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl Serialize for AssemblyVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssemblyVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(
            AssemblyVersion::parse("1.2").unwrap(),
            AssemblyVersion::new(1, 2, 0, 0)
        );
        assert_eq!(
            AssemblyVersion::parse("4").unwrap(),
            AssemblyVersion::new(4, 0, 0, 0)
        );
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let v9 = AssemblyVersion::parse("1.9.0.0").unwrap();
        let v10 = AssemblyVersion::parse("1.10.0.0").unwrap();
        assert!(v10 > v9);
    }

    #[test]
    fn rejects_garbage() {
        assert!(AssemblyVersion::parse("").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("70000.0").is_err());
    }
}
