use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{AssemblyVersion, IdentityParseError};

/// Culture name used for the invariant culture.
pub const NEUTRAL_CULTURE: &str = "neutral";

/// Public key token bytes, rendered as lowercase hex.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyToken(Vec<u8>);

impl PublicKeyToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn parse_hex(raw: &str) -> Result<Self, IdentityParseError> {
        let trimmed = raw.trim();
        let invalid = || IdentityParseError::InvalidPublicKeyToken(raw.to_string());
        if trimmed.len() % 2 != 0 || !trimmed.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = Vec::with_capacity(trimmed.len() / 2);
        for pair in trimmed.as_bytes().chunks(2) {
            let hi = hex_value(pair[0]).ok_or_else(invalid)?;
            let lo = hex_value(pair[1]).ok_or_else(invalid)?;
            bytes.push((hi << 4) | lo);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for PublicKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for PublicKeyToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKeyToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Identity of a managed assembly.
///
/// `version`, `culture` and `public_key_token` are optional; an absent value
/// acts as a wildcard when matching (see [`crate::is_compatible`]). The
/// invariant culture is stored as [`NEUTRAL_CULTURE`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<AssemblyVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_token: Option<PublicKeyToken>,
}

impl AssemblyIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            culture: None,
            public_key_token: None,
        }
    }

    pub fn with_version(mut self, version: AssemblyVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_culture(mut self, culture: &str) -> Self {
        self.culture = Some(normalize_culture(culture));
        self
    }

    pub fn with_public_key_token(mut self, token: PublicKeyToken) -> Self {
        self.public_key_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Parse a display name (`Name, Version=.., Culture=.., PublicKeyToken=..`).
    ///
    /// Keys are case-insensitive and may appear in any order. Unknown keys
    /// such as `ProcessorArchitecture` or `Retargetable` are ignored.
    pub fn parse(display_name: &str) -> Result<Self, IdentityParseError> {
        let mut components = display_name.split(',');
        let name = components.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(IdentityParseError::EmptyName);
        }
        if name.contains('=') {
            return Err(IdentityParseError::MalformedComponent(name.to_string()));
        }

        let mut identity = Self::new(name);
        for component in components {
            let component = component.trim();
            if component.is_empty() {
                continue;
            }
            let Some((key, value)) = component.split_once('=') else {
                return Err(IdentityParseError::MalformedComponent(
                    component.to_string(),
                ));
            };
            let key = key.trim();
            let value = value.trim();

            if key.eq_ignore_ascii_case("Version") {
                identity.version = Some(AssemblyVersion::parse(value)?);
            } else if key.eq_ignore_ascii_case("Culture") {
                identity.culture = Some(normalize_culture(value));
            } else if key.eq_ignore_ascii_case("PublicKeyToken") {
                identity.public_key_token = if value.eq_ignore_ascii_case("null") {
                    None
                } else {
                    Some(PublicKeyToken::parse_hex(value)?).filter(|t| !t.is_empty())
                };
            }
        }

        Ok(identity)
    }

    /// Both a version and a non-empty public key token are present.
    pub fn is_strong_named(&self) -> bool {
        self.version.is_some()
            && self
                .public_key_token
                .as_ref()
                .is_some_and(|token| !token.is_empty())
    }

    pub fn is_neutral_culture(&self) -> bool {
        self.culture
            .as_deref()
            .map_or(true, |c| c.eq_ignore_ascii_case(NEUTRAL_CULTURE))
    }

    /// Canonical full name; identical to the `Display` output.
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

fn normalize_culture(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(NEUTRAL_CULTURE) {
        NEUTRAL_CULTURE.to_string()
    } else {
        raw.to_string()
    }
}

impl FromStr for AssemblyIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, ", Version={version}")?;
        }
        if let Some(culture) = &self.culture {
            write!(f, ", Culture={culture}")?;
        }
        if let Some(token) = &self.public_key_token {
            write!(f, ", PublicKeyToken={token}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_full_display_name() {
        let id = AssemblyIdentity::parse(
            "System.Xml, Version=4.0.0.0, Culture=neutral, PublicKeyToken=B77A5C561934E089",
        )
        .unwrap();

        assert_eq!(id.name, "System.Xml");
        assert_eq!(id.version, Some(AssemblyVersion::new(4, 0, 0, 0)));
        assert_eq!(id.culture.as_deref(), Some(NEUTRAL_CULTURE));
        assert_eq!(
            id.public_key_token.as_ref().map(ToString::to_string).as_deref(),
            Some("b77a5c561934e089")
        );
        assert!(id.is_strong_named());
    }

    #[test]
    fn null_token_is_absent_and_not_strong_named() {
        let id = AssemblyIdentity::parse("Bar, Version=1.2.0.0, PublicKeyToken=null").unwrap();
        assert_eq!(id.public_key_token, None);
        assert!(!id.is_strong_named());
    }

    #[test]
    fn keys_are_case_insensitive_and_unknown_keys_ignored() {
        let id = AssemblyIdentity::parse(
            "Foo,culture=de-DE , VERSION=1.0, processorArchitecture=MSIL, Retargetable=Yes",
        )
        .unwrap();
        assert_eq!(id.culture.as_deref(), Some("de-DE"));
        assert_eq!(id.version, Some(AssemblyVersion::new(1, 0, 0, 0)));
    }

    #[test]
    fn bare_name_has_no_optional_parts() {
        let id = AssemblyIdentity::parse("  Mono.Posix ").unwrap();
        assert_eq!(id, AssemblyIdentity::new("Mono.Posix"));
        assert_eq!(id.to_string(), "Mono.Posix");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let id = AssemblyIdentity::new("Foo")
            .with_version(AssemblyVersion::new(1, 2, 3, 4))
            .with_culture("")
            .with_public_key_token(PublicKeyToken::new(vec![0xab, 0xcd]));
        let text = id.to_string();
        assert_eq!(text, "Foo, Version=1.2.3.4, Culture=neutral, PublicKeyToken=abcd");
        assert_eq!(AssemblyIdentity::parse(&text).unwrap(), id);
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(
            AssemblyIdentity::parse(" , Version=1.0"),
            Err(IdentityParseError::EmptyName)
        );
        assert!(matches!(
            AssemblyIdentity::parse("Foo, Version"),
            Err(IdentityParseError::MalformedComponent(_))
        ));
        assert!(matches!(
            AssemblyIdentity::parse("Foo, PublicKeyToken=xyz"),
            Err(IdentityParseError::InvalidPublicKeyToken(_))
        ));
    }

    #[test]
    fn serializes_token_and_version_as_strings() {
        let id = AssemblyIdentity::parse("Foo, Version=1.0.0.0, PublicKeyToken=0011").unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Foo",
                "version": "1.0.0.0",
                "public_key_token": "0011",
            })
        );
    }
}
