use crate::AssemblyIdentity;

/// Whether `candidate` can satisfy a reference to `requested`.
///
/// - simple names must be equal (case-sensitive);
/// - cultures are compared only when both sides carry one;
/// - with `specific_version`, the candidate must be the requested version or
///   newer, and both sides must carry the same non-empty public key token.
pub fn is_compatible(
    requested: &AssemblyIdentity,
    candidate: &AssemblyIdentity,
    specific_version: bool,
) -> bool {
    if requested.name != candidate.name {
        return false;
    }

    if let (Some(wanted), Some(actual)) = (&requested.culture, &candidate.culture) {
        if !wanted.eq_ignore_ascii_case(actual) {
            return false;
        }
    }

    if !specific_version {
        return true;
    }

    if let Some(wanted) = requested.version {
        match candidate.version {
            Some(actual) if actual >= wanted => {}
            _ => return false,
        }
    }

    match (&requested.public_key_token, &candidate.public_key_token) {
        (Some(wanted), Some(actual)) if !wanted.is_empty() && !actual.is_empty() => {
            wanted.as_bytes() == actual.as_bytes()
        }
        _ => false,
    }
}

/// `SpecificVersion` used when the reference does not say: strong-named
/// references are matched strictly, everything else by simple name.
pub fn default_specific_version(requested: &AssemblyIdentity) -> bool {
    requested.is_strong_named()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssemblyVersion, PublicKeyToken};

    fn strong(name: &str, version: &str, token: &str) -> AssemblyIdentity {
        AssemblyIdentity::new(name)
            .with_version(AssemblyVersion::parse(version).unwrap())
            .with_public_key_token(PublicKeyToken::parse_hex(token).unwrap())
    }

    #[test]
    fn names_are_case_sensitive() {
        let a = AssemblyIdentity::new("Foo");
        let b = AssemblyIdentity::new("foo");
        assert!(!is_compatible(&a, &b, false));
    }

    #[test]
    fn missing_culture_is_a_wildcard() {
        let requested = AssemblyIdentity::new("Foo");
        let candidate = AssemblyIdentity::new("Foo").with_culture("fr-FR");
        assert!(is_compatible(&requested, &candidate, false));
        assert!(is_compatible(&candidate, &requested, false));
    }

    #[test]
    fn differing_cultures_never_match() {
        let requested = AssemblyIdentity::new("Foo").with_culture("neutral");
        let candidate = AssemblyIdentity::new("Foo").with_culture("fr-FR");
        assert!(!is_compatible(&requested, &candidate, false));
    }

    #[test]
    fn specific_version_accepts_same_or_newer_only() {
        let requested = strong("Foo", "1.5.0.0", "0123456789abcdef");
        assert!(is_compatible(
            &requested,
            &strong("Foo", "1.5.0.0", "0123456789abcdef"),
            true
        ));
        assert!(is_compatible(
            &requested,
            &strong("Foo", "2.0.0.0", "0123456789abcdef"),
            true
        ));
        assert!(!is_compatible(
            &requested,
            &strong("Foo", "1.0.0.0", "0123456789abcdef"),
            true
        ));
    }

    #[test]
    fn specific_version_requires_matching_tokens() {
        let requested = strong("Foo", "1.0.0.0", "0123456789abcdef");
        assert!(!is_compatible(
            &requested,
            &strong("Foo", "1.0.0.0", "fedcba9876543210"),
            true
        ));

        let unsigned = AssemblyIdentity::new("Foo").with_version(AssemblyVersion::new(1, 0, 0, 0));
        assert!(!is_compatible(&requested, &unsigned, true));
        assert!(!is_compatible(&unsigned, &unsigned, true));
    }

    #[test]
    fn loose_matching_ignores_version_and_token() {
        let requested = strong("Foo", "3.0.0.0", "0123456789abcdef");
        let candidate = strong("Foo", "1.0.0.0", "fedcba9876543210");
        assert!(is_compatible(&requested, &candidate, false));
    }

    #[test]
    fn default_follows_strong_naming() {
        assert!(default_specific_version(&strong("Foo", "1.0", "00aa")));
        assert!(!default_specific_version(
            &AssemblyIdentity::parse("Foo, Version=1.0").unwrap()
        ));
        assert!(!default_specific_version(
            &AssemblyIdentity::parse("Foo, PublicKeyToken=00aa").unwrap()
        ));
    }
}
