use crate::identity::AssemblyIdentity;

/// Normalize a full assembly name for use as a lookup key.
///
/// Drops `PublicKeyToken=null` and any `ProcessorArchitecture=...`
/// component (both case-insensitively) and re-joins the remaining
/// components with `", "`.
pub fn normalize_full_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    for component in full_name.split(',') {
        let component = component.trim();
        if component.is_empty() {
            continue;
        }

        if let Some((key, value)) = component.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            if key.eq_ignore_ascii_case("PublicKeyToken") && value.eq_ignore_ascii_case("null") {
                continue;
            }
            if key.eq_ignore_ascii_case("ProcessorArchitecture") {
                continue;
            }
        }

        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(component);
    }
    out
}

/// Key under which package assemblies are indexed and looked up.
///
/// Parses `full_name` so that an omitted culture and `Culture=neutral`
/// (likewise an absent token and `PublicKeyToken=null`) produce the same
/// key, and token hex case does not matter. Names that do not parse fall
/// back to [`normalize_full_name`].
pub fn assembly_lookup_key(full_name: &str) -> String {
    match AssemblyIdentity::parse(full_name) {
        Ok(mut identity) => {
            if identity.is_neutral_culture() {
                identity.culture = None;
            }
            identity.full_name()
        }
        Err(_) => normalize_full_name(full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_token_is_dropped() {
        assert_eq!(
            normalize_full_name("Bar, Version=1.2.0.0, PublicKeyToken=null"),
            normalize_full_name("Bar, Version=1.2.0.0"),
        );
        assert_eq!(
            normalize_full_name("Bar, Version=1.2.0.0, publickeytoken=NULL"),
            "Bar, Version=1.2.0.0"
        );
    }

    #[test]
    fn processor_architecture_is_dropped() {
        assert_eq!(
            normalize_full_name(
                "Foo, Version=1.0.0.0, Culture=neutral, PublicKeyToken=0738eb9f132ed756, processorArchitecture=MSIL"
            ),
            "Foo, Version=1.0.0.0, Culture=neutral, PublicKeyToken=0738eb9f132ed756"
        );
    }

    #[test]
    fn real_tokens_are_kept() {
        assert_eq!(
            normalize_full_name("Foo,Version=1.0.0.0,PublicKeyToken=00aa"),
            "Foo, Version=1.0.0.0, PublicKeyToken=00aa"
        );
    }

    #[test]
    fn lookup_key_ignores_neutral_culture_and_token_case() {
        let key = assembly_lookup_key("Bar, Version=1.2.0.0, Culture=neutral");
        assert_eq!(key, "Bar, Version=1.2.0.0");
        assert_eq!(assembly_lookup_key("Bar, Version=1.2.0.0"), key);
        assert_eq!(
            assembly_lookup_key("Bar, Version=1.2.0.0, PublicKeyToken=null"),
            key
        );
        assert_eq!(
            assembly_lookup_key("Baz, Version=1.0.0.0, PublicKeyToken=0123456789ABCDEF"),
            assembly_lookup_key(
                "Baz, Version=1.0.0.0, Culture=neutral, PublicKeyToken=0123456789abcdef, processorArchitecture=MSIL"
            )
        );
        assert_eq!(
            assembly_lookup_key("Res, Version=1.0.0.0, Culture=fr"),
            "Res, Version=1.0.0.0, Culture=fr"
        );
    }
}
