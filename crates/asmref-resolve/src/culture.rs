use std::collections::HashMap;

/// Culture names recognized out of the box for satellite discovery.
const BUILTIN_CULTURES: &[&str] = &[
    "af", "ar", "ar-EG", "ar-SA", "bg", "bg-BG", "ca", "ca-ES", "cs", "cs-CZ", "da", "da-DK",
    "de", "de-AT", "de-CH", "de-DE", "el", "el-GR", "en", "en-AU", "en-CA", "en-GB", "en-IE",
    "en-IN", "en-NZ", "en-US", "es", "es-AR", "es-ES", "es-MX", "et", "eu", "fa", "fi", "fi-FI",
    "fr", "fr-BE", "fr-CA", "fr-CH", "fr-FR", "gl", "he", "he-IL", "hi", "hr", "hu", "hu-HU",
    "id", "is", "it", "it-CH", "it-IT", "ja", "ja-JP", "ka", "kk", "ko", "ko-KR", "lt", "lv",
    "ms", "nb", "nb-NO", "nl", "nl-BE", "nl-NL", "nn", "no", "pl", "pl-PL", "pt", "pt-BR",
    "pt-PT", "ro", "ro-RO", "ru", "ru-RU", "sk", "sk-SK", "sl", "sr", "sv", "sv-SE", "th",
    "th-TH", "tr", "tr-TR", "uk", "uk-UA", "vi", "vi-VN", "zh", "zh-CN", "zh-HK", "zh-Hans",
    "zh-Hant", "zh-SG", "zh-TW",
];

/// Known culture names, compared ASCII case-insensitively.
///
/// Built once by the host and passed by reference to the walker.
#[derive(Debug, Clone)]
pub struct CultureTable {
    names: HashMap<String, String>,
}

impl Default for CultureTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CultureTable {
    pub fn builtin() -> Self {
        Self::empty().with_extra(BUILTIN_CULTURES.iter().copied())
    }

    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn with_extra<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            self.names
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| name.to_string());
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_ascii_lowercase())
    }

    /// Spelling the culture was registered with.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.names
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let table = CultureTable::builtin();
        assert!(table.contains("fr-FR"));
        assert!(table.contains("FR-fr"));
        assert_eq!(table.canonical("zh-hans"), Some("zh-Hans"));
        assert!(!table.contains("bin"));
    }

    #[test]
    fn extra_cultures_are_added() {
        let table = CultureTable::empty().with_extra(["qps-ploc", " ", "QPS-PLOC"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.canonical("qps-PLOC"), Some("qps-ploc"));
    }
}
