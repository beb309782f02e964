//! Lexical layer for pkg-config style `.pc` files.
//!
//! A `.pc` file is a list of variable definitions (`name=value`) and
//! keyword fields (`Key: value`). Values may reference variables with
//! `${name}`; `$${` produces a literal `${`.

use std::collections::{BTreeMap, HashMap};

/// Assembly-reference flags accepted in a `Libs` field. Compared
/// case-insensitively.
const REFERENCE_FLAGS: &[&str] = &["-r:", "/r:", "-reference:", "/reference:"];
/// Library search directory flags; relative references are looked up in
/// these directories before the `.pc` file's own directory.
const LIB_DIR_FLAGS: &[&str] = &["-lib:", "/lib:"];

#[derive(Debug, Default, Clone)]
pub(crate) struct PcFile {
    variables: HashMap<String, String>,
    /// Definition order, for display.
    variable_order: Vec<String>,
    fields: Vec<(String, String)>,
}

impl PcFile {
    pub(crate) fn parse(text: &str) -> Self {
        let mut file = Self::default();
        for line in text.lines() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            let eq = line.find('=');
            let colon = line.find(':');
            match (eq, colon) {
                (Some(eq), colon) if colon.map_or(true, |c| eq < c) => {
                    let name = line[..eq].trim();
                    if name.is_empty() || name.contains(char::is_whitespace) {
                        continue;
                    }
                    let value = line[eq + 1..].trim().to_string();
                    if file.variables.insert(name.to_string(), value).is_none() {
                        file.variable_order.push(name.to_string());
                    }
                }
                (_, Some(colon)) => {
                    let key = line[..colon].trim();
                    if key.is_empty() {
                        continue;
                    }
                    let value = line[colon + 1..].trim().to_string();
                    file.fields.push((key.to_string(), value));
                }
                _ => {}
            }
        }
        file
    }

    /// Expanded value of the variable `name`.
    pub(crate) fn variable(&self, name: &str) -> Option<String> {
        let raw = self.variables.get(name)?;
        let mut stack = vec![name.to_string()];
        Some(self.expand_inner(raw, &mut stack))
    }

    /// Expanded value of a keyword field; keys are case-insensitive.
    pub(crate) fn field(&self, key: &str) -> Option<String> {
        let (_, raw) = self
            .fields
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.expand(raw))
    }

    /// Field first, then a variable of the same name (case-insensitive).
    pub(crate) fn field_or_variable(&self, key: &str) -> Option<String> {
        self.field(key).or_else(|| {
            let name = self
                .variable_order
                .iter()
                .find(|name| name.eq_ignore_ascii_case(key))?;
            self.variable(name)
        })
    }

    pub(crate) fn expand(&self, value: &str) -> String {
        self.expand_inner(value, &mut Vec::new())
    }

    fn expand_inner(&self, value: &str, stack: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some(after) = tail.strip_prefix("$${") {
                out.push_str("${");
                rest = after;
                continue;
            }

            if let Some(after) = tail.strip_prefix("${") {
                if let Some(end) = after.find('}') {
                    let name = &after[..end];
                    rest = &after[end + 1..];
                    if stack.iter().any(|seen| seen == name) {
                        tracing::debug!(
                            target = "asmref.pkgconfig",
                            variable = name,
                            "recursive variable reference; leaving unexpanded"
                        );
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                        continue;
                    }
                    if let Some(raw) = self.variables.get(name) {
                        stack.push(name.to_string());
                        let expanded = self.expand_inner(raw, stack);
                        stack.pop();
                        out.push_str(&expanded);
                    }
                    continue;
                }
            }

            out.push('$');
            rest = &tail[1..];
        }
        out.push_str(rest);
        out
    }

    /// All variables, expanded, for display.
    pub(crate) fn expanded_variables(&self) -> BTreeMap<String, String> {
        self.variable_order
            .iter()
            .filter_map(|name| Some((name.clone(), self.variable(name)?)))
            .collect()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Assembly file candidates named by a package.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LibraryCandidates {
    pub(crate) files: Vec<String>,
    pub(crate) lib_dirs: Vec<String>,
}

/// Candidates from the `Libraries` value (bare, space-separated) when present,
/// otherwise from reference flags in `Libs`.
pub(crate) fn library_candidates(pc: &PcFile) -> LibraryCandidates {
    let mut out = LibraryCandidates::default();

    if let Some(libraries) = pc.field_or_variable("Libraries") {
        out.files = split_args(&libraries);
        return out;
    }

    let Some(libs) = pc.field_or_variable("Libs") else {
        return out;
    };
    for arg in split_args(&libs) {
        if let Some(value) = strip_flag(&arg, REFERENCE_FLAGS) {
            out.files.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(unquote),
            );
        } else if let Some(value) = strip_flag(&arg, LIB_DIR_FLAGS) {
            out.lib_dirs.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(unquote),
            );
        }
    }
    out
}

fn strip_flag<'a>(arg: &'a str, flags: &[&str]) -> Option<&'a str> {
    flags.iter().find_map(|flag| {
        let head = arg.get(..flag.len())?;
        head.eq_ignore_ascii_case(flag).then(|| &arg[flag.len()..])
    })
}

/// Whitespace-separated arguments; double quotes group.
fn split_args(value: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in value.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn unquote(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Package names from a `Requires` field, version constraints dropped.
pub(crate) fn requires(pc: &PcFile) -> Vec<String> {
    let Some(raw) = pc.field("Requires") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut skip_next = false;
    for token in raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if skip_next {
            skip_next = false;
            continue;
        }
        if matches!(token, "=" | "<" | ">" | "<=" | ">=" | "!=") {
            skip_next = true;
            continue;
        }
        out.push(token.to_string());
    }
    out
}
