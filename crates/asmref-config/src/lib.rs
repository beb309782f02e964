//! `asmref.toml` configuration and logging setup.

mod logging;

use std::path::{Path, PathBuf};

use asmref_resolve::{
    default_search_paths, discover_gac_root, CultureTable, ResolveError, SearchToken,
    WalkOptions, DEFAULT_ASSEMBLY_EXTENSIONS, DEFAULT_RELATED_EXTENSIONS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::logging::{init_tracing, LoggingConfig};

/// Points at the configuration file to use instead of `./asmref.toml`.
pub const ASMREF_CONFIG_ENV_VAR: &str = "ASMREF_CONFIG";

pub const CONFIG_FILE_NAME: &str = "asmref.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("unknown search path token `{0}`")]
    UnknownSearchToken(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsmrefConfig {
    pub resolve: ResolveConfig,
    pub gac: GacConfig,
    pub pkgconfig: PkgConfigConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    /// Ordered search path; `{...}` tokens or literal directories.
    #[serde(default = "ResolveConfig::default_search_paths")]
    pub search_paths: Vec<String>,

    #[serde(default)]
    pub target_framework_dirs: Vec<PathBuf>,

    #[serde(default = "ResolveConfig::default_assembly_extensions")]
    pub allowed_assembly_extensions: Vec<String>,

    #[serde(default = "ResolveConfig::default_related_extensions")]
    pub allowed_related_file_extensions: Vec<String>,

    #[serde(default = "default_true")]
    pub find_dependencies: bool,

    #[serde(default = "default_true")]
    pub find_related_files: bool,

    #[serde(default = "default_true")]
    pub find_satellites: bool,

    /// Culture names recognized as satellite directories in addition to the
    /// built-in list.
    #[serde(default)]
    pub extra_cultures: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ResolveConfig {
    fn default_search_paths() -> Vec<String> {
        default_search_paths().iter().map(|t| t.to_string()).collect()
    }

    fn default_assembly_extensions() -> Vec<String> {
        DEFAULT_ASSEMBLY_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    fn default_related_extensions() -> Vec<String> {
        DEFAULT_RELATED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    pub fn search_tokens(&self) -> Vec<SearchToken> {
        self.search_paths.iter().map(|raw| SearchToken::parse(raw)).collect()
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            find_dependencies: self.find_dependencies,
            find_related_files: self.find_related_files,
            find_satellites: self.find_satellites,
            related_extensions: self.allowed_related_file_extensions.clone(),
        }
    }

    pub fn culture_table(&self) -> CultureTable {
        CultureTable::builtin().with_extra(self.extra_cultures.iter().map(String::as_str))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for raw in &self.search_paths {
            let trimmed = raw.trim();
            let braced = trimmed.starts_with('{') && trimmed.ends_with('}');
            if braced && matches!(SearchToken::parse(trimmed), SearchToken::Directory(_)) {
                return Err(ConfigError::UnknownSearchToken(trimmed.to_owned()));
            }
        }
        Ok(())
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
            target_framework_dirs: Vec::new(),
            allowed_assembly_extensions: Self::default_assembly_extensions(),
            allowed_related_file_extensions: Self::default_related_extensions(),
            find_dependencies: true,
            find_related_files: true,
            find_satellites: true,
            extra_cultures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GacConfig {
    pub root: Option<PathBuf>,
}

impl GacConfig {
    /// Configured root, else the environment and well-known install locations.
    pub fn discover_root(&self) -> Result<PathBuf, ResolveError> {
        discover_gac_root(self.root.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkgConfigConfig {
    /// Searched before the `PKG_CONFIG_PATH`-derived directories.
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    /// Load and save the package cache file.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl PkgConfigConfig {
    pub fn effective_search_dirs(&self) -> Vec<PathBuf> {
        asmref_pkgconfig::default_search_dirs(&self.search_dirs)
    }

    /// `None` when persistence is disabled or no per-user directory is known.
    pub fn effective_cache_file(&self) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        self.cache_file
            .clone()
            .or_else(asmref_pkgconfig::default_cache_file)
    }
}

impl Default for PkgConfigConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            cache_file: None,
            persist: true,
        }
    }
}

impl AsmrefConfig {
    /// Parse TOML. Relative paths are left as written.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: AsmrefConfig = toml::from_str(text)?;
        config.resolve.validate()?;
        Ok(config)
    }

    /// Load a config file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;
        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        Ok(config)
    }

    fn rebase(&mut self, dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        self.resolve.target_framework_dirs.iter_mut().for_each(rebase);
        self.gac.root.iter_mut().for_each(rebase);
        self.pkgconfig.search_dirs.iter_mut().for_each(rebase);
        self.pkgconfig.cache_file.iter_mut().for_each(rebase);
        self.logging.file.iter_mut().for_each(rebase);
    }
}

/// Locate the configuration file.
///
/// Search order:
/// 1) `explicit` (the `--config` flag)
/// 2) `ASMREF_CONFIG`
/// 3) `asmref.toml` in `cwd`
///
/// Relative paths from 1) and 2) are taken relative to `cwd`.
pub fn discover_config_path(cwd: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    let requested = explicit.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(ASMREF_CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    });
    if let Some(path) = requested {
        return Some(if path.is_absolute() { path } else { cwd.join(path) });
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    local.is_file().then_some(local)
}

/// Load the effective configuration.
///
/// A missing `./asmref.toml` yields the defaults; a file named explicitly
/// or through `ASMREF_CONFIG` must exist.
pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<(AsmrefConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(cwd, explicit) else {
        return Ok((AsmrefConfig::default(), None));
    };
    let config = AsmrefConfig::load_from_path(&path)?;
    tracing::debug!(
        target = "asmref.config",
        path = %path.display(),
        "loaded configuration"
    );
    Ok((config, Some(path)))
}

#[cfg(test)]
mod tests {
    use asmref_test_utils::{env_lock, EnvVarGuard};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AsmrefConfig::load_from_str("").unwrap();
        assert_eq!(config, AsmrefConfig::default());
        assert_eq!(config.resolve.search_tokens(), default_search_paths());
        assert_eq!(config.resolve.walk_options(), WalkOptions::default());
    }

    #[test]
    fn parses_every_section() {
        let config = AsmrefConfig::load_from_str(
            r#"
[resolve]
search_paths = ["{HintPathFromItem}", "/opt/lib", "{GAC}"]
target_framework_dirs = ["/usr/lib/mono/4.5"]
find_satellites = false
extra_cultures = ["x-klingon"]

[gac]
root = "/srv/gac"

[pkgconfig]
search_dirs = ["/opt/pc"]
persist = false

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        assert_eq!(
            config.resolve.search_tokens(),
            vec![
                SearchToken::HintPathFromItem,
                SearchToken::Directory(PathBuf::from("/opt/lib")),
                SearchToken::Gac,
            ]
        );
        assert!(!config.resolve.walk_options().find_satellites);
        assert!(config.resolve.culture_table().contains("X-Klingon"));
        assert_eq!(config.gac.discover_root().unwrap(), PathBuf::from("/srv/gac"));
        assert_eq!(config.pkgconfig.effective_cache_file(), None);
        assert_eq!(config.pkgconfig.effective_search_dirs()[0], PathBuf::from("/opt/pc"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AsmrefConfig::load_from_str("[resolve]\nsearch_path = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{err}");

        let err = AsmrefConfig::load_from_str("[cache]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{err}");
    }

    #[test]
    fn unknown_braced_tokens_are_rejected() {
        let err =
            AsmrefConfig::load_from_str("[resolve]\nsearch_paths = [\"{Gak}\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSearchToken(token) if token == "{Gak}"));
    }

    #[test]
    fn relative_paths_are_resolved_against_the_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[resolve]\ntarget_framework_dirs = [\"fx\", \"/abs\"]\n[pkgconfig]\ncache_file = \"state/cache.xml\"\n",
        )
        .unwrap();

        let config = AsmrefConfig::load_from_path(&path).unwrap();
        assert_eq!(
            config.resolve.target_framework_dirs,
            vec![tmp.path().join("fx"), PathBuf::from("/abs")]
        );
        assert_eq!(
            config.pkgconfig.effective_cache_file(),
            Some(tmp.path().join("state/cache.xml"))
        );
    }

    #[test]
    fn discovery_prefers_flag_then_env_then_cwd() {
        let _lock = env_lock();
        let tmp = tempfile::tempdir().unwrap();
        let cwd = tmp.path();

        let _env = EnvVarGuard::set_str(ASMREF_CONFIG_ENV_VAR, None);
        assert_eq!(discover_config_path(cwd, None), None);
        let (config, path) = load(cwd, None).unwrap();
        assert_eq!(config, AsmrefConfig::default());
        assert_eq!(path, None);

        std::fs::write(cwd.join(CONFIG_FILE_NAME), "").unwrap();
        assert_eq!(discover_config_path(cwd, None), Some(cwd.join(CONFIG_FILE_NAME)));

        let _env = EnvVarGuard::set_str(ASMREF_CONFIG_ENV_VAR, Some("from-env.toml"));
        assert_eq!(discover_config_path(cwd, None), Some(cwd.join("from-env.toml")));
        assert!(matches!(load(cwd, None), Err(ConfigError::Io { .. })));

        assert_eq!(
            discover_config_path(cwd, Some(Path::new("/etc/asmref.toml"))),
            Some(PathBuf::from("/etc/asmref.toml"))
        );
    }
}
