//! Recipe loading
//!
//! Recipes are JSON files named `<package>.json` in the recipes directory.
//! Loading a recipe parses it, resolves its dependency expressions and
//! expands substitutions in its commands, producing an immutable
//! [`PackageDescriptor`]. Descriptors are cached for the lifetime of the book.
//!
//! Substitutions inside command arguments and `host-provides`:
//!
//! - `$$` - a literal `$`
//! - `${key}` - one of the keys listed in [`SUBSTITUTION_KEYS`]
//! - `$NAME` - environment variable `NAME`, up to the next whitespace

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::defaults;
use crate::core::config::Config;
use crate::core::package::{Command, PackageDescriptor, Patch, Source};
use crate::core::version::{Dependency, Version};
use crate::error::RecipeError;

/// Keys accepted inside `${...}`
pub const SUBSTITUTION_KEYS: &[&str] = &[
    "bootstrap_directory",
    "repo_directory",
    "name",
    "description",
    "prefix",
    "target_prefix",
    "host_prefix",
    "nproc",
    "target_triplet",
    "host_triplet",
];

/// Recipe file as written on disk
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RecipeFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub depends: Vec<String>,

    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,

    #[serde(default)]
    pub patches: Vec<PatchEntry>,

    pub bootstrap_commands: Vec<Vec<String>>,
    pub build_commands: Vec<Vec<String>>,
    pub install_commands: Vec<Vec<String>>,
    #[serde(default)]
    pub run_commands: Vec<Vec<String>>,

    #[serde(default)]
    pub host_package: Option<Flag>,
    #[serde(default)]
    pub host_provides: Option<String>,
    #[serde(default)]
    pub supports_binary_packages: Option<Flag>,
    #[serde(default)]
    pub inhibit_auto_rebuild: Option<Flag>,
}

/// Patch entry of a recipe
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PatchEntry {
    pub patch: PathBuf,
    pub modifies: PathBuf,
    #[serde(default)]
    pub delete_file: Option<Flag>,
}

/// Boolean recipe flag; numbers are accepted, non-zero meaning set
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Number(f64),
}

impl Flag {
    fn is_set(flag: Option<Self>) -> bool {
        match flag {
            Some(Self::Bool(b)) => b,
            Some(Self::Number(n)) => n != 0.0,
            None => false,
        }
    }
}

impl RecipeFile {
    /// Parse from JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Loads and caches package descriptors from the recipes directory
#[derive(Debug)]
pub struct RecipeBook {
    config: Arc<Config>,
    cache: Mutex<HashMap<String, Arc<PackageDescriptor>>>,
}

impl RecipeBook {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Recipe file of a package
    pub fn path(&self, name: &str) -> PathBuf {
        self.config
            .dirs
            .recipes
            .join(format!("{name}.{}", defaults::RECIPE_EXTENSION))
    }

    /// Whether a recipe exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        is_valid_name(name) && self.path(name).is_file()
    }

    /// Load the descriptor of `name`
    pub fn load(&self, name: &str) -> Result<Arc<PackageDescriptor>, RecipeError> {
        if let Some(pkg) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(pkg));
        }

        if !self.contains(name) {
            return Err(RecipeError::NotFound {
                name: name.to_string(),
            });
        }

        let path = self.path(name);
        let content = fs::read_to_string(&path).map_err(|e| RecipeError::IoError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let file = RecipeFile::from_json(&content).map_err(|e| RecipeError::ParseError {
            path: path.clone(),
            error: e.to_string(),
        })?;

        if file.name != name {
            return Err(RecipeError::NameMismatch {
                path,
                declared: file.name,
            });
        }

        let mut pkg = self.descriptor(file, &path)?;
        pkg.recipe_modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
        pkg.recipe_path = Some(path);
        debug!("Loaded recipe '{}' {}", pkg.name, pkg.version);

        let pkg = Arc::new(pkg);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&pkg));
        Ok(pkg)
    }

    /// Names of all recipes, sorted
    pub fn names(&self) -> Result<Vec<String>, RecipeError> {
        let dir = &self.config.dirs.recipes;
        let mut names = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RecipeError::IoError {
                path: dir.clone(),
                error: e.to_string(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(defaults::RECIPE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn descriptor(&self, file: RecipeFile, path: &std::path::Path) -> Result<PackageDescriptor, RecipeError> {
        let mut pkg = PackageDescriptor::new(file.name);
        pkg.description = file.description.unwrap_or_default();
        pkg.version = match file.version {
            Some(v) => v.parse()?,
            None => Version::default(),
        };
        pkg.dependencies = file
            .depends
            .iter()
            .map(|expr| Dependency::parse(&pkg.name, expr))
            .collect::<Result<_, _>>()?;

        pkg.source = match (file.git_url, file.git_commit, file.url) {
            (Some(url), Some(reference), _) => Source::VersionControl { url, reference },
            (Some(_), None, _) => {
                return Err(RecipeError::ParseError {
                    path: path.to_path_buf(),
                    error: "missing field `git-commit`".to_string(),
                })
            }
            (None, _, Some(url)) => Source::WebArchive {
                url,
                sha256: file.sha256,
            },
            (None, _, None) => Source::Sourceless,
        };

        pkg.patches = file
            .patches
            .into_iter()
            .map(|entry| Patch {
                patch: if entry.patch.is_absolute() {
                    entry.patch
                } else {
                    self.config.dirs.recipes.join(entry.patch)
                },
                target: entry.modifies,
                delete_before: Flag::is_set(entry.delete_file),
            })
            .collect();

        pkg.host_package = Flag::is_set(file.host_package);
        pkg.supports_binary_packaging = Flag::is_set(file.supports_binary_packages);
        pkg.inhibit_auto_rebuild = Flag::is_set(file.inhibit_auto_rebuild);

        let subst = Substitution::new(&self.config, &pkg);
        let bootstrap = subst.commands("bootstrap-commands", file.bootstrap_commands)?;
        let build = subst.commands("build-commands", file.build_commands)?;
        let install = subst.commands("install-commands", file.install_commands)?;
        let run = subst.commands("run-commands", file.run_commands)?;
        let host_provides = file
            .host_provides
            .map(|probe| subst.expand("host-provides", &probe))
            .transpose()?;

        pkg.bootstrap = bootstrap;
        pkg.build = build;
        pkg.install = install;
        pkg.run = run;
        pkg.host_provides = host_provides;
        Ok(pkg)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Expands `$` substitutions for one package
struct Substitution<'a> {
    config: &'a Config,
    pkg: &'a PackageDescriptor,
}

impl<'a> Substitution<'a> {
    fn new(config: &'a Config, pkg: &'a PackageDescriptor) -> Self {
        Self { config, pkg }
    }

    fn commands(&self, field: &str, commands: Vec<Vec<String>>) -> Result<Vec<Command>, RecipeError> {
        commands
            .into_iter()
            .filter(|argv| !argv.is_empty())
            .map(|argv| {
                argv.iter()
                    .map(|arg| self.expand(field, arg))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Command::new)
            })
            .collect()
    }

    fn key(&self, key: &str) -> Option<String> {
        let dirs = &self.config.dirs;
        let path = |p: &PathBuf| p.display().to_string();
        Some(match key {
            "bootstrap_directory" => path(&dirs.bootstrap),
            "repo_directory" => path(&dirs.repos),
            "name" => self.pkg.name.clone(),
            "description" => self.pkg.description.clone(),
            "prefix" => path(&self.pkg.prefix(self.config)),
            "target_prefix" => path(&dirs.prefix),
            "host_prefix" => path(&dirs.host_prefix),
            "nproc" => num_cpus::get().to_string(),
            "target_triplet" => self.config.target_triplet.clone(),
            "host_triplet" => self.config.host_triplet.clone(),
            _ => return None,
        })
    }

    fn expand(&self, field: &str, input: &str) -> Result<String, RecipeError> {
        let fail = |reason: String| RecipeError::Substitution {
            package: self.pkg.name.clone(),
            field: field.to_string(),
            reason,
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(at) = rest.find('$') {
            out.push_str(&rest[..at]);
            let after = &rest[at + 1..];

            if after.is_empty() {
                // A trailing '$' is kept as is
                out.push('$');
                rest = after;
            } else if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let end = body
                    .find('}')
                    .ok_or_else(|| fail(format!("Syntax error trying to substitute '{}'", &rest[at..])))?;
                let key = &body[..end];
                let value = self
                    .key(key)
                    .ok_or_else(|| fail(format!("Invalid substitution key '{key}'")))?;
                out.push_str(&value);
                rest = &body[end + 1..];
            } else {
                let end = after.find(char::is_whitespace).unwrap_or(after.len());
                let var = &after[..end];
                let value = std::env::var(var)
                    .map_err(|_| fail(format!("Invalid environment variable '{var}'")))?;
                out.push_str(&value);
                rest = &after[end..];
            }
        }

        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn book(root: &Path, host: &str, target: &str) -> RecipeBook {
        let config = Config::for_root(root, host, target);
        fs::create_dir_all(&config.dirs.recipes).unwrap();
        RecipeBook::new(Arc::new(config))
    }

    fn write_recipe(book: &RecipeBook, name: &str, json: &str) {
        fs::write(book.path(name), json).unwrap();
    }

    const ZLIB: &str = r#"{
        "name": "zlib",
        "description": "Compression library",
        "version": "1.3.1",
        "depends": ["make>=4.0.0", "cc"],
        "url": "https://example.org/zlib-1.3.1.tar.gz",
        "sha256": "abc",
        "patches": [{"patch": "zlib.patch", "modifies": "Makefile", "delete-file": 0}],
        "bootstrap-commands": [["${repo_directory}/zlib/configure", "--prefix=${prefix}"], []],
        "build-commands": [["make", "-j${nproc}"]],
        "install-commands": [["make", "install"]],
        "supports-binary-packages": 1
    }"#;

    #[test]
    fn test_load_recipe() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "x86_64-linux-gnu", "x86_64-linux-gnu");
        write_recipe(&book, "zlib", ZLIB);

        let pkg = book.load("zlib").unwrap();
        let dirs = &book.config().dirs;

        assert_eq!(pkg.version, Version::new(1, 3, 1));
        assert_eq!(pkg.dependencies.len(), 2);
        assert_eq!(pkg.dependencies[0].to_string(), "make>=4.0.0");
        assert_eq!(
            pkg.source,
            Source::WebArchive {
                url: "https://example.org/zlib-1.3.1.tar.gz".to_string(),
                sha256: Some("abc".to_string()),
            }
        );
        assert_eq!(pkg.patches[0].patch, dirs.recipes.join("zlib.patch"));
        assert!(!pkg.patches[0].delete_before);
        assert!(pkg.supports_binary_packaging);

        // Empty command vectors are dropped
        assert_eq!(pkg.bootstrap.len(), 1);
        assert_eq!(
            pkg.bootstrap[0].argv,
            vec![
                format!("{}/zlib/configure", dirs.repos.display()),
                format!("--prefix={}", dirs.prefix.display()),
            ]
        );
        assert_eq!(pkg.build[0].argv[1], format!("-j{}", num_cpus::get()));
        assert!(pkg.recipe_modified.is_some());
    }

    #[test]
    fn test_load_is_cached() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        write_recipe(&book, "zlib", ZLIB);

        let first = book.load("zlib").unwrap();
        let second = book.load("zlib").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_recipe() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        assert!(matches!(book.load("nope"), Err(RecipeError::NotFound { .. })));
        assert!(matches!(book.load("../x"), Err(RecipeError::NotFound { .. })));
    }

    #[test]
    fn test_missing_required_field() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        write_recipe(
            &book,
            "bad",
            r#"{"name": "bad", "depends": [], "bootstrap-commands": [], "build-commands": []}"#,
        );
        assert!(matches!(book.load("bad"), Err(RecipeError::ParseError { .. })));
    }

    #[test]
    fn test_name_mismatch() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        write_recipe(&book, "other", ZLIB);
        assert!(matches!(book.load("other"), Err(RecipeError::NameMismatch { .. })));
    }

    #[test]
    fn test_git_source_and_host_prefix() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "x86_64-linux-gnu", "x86_64-obos");
        write_recipe(
            &book,
            "binutils",
            r#"{
                "name": "binutils",
                "depends": [],
                "git-url": "https://example.org/binutils.git",
                "git-commit": "v2.42",
                "host-package": true,
                "host-provides": "command -v ${target_triplet}-ld",
                "bootstrap-commands": [["./configure", "--prefix=${prefix}", "--target=${target_triplet}"]],
                "build-commands": [],
                "install-commands": []
            }"#,
        );

        let pkg = book.load("binutils").unwrap();
        assert!(matches!(pkg.source, Source::VersionControl { .. }));
        assert_eq!(pkg.host_provides.as_deref(), Some("command -v x86_64-obos-ld"));
        assert_eq!(
            pkg.bootstrap[0].argv[1],
            format!("--prefix={}", book.config().dirs.host_prefix.display())
        );
    }

    #[test]
    fn test_git_url_requires_commit() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        write_recipe(
            &book,
            "g",
            r#"{"name": "g", "depends": [], "git-url": "u",
                "bootstrap-commands": [], "build-commands": [], "install-commands": []}"#,
        );
        assert!(matches!(book.load("g"), Err(RecipeError::ParseError { .. })));
    }

    #[test]
    fn test_substitution_rules() {
        let config = Config::for_root("/repo", "x86_64-linux-gnu", "x86_64-obos");
        let mut pkg = PackageDescriptor::new("gcc");
        pkg.description = "GNU compiler".to_string();
        let subst = Substitution::new(&config, &pkg);

        std::env::set_var("STRAPKIT_TEST_SUBST", "value");
        assert_eq!(subst.expand("f", "cost: $$5").unwrap(), "cost: $5");
        assert_eq!(subst.expand("f", "${name}-${host_triplet}").unwrap(), "gcc-x86_64-linux-gnu");
        assert_eq!(subst.expand("f", "${description}").unwrap(), "GNU compiler");
        assert_eq!(subst.expand("f", "x=$STRAPKIT_TEST_SUBST y").unwrap(), "x=value y");
        assert_eq!(subst.expand("f", "trailing$").unwrap(), "trailing$");
        assert_eq!(subst.expand("f", "${bootstrap_directory}").unwrap(), "/repo/bootstrap");

        assert!(subst.expand("f", "${nope}").is_err());
        assert!(subst.expand("f", "${name").is_err());
        assert!(subst.expand("f", "$STRAPKIT_TEST_SURELY_UNSET").is_err());
    }

    #[test]
    fn test_names_are_sorted() {
        let temp = TempDir::new().unwrap();
        let book = book(temp.path(), "h", "h");
        for name in ["zlib", "bash", "make"] {
            write_recipe(&book, name, "{}");
        }
        fs::write(book.config().dirs.recipes.join("zlib.patch"), "").unwrap();

        assert_eq!(book.names().unwrap(), vec!["bash", "make", "zlib"]);
    }
}
