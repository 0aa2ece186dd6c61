//! Package versions and dependency expressions
//!
//! Versions are `MAJOR.MINOR.PATCH` triples with each component fitting in a
//! byte. They pack into a single 24-bit value so that ordering is
//! lexicographic on (major, minor, patch).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::RecipeError;

/// A packed package version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u32);

impl Version {
    /// Create a version from its components
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | patch as u32)
    }

    /// Rebuild a version from its packed form, ignoring bits above 24
    pub const fn from_packed(packed: u32) -> Self {
        Self(packed & 0x00ff_ffff)
    }

    /// The packed 24-bit value
    pub const fn packed(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn minor(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn patch(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

impl FromStr for Version {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| RecipeError::InvalidVersion {
            version: s.to_string(),
            reason,
        };

        let parsed = semver::Version::parse(s.trim()).map_err(|e| invalid(e.to_string()))?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(invalid(
                "pre-release and build metadata are not supported".to_string(),
            ));
        }

        let component = |value: u64, name: &str| {
            u8::try_from(value).map_err(|_| invalid(format!("{name} component {value} exceeds 255")))
        };

        Ok(Self::new(
            component(parsed.major, "major")?,
            component(parsed.minor, "minor")?,
            component(parsed.patch, "patch")?,
        ))
    }
}

/// Comparison operator of a dependency constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// No constraint
    #[default]
    Any,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
}

impl Comparator {
    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessEqual),
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterEqual),
            "==" => Some(Self::Equal),
            _ => None,
        }
    }

    /// Operator as written in recipes
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Equal => "==",
        }
    }
}

/// Check `have <op> want`
pub fn compare(op: Comparator, have: Version, want: Version) -> bool {
    match op {
        Comparator::Any => true,
        Comparator::Less => have < want,
        Comparator::LessEqual => have <= want,
        Comparator::Greater => have > want,
        Comparator::GreaterEqual => have >= want,
        Comparator::Equal => have == want,
    }
}

/// A parsed `name[<op><version>]` dependency expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the package depended on
    pub name: String,
    /// Constraint operator
    pub op: Comparator,
    /// Version the constraint compares against (zero when unconstrained)
    pub version: Version,
}

impl Dependency {
    /// Parse a dependency expression found in the recipe of `package`
    pub fn parse(package: &str, expression: &str) -> Result<Self, RecipeError> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^\s*([^<>=\s]+)\s*(?:(==|<=|>=|<|>)\s*(\S+))?\s*$")
                .expect("Invalid dependency pattern")
        });

        let malformed = || RecipeError::MalformedDependency {
            package: package.to_string(),
            expression: expression.to_string(),
        };

        let caps = pattern.captures(expression).ok_or_else(malformed)?;
        let name = caps[1].to_string();

        let (op, version) = match (caps.get(2), caps.get(3)) {
            (Some(op), Some(version)) => {
                let op = Comparator::from_operator(op.as_str()).ok_or_else(malformed)?;
                (op, version.as_str().parse()?)
            }
            _ => (Comparator::Any, Version::default()),
        };

        Ok(Self { name, op, version })
    }

    /// Whether `have` satisfies this dependency's constraint
    pub fn accepts(&self, have: Version) -> bool {
        compare(self.op, have, self.version)
    }

    /// Constraint as written, e.g. `foo>=2.0.0`
    pub fn constraint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Comparator::Any => write!(f, "{}", self.name),
            op => write!(f, "{}{}{}", self.name, op.as_str(), self.version),
        }
    }
}
