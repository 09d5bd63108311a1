//! Part-name grammar for split archives
//!
//! A part file name has the form `<base>.<NNN>` where `NNN` is exactly three
//! ASCII digits and `<base>` is non-empty:
//!
//! ```text
//! part-name := base "." digit digit digit
//! base      := one or more characters
//! ```
//!
//! The base must also be a single ordinary path component, since it names the
//! job's working and output directories: `.`, `..` and anything containing a
//! separator are rejected.
//!
//! The first part of an archive is the one whose suffix is `001`. Names that do
//! not match are rejected rather than guessed at.

use regex::Regex;
use std::path::{Component, Path};
use std::sync::OnceLock;

/// Parsed part file name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartName<'a> {
    /// Archive base name (everything before the final `.NNN`)
    pub base: &'a str,
    /// Sequence number (`001` -> 1)
    pub sequence: u32,
}

impl PartName<'_> {
    /// Whether this is the `.001` part
    pub fn is_first(&self) -> bool {
        self.sequence == 1
    }
}

fn part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // constant pattern, covered by tests
    PATTERN.get_or_init(|| Regex::new(r"^(?P<base>.+)\.(?P<seq>\d{3})$").expect("valid regex"))
}

/// Parse a file name against the part grammar
///
/// Returns `None` for names that do not match, including `000` suffixes which
/// cannot be part of a sequence starting at 1 and bases that are not a plain
/// file name (`..001` has base `.`).
///
/// # Examples
///
/// ```
/// use split_ingest::naming::parse_part_name;
///
/// let part = parse_part_name("movie.7z.002").unwrap();
/// assert_eq!(part.base, "movie.7z");
/// assert_eq!(part.sequence, 2);
///
/// assert!(parse_part_name("movie.7z").is_none());
/// assert!(parse_part_name("movie.01").is_none());
/// assert!(parse_part_name(".001").is_none());
/// assert!(parse_part_name("...001").is_none());
/// ```
pub fn parse_part_name(file_name: &str) -> Option<PartName<'_>> {
    let caps = part_pattern().captures(file_name)?;
    let base = caps.name("base")?.as_str();
    let sequence: u32 = caps.name("seq")?.as_str().parse().ok()?;
    if sequence == 0 || !is_plain_component(base) {
        return None;
    }
    Some(PartName { base, sequence })
}

fn is_plain_component(base: &str) -> bool {
    let mut components = Path::new(base).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == base
    )
}

/// If `path` names a first part, return its archive base name
pub fn first_part_base(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    parse_part_name(file_name)
        .filter(PartName::is_first)
        .map(|p| p.base.to_string())
}

/// Check whether `path` names a first part (`<base>.001`)
pub fn is_first_part(path: &Path) -> bool {
    first_part_base(path).is_some()
}
