use regex::Regex;
use std::sync::LazyLock;

/// Version compiled into this binary, in the same `vMAJOR.MINOR.PATCH`
/// form used for release tags.
pub const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

static TRIPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid version regex"));

/// The `(major, minor, patch)` triple found in a version string.
///
/// Ordering is lexicographic over the three numbers; pre-release and build
/// metadata are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    /// Take the first `N.N.N` found anywhere in `s`.
    ///
    /// A string without such a pattern reads as `0.0.0`. A segment too large
    /// for `u64` saturates instead of collapsing to zero, so it still sorts
    /// above every representable version.
    pub fn extract(s: &str) -> Self {
        let Some(caps) = TRIPLE.captures(s) else {
            return Self::default();
        };
        let num = |i: usize| caps[i].parse::<u64>().unwrap_or(u64::MAX);
        Self {
            major: num(1),
            minor: num(2),
            patch: num(3),
        }
    }
}

/// Returns true when `a` is strictly older than `b`.
pub fn is_older(a: &str, b: &str) -> bool {
    VersionTriple::extract(a) < VersionTriple::extract(b)
}
