// SDB - Session Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use eyre::{eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// A position in a source file.
///
/// `Loc` is compared by value and is the key for breakpoints, navigation
/// requests and the current stop location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loc {
    /// Path to the source file, as reported by the line table.
    pub path: PathBuf,
    /// Line number in the source file (1-based).
    pub line: u32,
}

impl Loc {
    /// Create a new location.
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self { path: path.into(), line }
    }

    /// Whether this location is inside the given file.
    pub fn is_in(&self, path: &Path) -> bool {
        self.path == path
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

impl FromStr for Loc {
    type Err = Error;

    /// Parses a location in the format `<path>:<line>`.
    ///
    /// The split happens at the last `:` so that paths containing colons
    /// (drive letters, odd file names) survive.
    fn from_str(s: &str) -> Result<Self> {
        let (path, line) =
            s.trim().rsplit_once(':').ok_or_else(|| eyre!("Expected <path>:<line>, got: {s}"))?;

        if path.is_empty() {
            return Err(eyre!("Missing path in location: {s}"));
        }

        let line = line.parse::<u32>().map_err(|e| eyre!("Invalid line number: {e}"))?;
        if line == 0 {
            return Err(eyre!("Line numbers are 1-based, got 0"));
        }

        Ok(Self::new(path, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_loc_equality_is_by_value() {
        let a = Loc::new("/src/main.c", 10);
        let b = Loc::new(PathBuf::from("/src/main.c"), 10);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&Loc::new("/src/main.c", 11)));
    }

    #[test]
    fn test_loc_display_and_parse() {
        let loc = Loc::new("/src/main.c", 42);
        assert_eq!(loc.to_string(), "/src/main.c:42");
        assert_eq!("/src/main.c:42".parse::<Loc>().unwrap(), loc);
    }

    #[test]
    fn test_loc_parse_splits_at_last_colon() {
        let loc: Loc = "C:/work/a.c:7".parse().unwrap();
        assert_eq!(loc.path, PathBuf::from("C:/work/a.c"));
        assert_eq!(loc.line, 7);
    }

    #[test]
    fn test_loc_parse_rejects_garbage() {
        assert!("main.c".parse::<Loc>().is_err());
        assert!(":12".parse::<Loc>().is_err());
        assert!("main.c:abc".parse::<Loc>().is_err());
        assert!("main.c:0".parse::<Loc>().is_err());
    }
}
