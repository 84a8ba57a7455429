// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use regex::Regex;

use crate::*;

/// Compile a glob pattern into an anchored regex.
///
/// Only `*` (any run of non-separator characters) and `**` (any run of
/// characters) are supported; `?`, `[` and `]` are rejected. The compiled
/// regex tolerates one trailing slash so pseudo-directory names match too.
pub fn compile_glob(pattern: &str) -> Result<Regex> {
    if pattern.contains('?') || pattern.contains('[') || pattern.contains(']') {
        return Err(Error::new(
            ErrorKind::Unsupported,
            "glob patterns only support `*` and `**`",
        )
        .with_context("pattern", pattern));
    }

    let mut regexp = String::from("^");
    for tok in split_stars(pattern) {
        match tok {
            "*" => regexp.push_str(r"[^/]*"),
            "**" => regexp.push_str(".*"),
            literal => regexp.push_str(&regex::escape(literal)),
        }
    }
    regexp.push_str("/?$");

    Regex::new(&regexp).map_err(|err| {
        Error::new(ErrorKind::Unexpected, "compiling glob pattern")
            .with_context("pattern", pattern)
            .with_source(err)
    })
}

/// Split a pattern into alternating literal and star-run tokens.
fn split_stars(pattern: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = pattern;
    while let Some(start) = rest.find('*') {
        if start > 0 {
            out.push(&rest[..start]);
        }
        let stars = rest[start..].len() - rest[start..].trim_start_matches('*').len();
        out.push(&rest[start..start + stars]);
        rest = &rest[start + stars..];
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_stars() {
        assert_eq!(split_stars("a*b"), vec!["a", "*", "b"]);
        assert_eq!(split_stars("**/x"), vec!["**", "/x"]);
        assert_eq!(split_stars("a"), vec!["a"]);
    }

    #[test]
    fn test_single_star_stops_at_separator() {
        let re = compile_glob("gs://bucket/dir/*b").unwrap();
        assert!(re.is_match("gs://bucket/dir/ab"));
        assert!(re.is_match("gs://bucket/dir/bb"));
        assert!(!re.is_match("gs://bucket/dir/sub/ab"));
    }

    #[test]
    fn test_star_in_middle() {
        let re = compile_glob("gs://bucket/dir/*/test.txt").unwrap();
        assert!(re.is_match("gs://bucket/dir/sub/test.txt"));
        assert!(!re.is_match("gs://bucket/dir/sub/sub/test.txt"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let re = compile_glob("gs://bucket/dir/**.txt").unwrap();
        assert!(re.is_match("gs://bucket/dir/test.txt"));
        assert!(re.is_match("gs://bucket/dir/sub/sub/test.txt"));
        assert!(!re.is_match("gs://bucket/dir/test.bin"));
    }

    #[test]
    fn test_trailing_slash_tolerated() {
        let re = compile_glob("gs://bucket/di*").unwrap();
        assert!(re.is_match("gs://bucket/dir/"));
        assert!(re.is_match("gs://bucket/dir"));
    }

    #[test]
    fn test_rejects_unsupported_punctuation() {
        for pattern in ["a?b", "a[0-9]", "x]"] {
            let err = compile_glob(pattern).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unsupported, "{pattern}");
        }
    }

    #[test]
    fn test_literal_escape() {
        let re = compile_glob("gs://bucket/a.b/*").unwrap();
        assert!(re.is_match("gs://bucket/a.b/c"));
        assert!(!re.is_match("gs://bucket/aXb/c"));
    }
}
