use regex::Regex;

use crate::core::error::{InstallerError, InstallerResult};

/// A set of path globs compiled into one anchored alternation.
///
/// `**` spans path segments, `*` stays within one segment and `?` matches a
/// single non-separator character.
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    regex: Option<Regex>,
}

impl GlobSet {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> InstallerResult<Self> {
        let alternatives: Vec<String> = globs
            .iter()
            .map(|g| g.as_ref().trim())
            .filter(|g| !g.is_empty())
            .map(glob_to_regex)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self::default());
        }

        let pattern = format!("^(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&pattern).map_err(|e| {
            InstallerError::InvalidParameter(format!("invalid exclusion glob: {}", e))
        })?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(path))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let glob = glob.replace('\\', "/");
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out
}
