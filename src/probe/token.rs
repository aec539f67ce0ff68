//! Session token extraction from process invocation metadata

use regex::Regex;

use crate::core::types::SessionToken;

/// Finds the session token on a backend command line
#[derive(Debug, Clone)]
pub struct TokenMatcher {
    process_name: String,
    required_markers: Vec<String>,
    pattern: Regex,
}

impl TokenMatcher {
    /// Build a matcher for `<token_flag> <hyphenated lowercase hex>`
    pub fn new(
        process_name: impl Into<String>,
        token_flag: &str,
        required_markers: Vec<String>,
    ) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"{}[\s=]+([0-9a-f]+(?:-[0-9a-f]+)*)\b",
            regex::escape(token_flag)
        ))?;
        Ok(Self {
            process_name: process_name.into(),
            required_markers,
            pattern,
        })
    }

    /// Whether this command line belongs to the monitored backend
    pub fn is_backend(&self, command_line: &str) -> bool {
        command_line.contains(&self.process_name)
            && self
                .required_markers
                .iter()
                .all(|marker| command_line.contains(marker.as_str()))
    }

    /// Token on this command line, if it is a backend invocation carrying one
    pub fn extract(&self, command_line: &str) -> Option<SessionToken> {
        if !self.is_backend(command_line) {
            return None;
        }
        self.pattern
            .captures(command_line)
            .and_then(|caps| caps.get(1))
            .map(|m| SessionToken::new(m.as_str()))
    }

    /// First token found across several command lines
    pub fn find<'a>(&self, command_lines: impl IntoIterator<Item = &'a str>) -> Option<SessionToken> {
        command_lines.into_iter().find_map(|line| self.extract(line))
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> TokenMatcher {
        TokenMatcher::new("language_server", "csrf_token", vec!["workspace_id".to_string()]).unwrap()
    }

    const BACKEND: &str = "/opt/ide/bin/language_server_linux_x64 --enable_lsp --csrf_token 3f2a9c1e-77b0-4d2e-9a41-0c5e8d1b2f6a --workspace_id file_home_dev --random_port";

    #[test]
    fn extracts_hyphenated_hex_token() {
        let token = matcher().extract(BACKEND).unwrap();
        assert_eq!(token.as_str(), "3f2a9c1e-77b0-4d2e-9a41-0c5e8d1b2f6a");
    }

    #[test]
    fn accepts_equals_separator() {
        let line = "language_server --workspace_id w --csrf_token=abc123-def";
        assert_eq!(matcher().extract(line).unwrap().as_str(), "abc123-def");
    }

    #[test]
    fn requires_markers_and_process_name() {
        let no_marker = "language_server --csrf_token 3f2a9c1e-77b0";
        assert_eq!(matcher().extract(no_marker), None);

        let other_process = "grep csrf_token workspace_id 3f2a";
        assert_eq!(matcher().extract(other_process), None);
    }

    #[test]
    fn uppercase_or_missing_token_is_absent() {
        let upper = "language_server --workspace_id w --csrf_token ABCDEF";
        assert_eq!(matcher().extract(upper), None);
        let missing = "language_server --workspace_id w";
        assert_eq!(matcher().extract(missing), None);
    }

    #[test]
    fn find_returns_first_match() {
        let lines = ["bash", BACKEND, "language_server --workspace_id w --csrf_token aaaa"];
        let token = matcher().find(lines.iter().copied()).unwrap();
        assert!(token.as_str().starts_with("3f2a9c1e"));
    }
}
