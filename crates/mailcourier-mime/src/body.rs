//! Text body parts.

use std::fmt;

/// A single textual body (plain or HTML), empty by default.
///
/// Implements [`fmt::Write`], so content can be appended with `write!`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyPart(String);

impl BodyPart {
    /// Creates an empty body part.
    #[must_use]
    pub const fn new() -> Self {
        Self(String::new())
    }

    /// Replaces the content.
    pub fn set(&mut self, content: impl Into<String>) {
        self.0 = content.into();
    }

    /// Appends to the content.
    pub fn push_str(&mut self, content: &str) {
        self.0.push_str(content);
    }

    /// Removes all content.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the content length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the part has no content.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Write for BodyPart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.push_str(s);
        Ok(())
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BodyPart {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BodyPart {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    #[test]
    fn test_default_is_empty() {
        let part = BodyPart::new();
        assert!(part.is_empty());
        assert_eq!(part.as_str(), "");
    }

    #[test]
    fn test_set_replaces() {
        let mut part = BodyPart::from("old");
        part.set("new");
        assert_eq!(part.as_str(), "new");
        assert_eq!(part.len(), 3);
    }

    #[test]
    fn test_write_appends() {
        let mut part = BodyPart::new();
        write!(part, "Invoice {}", 42).unwrap();
        part.push_str(" attached");
        assert_eq!(part.to_string(), "Invoice 42 attached");

        part.clear();
        assert!(part.is_empty());
    }
}
