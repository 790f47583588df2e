//! Small validated value types shared across the Ark crates.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// Holds upload file names and the signing key. The input is trimmed of leading and
/// trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_input() {
        let text = NonEmptyText::new("  IMG_0001.CR2 ").unwrap();
        assert_eq!(text.as_str(), "IMG_0001.CR2");
    }

    #[test]
    fn test_new_rejects_blank() {
        assert!(matches!(NonEmptyText::new(""), Err(TextError::Empty)));
        assert!(matches!(NonEmptyText::new(" \t\n"), Err(TextError::Empty)));
    }

    #[test]
    fn test_deserialize_rejects_empty_string() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"   \"");
        assert!(result.is_err());

        let ok: NonEmptyText = serde_json::from_str("\"/archive/2023/06/15/a.jpg\"").unwrap();
        assert_eq!(ok.to_string(), "/archive/2023/06/15/a.jpg");
    }
}
