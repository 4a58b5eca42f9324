use crate::error::{Error, Result};

/// A raw byte signature with optional single-byte wildcards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSignature {
    name: String,
    pattern: Vec<Option<u8>>,
}

impl ByteSignature {
    /// Parse IDA-style pattern text, e.g. `"45 33 C9 ?? E8"`
    pub fn parse(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: parse_pattern(pattern)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length, wildcards included
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn pattern(&self) -> &[Option<u8>] {
        &self.pattern
    }

    /// Matched length if the first `len()` bytes of `window` fit the pattern
    pub fn match_window(&self, window: &[u8]) -> Option<usize> {
        if window.len() < self.pattern.len() {
            return None;
        }

        let matched = self
            .pattern
            .iter()
            .zip(window)
            .all(|(expected, actual)| expected.is_none_or(|value| value == *actual));

        matched.then_some(self.pattern.len())
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidSignature(
            "Signature pattern is empty".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
