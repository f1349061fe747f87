//! Displayable model metadata.

use std::fmt;

/// One labelled line of model metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub label: String,
    pub value: String,
}

/// Ordered (label, text) pairs describing a loaded model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    fields: Vec<MetadataField>,
}

impl ModelInfo {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field, keeping insertion order.
    pub fn push(&mut self, label: impl Into<String>, value: impl fmt::Display) {
        self.fields.push(MetadataField {
            label: label.into(),
            value: value.to_string(),
        });
    }

    /// Builder-style variant of [`ModelInfo::push`].
    #[must_use]
    pub fn with(mut self, label: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push(label, value);
        self
    }

    /// Look up the first field with the given label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.label == label)
            .map(|field| field.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataField> {
        self.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .fields
            .iter()
            .map(|field| field.label.chars().count())
            .max()
            .unwrap_or(0);

        for field in &self.fields {
            writeln!(f, "{:<width$}  {}", field.label, field.value)?;
        }
        Ok(())
    }
}

/// Format a byte count as a short human-readable size.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
