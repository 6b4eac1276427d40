//! Road damage label set

use crate::error::DetectionError;

/// Damage categories the RDD model was trained on, in class-index order
pub const ROAD_DAMAGE_CLASSES: &[&str] = &[
    "Longitudinal Crack",
    "Transverse Crack",
    "Alligator Crack",
    "Potholes",
];

/// Fixed, ordered sequence of class names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The four road damage categories
    pub fn road_damage() -> Self {
        Self::new(ROAD_DAMAGE_CLASSES.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve a raw class index to its label
    pub fn resolve(&self, class_id: i64) -> Result<(usize, &str), DetectionError> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.names.get(idx).map(|name| (idx, name.as_str())))
            .ok_or(DetectionError::OutOfRangeClass {
                class_id,
                label_count: self.names.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::road_damage()
    }
}
