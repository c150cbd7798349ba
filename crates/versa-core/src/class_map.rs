//! Class-index mapping between human-readable labels and model output positions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{CoreError, Result};

/// Bijective mapping `label -> index` over the contiguous range `0..len`.
///
/// The mapping is validated on construction, so every value of this type can be
/// inverted without loss. It serializes as a plain JSON object
/// (`{"cat": 0, "dog": 1}`), which is also the format stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, usize>", into = "BTreeMap<String, usize>")]
pub struct ClassIndexMap {
    by_label: BTreeMap<String, usize>,
    by_index: Vec<String>,
}

impl ClassIndexMap {
    /// Build from an explicit `label -> index` mapping
    pub fn new(mapping: BTreeMap<String, usize>) -> Result<Self> {
        if mapping.is_empty() {
            return Err(CoreError::InvalidClassMap(
                "class index map must contain at least one label".to_string(),
            ));
        }

        let mut by_index: Vec<Option<String>> = vec![None; mapping.len()];
        for (label, &index) in &mapping {
            let slot = by_index.get_mut(index).ok_or_else(|| {
                CoreError::InvalidClassMap(format!(
                    "index {} for label '{}' is outside 0..{}",
                    index,
                    label,
                    mapping.len()
                ))
            })?;
            if let Some(existing) = slot {
                return Err(CoreError::InvalidClassMap(format!(
                    "labels '{}' and '{}' share index {}",
                    existing, label, index
                )));
            }
            *slot = Some(label.clone());
        }

        // Every slot is filled: n distinct indices inside 0..n
        let by_index = by_index.into_iter().flatten().collect();

        Ok(Self {
            by_label: mapping,
            by_index,
        })
    }

    /// Assign indices to labels in lexicographic order
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sorted: Vec<String> = labels.into_iter().map(Into::into).collect();
        sorted.sort();
        let before = sorted.len();
        sorted.dedup();
        if sorted.len() != before {
            return Err(CoreError::InvalidClassMap(
                "duplicate class labels".to_string(),
            ));
        }

        let mapping = sorted
            .into_iter()
            .enumerate()
            .map(|(index, label)| (label, index))
            .collect();
        Self::new(mapping)
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.by_index.get(index).map(String::as_str)
    }

    /// Labels ordered by index (the inverse mapping)
    pub fn labels(&self) -> &[String] {
        &self.by_index
    }

    /// Iterate `(label, index)` pairs ordered by label
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.by_label.iter().map(|(label, &index)| (label.as_str(), index))
    }

    /// Decode a score vector into the label at its argmax.
    ///
    /// Ties resolve to the lowest index. NaN scores never win.
    pub fn decode(&self, scores: &[f32]) -> Result<&str> {
        if scores.len() != self.len() {
            return Err(CoreError::Inference(format!(
                "score vector has {} entries but the class map has {}",
                scores.len(),
                self.len()
            )));
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, &score) in scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        let (index, _) = best.ok_or_else(|| {
            CoreError::Inference("score vector contains no comparable values".to_string())
        })?;
        Ok(&self.by_index[index])
    }

    /// Serialize to the JSON text stored alongside a model version
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.by_label)
            .map_err(|e| CoreError::InvalidClassMap(format!("Failed to serialize: {}", e)))
    }

    /// Parse the JSON text stored alongside a model version
    pub fn from_json(json: &str) -> Result<Self> {
        let mapping: BTreeMap<String, usize> = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidClassMap(format!("Failed to parse: {}", e)))?;
        Self::new(mapping)
    }
}

impl TryFrom<BTreeMap<String, usize>> for ClassIndexMap {
    type Error = CoreError;

    fn try_from(mapping: BTreeMap<String, usize>) -> Result<Self> {
        Self::new(mapping)
    }
}

impl From<ClassIndexMap> for BTreeMap<String, usize> {
    fn from(map: ClassIndexMap) -> Self {
        map.by_label
    }
}

impl fmt::Display for ClassIndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .by_index
            .iter()
            .enumerate()
            .map(|(index, label)| format!("{}={}", label, index))
            .collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}
