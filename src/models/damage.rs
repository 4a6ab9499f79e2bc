use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Number of measurements in a feature vector
pub const FEATURE_COUNT: usize = 7;

/// Canonical feature order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "damage_area",
    "damage_depth",
    "damage_point_count",
    "component_age",
    "usage_frequency",
    "corrosion_level",
    "deformation",
];

/// Ordinal damage severity. Declaration order is the fixed class ordering
/// used for model parameters, tie-breaks and confusion matrix rows/columns.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DamageLevel {
    #[serde(alias = "Ringan")]
    Ringan, // light
    #[serde(alias = "Sedang")]
    Sedang, // medium
    #[serde(alias = "Berat")]
    Berat, // severe
}

impl DamageLevel {
    /// Fixed class ordering
    pub const ALL: [DamageLevel; 3] = [DamageLevel::Ringan, DamageLevel::Sedang, DamageLevel::Berat];

    /// Number of classes
    pub const COUNT: usize = 3;

    /// Position in the fixed class ordering
    pub fn index(&self) -> usize {
        match self {
            DamageLevel::Ringan => 0,
            DamageLevel::Sedang => 1,
            DamageLevel::Berat => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse a label string, mapping unknown labels to `InvalidInput`
    pub fn parse_label(label: &str) -> Result<Self> {
        label.trim().parse().map_err(|_| {
            AppError::InvalidInput(format!(
                "unknown damage level '{}', expected one of: ringan, sedang, berat",
                label
            ))
        })
    }
}

/// The seven measurements describing a damaged component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageFeatures {
    /// Damage area in cm²
    pub damage_area: f64,

    /// Damage depth in mm
    pub damage_depth: f64,

    /// Number of damage points
    pub damage_point_count: f64,

    /// Component age in months
    pub component_age: f64,

    /// Usage intensity (1-10)
    pub usage_frequency: f64,

    /// Corrosion level (1-5)
    pub corrosion_level: f64,

    /// Deformation in mm
    pub deformation: f64,
}

impl DamageFeatures {
    /// Build from a vector in canonical order
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(AppError::InvalidInput(format!(
                "expected {} features, got {}",
                FEATURE_COUNT,
                values.len()
            )));
        }

        Ok(Self {
            damage_area: values[0],
            damage_depth: values[1],
            damage_point_count: values[2],
            component_age: values[3],
            usage_frequency: values[4],
            corrosion_level: values[5],
            deformation: values[6],
        })
    }

    /// Features in canonical order
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.damage_area,
            self.damage_depth,
            self.damage_point_count,
            self.component_age,
            self.usage_frequency,
            self.corrosion_level,
            self.deformation,
        ]
    }

    /// Check every measurement against its declared domain
    pub fn validate(&self) -> Result<()> {
        let values = self.to_vector();
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "{} must be a finite number",
                FEATURE_NAMES[pos]
            )));
        }

        check(self.damage_area >= 0.0, "damage_area must be >= 0")?;
        check(self.damage_depth >= 0.0, "damage_depth must be >= 0")?;
        check(self.damage_point_count > 0.0, "damage_point_count must be > 0")?;
        check(self.component_age > 0.0, "component_age must be > 0")?;
        check(
            (1.0..=10.0).contains(&self.usage_frequency),
            "usage_frequency must be between 1 and 10",
        )?;
        check(
            (1.0..=5.0).contains(&self.corrosion_level),
            "corrosion_level must be between 1 and 5",
        )?;
        check(self.deformation >= 0.0, "deformation must be >= 0")?;

        Ok(())
    }
}

fn check(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(AppError::InvalidInput(message.to_string()))
    }
}

/// A labeled damage observation as supplied by the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    /// Measurements
    #[serde(flatten)]
    pub features: DamageFeatures,

    /// Assessed severity
    pub damage_level: DamageLevel,

    /// Free-form inspector notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl DamageRecord {
    pub fn new(features: DamageFeatures, damage_level: DamageLevel) -> Self {
        Self {
            features,
            damage_level,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_features() -> DamageFeatures {
        DamageFeatures {
            damage_area: 5.5,
            damage_depth: 1.2,
            damage_point_count: 3.0,
            component_age: 12.0,
            usage_frequency: 5.0,
            corrosion_level: 2.0,
            deformation: 0.8,
        }
    }

    #[test]
    fn test_damage_level_ordering() {
        assert_eq!(DamageLevel::ALL.len(), DamageLevel::COUNT);
        for (i, level) in DamageLevel::ALL.iter().enumerate() {
            assert_eq!(level.index(), i);
            assert_eq!(DamageLevel::from_index(i), Some(*level));
        }
        assert_eq!(DamageLevel::from_index(3), None);
        assert!(DamageLevel::Ringan < DamageLevel::Berat);
    }

    #[test]
    fn test_damage_level_parsing_is_case_insensitive() {
        assert_eq!(DamageLevel::parse_label("ringan").unwrap(), DamageLevel::Ringan);
        assert_eq!(DamageLevel::parse_label("Sedang").unwrap(), DamageLevel::Sedang);
        assert_eq!(DamageLevel::parse_label(" BERAT ").unwrap(), DamageLevel::Berat);
        assert!(matches!(
            DamageLevel::parse_label("parah"),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(DamageLevel::Sedang.to_string(), "sedang");
    }

    #[test]
    fn test_damage_level_serde() {
        assert_eq!(
            serde_json::to_string(&DamageLevel::Berat).unwrap(),
            "\"berat\""
        );
        let level: DamageLevel = serde_json::from_str("\"Ringan\"").unwrap();
        assert_eq!(level, DamageLevel::Ringan);
    }

    #[test]
    fn test_features_vector_roundtrip() {
        let features = sample_features();
        let vector = features.to_vector();
        assert_eq!(vector, [5.5, 1.2, 3.0, 12.0, 5.0, 2.0, 0.8]);
        assert_eq!(DamageFeatures::from_slice(&vector).unwrap(), features);
        assert!(DamageFeatures::from_slice(&vector[..6]).is_err());
    }

    #[test]
    fn test_features_validation() {
        assert!(sample_features().validate().is_ok());

        let mut bad = sample_features();
        bad.usage_frequency = 11.0;
        assert!(bad.validate().is_err());

        let mut bad = sample_features();
        bad.corrosion_level = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = sample_features();
        bad.component_age = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = sample_features();
        bad.damage_depth = f64::NAN;
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("damage_depth"));
    }

    #[test]
    fn test_record_deserializes_flat_json() {
        let json = r#"{
            "damage_area": 5.5, "damage_depth": 1.2, "damage_point_count": 3,
            "component_age": 12, "usage_frequency": 5, "corrosion_level": 2,
            "deformation": 0.8, "damage_level": "Sedang"
        }"#;
        let record: DamageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.features, sample_features());
        assert_eq!(record.damage_level, DamageLevel::Sedang);
        assert!(record.notes.is_none());
    }
}
