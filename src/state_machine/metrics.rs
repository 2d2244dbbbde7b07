//! Clinical metrics record and plausibility ranges

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of inputs the classifier expects.
pub const FEATURE_COUNT: usize = 8;

/// Defaults substituted for absent optional fields. These mirror the
/// population medians the classifier was trained with.
pub const DEFAULT_PREGNANCIES: f64 = 0.0;
pub const DEFAULT_BLOOD_PRESSURE: f64 = 70.0;
pub const DEFAULT_SKIN_THICKNESS: f64 = 20.0;
pub const DEFAULT_INSULIN: f64 = 79.0;
pub const DEFAULT_PEDIGREE: f64 = 0.47;

/// A metric key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Age,
    Glucose,
    Bmi,
    Pregnancies,
    BloodPressure,
    SkinThickness,
    Insulin,
    Pedigree,
}

impl MetricField {
    /// Fields that must be present before validation can run
    pub const REQUIRED: [MetricField; 3] = [MetricField::Age, MetricField::Glucose, MetricField::Bmi];

    pub const ALL: [MetricField; 8] = [
        MetricField::Age,
        MetricField::Glucose,
        MetricField::Bmi,
        MetricField::Pregnancies,
        MetricField::BloodPressure,
        MetricField::SkinThickness,
        MetricField::Insulin,
        MetricField::Pedigree,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricField::Age => "age",
            MetricField::Glucose => "glucose",
            MetricField::Bmi => "bmi",
            MetricField::Pregnancies => "pregnancies",
            MetricField::BloodPressure => "blood_pressure",
            MetricField::SkinThickness => "skin_thickness",
            MetricField::Insulin => "insulin",
            MetricField::Pedigree => "pedigree",
        }
    }

    /// Human-readable name used in assistant turns and reports
    pub fn label(self) -> &'static str {
        match self {
            MetricField::Age => "Age",
            MetricField::Glucose => "Glucose",
            MetricField::Bmi => "BMI",
            MetricField::Pregnancies => "Pregnancies",
            MetricField::BloodPressure => "Blood pressure",
            MetricField::SkinThickness => "Skin thickness",
            MetricField::Insulin => "Insulin",
            MetricField::Pedigree => "Diabetes pedigree",
        }
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured clinical measurements collected from the conversation.
///
/// Also used as a partial update: an extraction result is a `Metrics` with
/// only the recognized fields set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glucose: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pregnancies: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedigree: Option<f64>,
}

impl Metrics {
    pub fn get(&self, field: MetricField) -> Option<f64> {
        match field {
            MetricField::Age => self.age,
            MetricField::Glucose => self.glucose,
            MetricField::Bmi => self.bmi,
            MetricField::Pregnancies => self.pregnancies,
            MetricField::BloodPressure => self.blood_pressure,
            MetricField::SkinThickness => self.skin_thickness,
            MetricField::Insulin => self.insulin,
            MetricField::Pedigree => self.pedigree,
        }
    }

    pub fn set(&mut self, field: MetricField, value: f64) {
        let slot = match field {
            MetricField::Age => &mut self.age,
            MetricField::Glucose => &mut self.glucose,
            MetricField::Bmi => &mut self.bmi,
            MetricField::Pregnancies => &mut self.pregnancies,
            MetricField::BloodPressure => &mut self.blood_pressure,
            MetricField::SkinThickness => &mut self.skin_thickness,
            MetricField::Insulin => &mut self.insulin,
            MetricField::Pedigree => &mut self.pedigree,
        };
        *slot = Some(value);
    }

    /// Present fields with their values, in declaration order
    pub fn present(&self) -> impl Iterator<Item = (MetricField, f64)> + '_ {
        MetricField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
    }

    /// Overwrite each field present in `update`. Fields absent from the
    /// update are kept as they are; nothing is ever cleared.
    ///
    /// Returns true if any stored value changed.
    pub fn merge(&mut self, update: &Metrics) -> bool {
        let before = self.clone();
        for (field, value) in update.present() {
            if value.is_finite() {
                self.set(field, value);
            }
        }
        before != *self
    }

    /// Required fields that are still absent
    pub fn missing_required(&self) -> Vec<MetricField> {
        MetricField::REQUIRED
            .into_iter()
            .filter(|field| self.get(*field).is_none())
            .collect()
    }

    pub fn has_required(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Build the classifier input in the order the model artifact was
    /// trained with: pregnancies, glucose, blood pressure, skin thickness,
    /// insulin, BMI, pedigree, age.
    ///
    /// Returns None unless the required fields are present.
    pub fn features(&self) -> Option<FeatureVector> {
        Some(FeatureVector([
            self.pregnancies.unwrap_or(DEFAULT_PREGNANCIES),
            self.glucose?,
            self.blood_pressure.unwrap_or(DEFAULT_BLOOD_PRESSURE),
            self.skin_thickness.unwrap_or(DEFAULT_SKIN_THICKNESS),
            self.insulin.unwrap_or(DEFAULT_INSULIN),
            self.bmi?,
            self.pedigree.unwrap_or(DEFAULT_PEDIGREE),
            self.age?,
        ]))
    }
}

/// Fixed-order classifier input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

// ============================================================================
// Validation ranges
// ============================================================================

/// Inclusive plausibility range for one field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    pub min: f64,
    pub max: f64,
}

impl RangeBound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// A field whose value fell outside its range
#[derive(Debug, Clone, PartialEq)]
pub struct RangeViolation {
    pub field: MetricField,
    pub value: f64,
    pub range: RangeBound,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) is outside the realistic range of {}",
            self.field.label(),
            self.value,
            self.range
        )
    }
}

/// Plausibility policy, one range per field.
///
/// The bounds are policy rather than physiology, so they are loaded from
/// configuration; `Default` carries the stock table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationRanges {
    pub age: RangeBound,
    pub glucose: RangeBound,
    pub bmi: RangeBound,
    pub pregnancies: RangeBound,
    pub blood_pressure: RangeBound,
    pub skin_thickness: RangeBound,
    pub insulin: RangeBound,
    pub pedigree: RangeBound,
}

impl Default for ValidationRanges {
    fn default() -> Self {
        Self {
            age: RangeBound::new(1.0, 120.0),
            glucose: RangeBound::new(20.0, 600.0),
            bmi: RangeBound::new(10.0, 70.0),
            pregnancies: RangeBound::new(0.0, 20.0),
            blood_pressure: RangeBound::new(20.0, 200.0),
            skin_thickness: RangeBound::new(1.0, 100.0),
            insulin: RangeBound::new(0.0, 900.0),
            pedigree: RangeBound::new(0.01, 3.0),
        }
    }
}

impl ValidationRanges {
    pub fn bound(&self, field: MetricField) -> RangeBound {
        match field {
            MetricField::Age => self.age,
            MetricField::Glucose => self.glucose,
            MetricField::Bmi => self.bmi,
            MetricField::Pregnancies => self.pregnancies,
            MetricField::BloodPressure => self.blood_pressure,
            MetricField::SkinThickness => self.skin_thickness,
            MetricField::Insulin => self.insulin,
            MetricField::Pedigree => self.pedigree,
        }
    }

    /// Every present field that is out of range, in field order
    pub fn violations(&self, metrics: &Metrics) -> Vec<RangeViolation> {
        metrics
            .present()
            .filter_map(|(field, value)| {
                let range = self.bound(field);
                (!range.contains(value)).then_some(RangeViolation { field, value, range })
            })
            .collect()
    }

    /// Reject tables where a bound is inverted or not finite
    pub fn check(&self) -> Result<(), String> {
        for field in MetricField::ALL {
            let range = self.bound(field);
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(format!("invalid range for {field}: {range}"));
            }
        }
        Ok(())
    }
}
