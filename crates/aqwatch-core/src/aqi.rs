use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryClass {
    Success,
    Warning,
    Danger,
    Dark,
}

impl CategoryClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryClass::Success => "success",
            CategoryClass::Warning => "warning",
            CategoryClass::Danger => "danger",
            CategoryClass::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AqiClassification {
    pub score: u8,
    pub color_hex: &'static str,
    pub category_label: &'static str,
    pub category_class: CategoryClass,
}

struct Band {
    upper: f64,
    classification: AqiClassification,
}

const fn band(
    upper: f64,
    score: u8,
    color_hex: &'static str,
    category_label: &'static str,
    category_class: CategoryClass,
) -> Band {
    Band {
        upper,
        classification: AqiClassification {
            score,
            color_hex,
            category_label,
            category_class,
        },
    }
}

// Upper bounds are inclusive, scanned in ascending order.
const BANDS: [Band; 5] = [
    band(50.0, 100, "#28a745", "Good", CategoryClass::Success),
    band(100.0, 80, "#ffc107", "Moderate", CategoryClass::Warning),
    band(150.0, 60, "#fd7e14", "Unhealthy for Sensitive", CategoryClass::Warning),
    band(200.0, 40, "#dc3545", "Unhealthy", CategoryClass::Danger),
    band(300.0, 20, "#6f42c1", "Very Unhealthy", CategoryClass::Danger),
];

const HAZARDOUS: AqiClassification = AqiClassification {
    score: 0,
    color_hex: "#5a0d0d",
    category_label: "Hazardous",
    category_class: CategoryClass::Dark,
};

pub fn classify(aqi: f64) -> AqiClassification {
    BANDS
        .iter()
        .find(|b| aqi <= b.upper)
        .map(|b| b.classification)
        .unwrap_or(HAZARDOUS)
}
