use chrono::Local;
use serde::Serialize;

use crate::aqi::{classify, AqiClassification};
use crate::series::ChartSeries;
use crate::snapshot::SensorSnapshot;

pub mod ids {
    pub const AQI_VALUE: &str = "aqiValue";
    pub const AQI_CIRCLE: &str = "aqiCircle";
    pub const AQI_CATEGORY: &str = "aqiCategory";
    pub const AIR_SCORE_BAR: &str = "airScoreBar";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const NOISE: &str = "noise";
    pub const PM25: &str = "pm25";
    pub const DEVICE_STATUS: &str = "deviceStatus";
    pub const FIRE_ALERT: &str = "fireAlert";
    pub const SPRINKLER_STATUS: &str = "sprinklerStatus";
    pub const BUZZER_STATUS: &str = "buzzerStatus";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Block,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleProp {
    BackgroundColor(String),
    Display(DisplayMode),
    WidthPercent(u8),
}

/// Element-addressed view layer.
pub trait ViewSurface {
    fn set_text(&mut self, id: &str, text: &str);
    fn set_class(&mut self, id: &str, class: &str);
    fn set_style(&mut self, id: &str, style: StyleProp);
}

pub trait ChartSurface {
    fn redraw(&mut self, series: &ChartSeries);
}

/// Everything shown for one snapshot, already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayModel {
    pub aqi_label: String,
    pub classification: AqiClassification,
    pub temperature: String,
    pub humidity: String,
    pub noise: String,
    pub pm25: String,
    pub online: bool,
    pub status_label: &'static str,
    pub status_class: &'static str,
    pub fire_alert: DisplayMode,
    pub sprinkler: String,
    pub buzzer: String,
}

impl DisplayModel {
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        let (status_label, status_class) = if snapshot.online {
            ("Online", "status-badge status-online")
        } else {
            ("Offline", "status-badge status-offline")
        };

        Self {
            aqi_label: format!("AQI: {}", to_fixed(snapshot.aqi, 0)),
            classification: classify(snapshot.aqi),
            temperature: to_fixed(snapshot.temperature, 1),
            humidity: to_fixed(snapshot.humidity, 1),
            noise: to_fixed(snapshot.noise, 0),
            pm25: to_fixed(snapshot.pm2_5, 1),
            online: snapshot.online,
            status_label,
            status_class,
            fire_alert: if snapshot.alarm_active() {
                DisplayMode::Block
            } else {
                DisplayMode::None
            },
            sprinkler: snapshot.sprinkler.to_uppercase(),
            buzzer: snapshot.buzzer.to_uppercase(),
        }
    }

    pub fn badge_class(&self) -> String {
        format!("badge bg-{}", self.classification.category_class.as_str())
    }

    pub fn progress_class(&self) -> String {
        format!("progress-bar bg-{}", self.classification.category_class.as_str())
    }

    pub fn apply<V: ViewSurface + ?Sized>(&self, view: &mut V) {
        let score = self.classification.score;
        let score_text = score.to_string();

        view.set_text(ids::AQI_VALUE, &self.aqi_label);

        view.set_style(
            ids::AQI_CIRCLE,
            StyleProp::BackgroundColor(self.classification.color_hex.to_string()),
        );
        view.set_text(ids::AQI_CIRCLE, &score_text);

        view.set_text(ids::AQI_CATEGORY, self.classification.category_label);
        view.set_class(ids::AQI_CATEGORY, &self.badge_class());

        view.set_style(ids::AIR_SCORE_BAR, StyleProp::WidthPercent(score));
        view.set_text(ids::AIR_SCORE_BAR, &score_text);
        view.set_class(ids::AIR_SCORE_BAR, &self.progress_class());

        view.set_text(ids::TEMPERATURE, &self.temperature);
        view.set_text(ids::HUMIDITY, &self.humidity);
        view.set_text(ids::NOISE, &self.noise);
        view.set_text(ids::PM25, &self.pm25);

        view.set_text(ids::DEVICE_STATUS, self.status_label);
        view.set_class(ids::DEVICE_STATUS, self.status_class);

        view.set_style(ids::FIRE_ALERT, StyleProp::Display(self.fire_alert));

        view.set_text(ids::SPRINKLER_STATUS, &self.sprinkler);
        view.set_text(ids::BUZZER_STATUS, &self.buzzer);
    }
}

/// Fixed-point formatting where an exact tie rounds away from zero.
///
/// `{:.N}` alone rounds exact ties to even, which would show 50.5 as "50"
/// next to a Moderate badge.
pub fn to_fixed(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let magnitude = value.abs();
    // Wide enough to hold the exact decimal expansion of any f64.
    let exact = format!("{magnitude:.1100}");
    let exact = exact.trim_end_matches('0');
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((exact, ""));

    let rounded = if frac_part.len() == digits + 1 && frac_part.ends_with('5') {
        round_up_decimal(int_part, &frac_part[..digits])
    } else {
        format!("{magnitude:.digits$}")
    };

    if value < 0.0 {
        format!("-{rounded}")
    } else {
        rounded
    }
}

fn round_up_decimal(int_part: &str, kept: &str) -> String {
    let mut digits: Vec<u8> = int_part.bytes().chain(kept.bytes()).collect();
    let mut carry = true;
    for d in digits.iter_mut().rev() {
        if *d == b'9' {
            *d = b'0';
        } else {
            *d += 1;
            carry = false;
            break;
        }
    }
    if carry {
        digits.insert(0, b'1');
    }

    let split = digits.len() - kept.len();
    let (int_digits, frac_digits) = digits.split_at(split);
    let int_digits = String::from_utf8_lossy(int_digits);
    if frac_digits.is_empty() {
        int_digits.into_owned()
    } else {
        format!("{int_digits}.{}", String::from_utf8_lossy(frac_digits))
    }
}

pub fn local_time_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub struct Renderer<V, C> {
    view: V,
    chart: C,
    series: ChartSeries,
}

impl<V: ViewSurface, C: ChartSurface> Renderer<V, C> {
    pub fn new(view: V, chart: C, series: ChartSeries) -> Self {
        Self {
            view,
            chart,
            series,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }

    pub fn series(&self) -> &ChartSeries {
        &self.series
    }

    pub fn render(&mut self, snapshot: Option<&SensorSnapshot>) {
        self.render_at(snapshot, local_time_label());
    }

    /// Pushes one snapshot into the view and chart. A missing snapshot leaves
    /// everything as it was.
    pub fn render_at(&mut self, snapshot: Option<&SensorSnapshot>, label: impl Into<String>) {
        let Some(snapshot) = snapshot else {
            return;
        };

        DisplayModel::from_snapshot(snapshot).apply(&mut self.view);

        self.series.append(label, snapshot.aqi);
        self.chart.redraw(&self.series);
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::renderer;
    use super::*;

    fn example_snapshot() -> SensorSnapshot {
        SensorSnapshot::from_value(&json!({
            "aqi": 175,
            "temperature": 22.3,
            "humidity": 55.6,
            "noise": 40,
            "pm2_5": 12.4,
            "online": true,
            "fire": false,
            "smoke": false,
            "sprinkler": "on",
            "buzzer": "off"
        }))
        .expect("object is a snapshot")
    }

    #[test]
    fn example_reading_renders_every_widget() {
        // Arrange
        let mut r = renderer();

        // Act
        r.render_at(Some(&example_snapshot()), "12:00:00");

        // Assert
        let view = r.view();
        assert_eq!(view.text(ids::AQI_VALUE), Some("AQI: 175"));
        assert_eq!(view.text(ids::AQI_CIRCLE), Some("40"));
        assert_eq!(
            view.last_style(ids::AQI_CIRCLE),
            Some(&StyleProp::BackgroundColor("#dc3545".to_string()))
        );
        assert_eq!(view.text(ids::AQI_CATEGORY), Some("Unhealthy"));
        assert_eq!(view.class(ids::AQI_CATEGORY), Some("badge bg-danger"));
        assert_eq!(view.last_style(ids::AIR_SCORE_BAR), Some(&StyleProp::WidthPercent(40)));
        assert_eq!(view.text(ids::AIR_SCORE_BAR), Some("40"));
        assert_eq!(view.class(ids::AIR_SCORE_BAR), Some("progress-bar bg-danger"));
        assert_eq!(view.text(ids::TEMPERATURE), Some("22.3"));
        assert_eq!(view.text(ids::HUMIDITY), Some("55.6"));
        assert_eq!(view.text(ids::NOISE), Some("40"));
        assert_eq!(view.text(ids::PM25), Some("12.4"));
        assert_eq!(view.text(ids::DEVICE_STATUS), Some("Online"));
        assert_eq!(view.class(ids::DEVICE_STATUS), Some("status-badge status-online"));
        assert_eq!(
            view.last_style(ids::FIRE_ALERT),
            Some(&StyleProp::Display(DisplayMode::None))
        );
        assert_eq!(view.text(ids::SPRINKLER_STATUS), Some("ON"));
        assert_eq!(view.text(ids::BUZZER_STATUS), Some("OFF"));

        assert_eq!(r.series().len(), 1);
        assert_eq!(r.chart().redraws, 1);
    }

    #[test]
    fn empty_record_renders_defaults() {
        let mut r = renderer();
        let snapshot = SensorSnapshot::from_value(&json!({})).expect("object is a snapshot");

        r.render_at(Some(&snapshot), "12:00:00");

        let view = r.view();
        assert_eq!(view.text(ids::AQI_VALUE), Some("AQI: 0"));
        assert_eq!(view.text(ids::AQI_CATEGORY), Some("Good"));
        assert_eq!(view.text(ids::AQI_CIRCLE), Some("100"));
        assert_eq!(view.text(ids::TEMPERATURE), Some("0.0"));
        assert_eq!(view.text(ids::HUMIDITY), Some("0.0"));
        assert_eq!(view.text(ids::NOISE), Some("0"));
        assert_eq!(view.text(ids::SPRINKLER_STATUS), Some("OFF"));
        assert_eq!(view.text(ids::BUZZER_STATUS), Some("OFF"));
        assert_eq!(view.text(ids::DEVICE_STATUS), Some("Offline"));
        assert_eq!(
            view.last_style(ids::FIRE_ALERT),
            Some(&StyleProp::Display(DisplayMode::None))
        );
    }

    #[test]
    fn either_alarm_shows_fire_alert() {
        for (fire, smoke, expected) in [
            (true, false, DisplayMode::Block),
            (false, true, DisplayMode::Block),
            (true, true, DisplayMode::Block),
            (false, false, DisplayMode::None),
        ] {
            let snapshot = SensorSnapshot {
                fire,
                smoke,
                ..SensorSnapshot::default()
            };
            assert_eq!(DisplayModel::from_snapshot(&snapshot).fire_alert, expected);
        }
    }

    #[test]
    fn numbers_are_rounded_not_truncated() {
        let snapshot = SensorSnapshot {
            aqi: 49.6,
            temperature: 21.96,
            humidity: 40.04,
            noise: 55.7,
            ..SensorSnapshot::default()
        };

        let model = DisplayModel::from_snapshot(&snapshot);

        assert_eq!(model.aqi_label, "AQI: 50");
        assert_eq!(model.temperature, "22.0");
        assert_eq!(model.humidity, "40.0");
        assert_eq!(model.noise, "56");
    }

    #[test]
    fn exact_ties_round_away_from_zero() {
        let snapshot = SensorSnapshot {
            aqi: 50.5,
            temperature: 22.25,
            noise: 40.5,
            ..SensorSnapshot::default()
        };

        let model = DisplayModel::from_snapshot(&snapshot);

        assert_eq!(model.aqi_label, "AQI: 51");
        assert_eq!(model.classification.category_label, "Moderate");
        assert_eq!(model.temperature, "22.3");
        assert_eq!(model.noise, "41");
    }

    #[test]
    fn to_fixed_carries_and_keeps_sign() {
        assert_eq!(to_fixed(99.5, 0), "100");
        assert_eq!(to_fixed(9.95, 1), "9.9");
        assert_eq!(to_fixed(0.5, 0), "1");
        assert_eq!(to_fixed(-2.5, 0), "-3");
        assert_eq!(to_fixed(-0.25, 1), "-0.3");
        assert_eq!(to_fixed(0.0, 1), "0.0");
        assert_eq!(to_fixed(12.4, 1), "12.4");
        assert_eq!(to_fixed(175.0, 0), "175");
    }

    #[test]
    fn absent_snapshot_changes_nothing() {
        // Arrange
        let mut r = renderer();
        r.render_at(Some(&example_snapshot()), "12:00:00");
        let before = r.view().clone();

        // Act
        r.render_at(None, "12:00:01");

        // Assert
        assert_eq!(r.view(), &before);
        assert_eq!(r.series().len(), 1);
        assert_eq!(r.chart().redraws, 1);
    }

    #[test]
    fn rerender_is_pure_but_appends_each_time() {
        let mut r = renderer();
        let snapshot = example_snapshot();

        r.render_at(Some(&snapshot), "12:00:00");
        let first = r.view().elements.clone();
        r.render_at(Some(&snapshot), "12:00:01");

        assert_eq!(r.view().elements, first);
        assert_eq!(r.series().len(), 2);
    }

    #[test]
    fn chart_is_capped_after_many_updates() {
        let mut r = renderer();

        for i in 0..25 {
            let snapshot = SensorSnapshot {
                aqi: i as f64,
                ..SensorSnapshot::default()
            };
            r.render_at(Some(&snapshot), format!("t{i}"));
        }

        assert_eq!(r.series().len(), 20);
        assert_eq!(r.chart().last_len, 20);
        assert_eq!(r.series().first().map(|p| p.aqi), Some(5.0));
        assert_eq!(r.series().last().map(|p| p.aqi), Some(24.0));
    }
}
