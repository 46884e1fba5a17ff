use std::collections::VecDeque;

use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub aqi: f64,
}

/// Rolling AQI history feeding the chart. Holds at most `capacity` points,
/// dropping the oldest one whenever an append overflows.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    capacity: usize,
    points: VecDeque<ChartPoint>,
}

impl Default for ChartSeries {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChartSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn append(&mut self, label: impl Into<String>, aqi: f64) {
        self.points.push_back(ChartPoint {
            label: label.into(),
            aqi,
        });
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn first(&self) -> Option<&ChartPoint> {
        self.points.front()
    }

    pub fn last(&self) -> Option<&ChartPoint> {
        self.points.back()
    }

    /// Y range for plotting. Starts at zero like the web chart's
    /// `beginAtZero`, with a little headroom above the max.
    pub fn bounds(&self) -> [f64; 2] {
        let max = self
            .points
            .iter()
            .map(|p| p.aqi)
            .fold(f64::MIN, f64::max);
        let min = self
            .points
            .iter()
            .map(|p| p.aqi)
            .fold(0.0, f64::min);

        if self.points.is_empty() || max <= min {
            return [min, min + 1.0];
        }
        [min, max + (max - min) * 0.12]
    }
}
