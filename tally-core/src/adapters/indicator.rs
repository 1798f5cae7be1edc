//! Indicator surfaces

use std::sync::Mutex;

use crate::domain::Indicator;
use crate::ports::IndicatorSink;

/// Writes every badge update to the tracing log
#[derive(Debug, Default)]
pub struct TracingIndicator;

impl IndicatorSink for TracingIndicator {
    fn show(&self, indicator: &Indicator) {
        tracing::info!(
            text = %indicator.text,
            color = indicator.color.map(|c| c.hex()).unwrap_or("unchanged"),
            tooltip = %indicator.tooltip,
            "indicator updated"
        );
    }
}

/// Keeps every badge update in memory
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    shown: Mutex<Vec<Indicator>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Indicator> {
        self.shown.lock().ok().and_then(|s| s.last().cloned())
    }

    pub fn count(&self) -> usize {
        self.shown.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl IndicatorSink for RecordingIndicator {
    fn show(&self, indicator: &Indicator) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(indicator.clone());
        }
    }
}
