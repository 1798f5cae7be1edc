//! Indicator surface port

use crate::domain::Indicator;

/// The surface that renders the badge (text, color, tooltip)
pub trait IndicatorSink: Send + Sync {
    fn show(&self, indicator: &Indicator);
}
