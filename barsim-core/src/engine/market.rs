//! Read-only market view handed to strategies and trade-management models.

use super::binder::{BinderError, IndicatorBinder, IndicatorHandle, IndicatorView};
use crate::data::Window;
use crate::domain::Bar;

/// Prices and indicators up to and including the current bar, nothing later.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    window: Window<'a>,
    binder: &'a IndicatorBinder,
}

impl<'a> MarketView<'a> {
    pub fn new(window: Window<'a>, binder: &'a IndicatorBinder) -> Self {
        Self { window, binder }
    }

    pub fn data(&self) -> Window<'a> {
        self.window
    }

    /// Index of the current bar in the full series.
    pub fn bar_index(&self) -> usize {
        self.window.len().saturating_sub(1)
    }

    pub fn current_bar(&self) -> Option<&'a Bar> {
        self.window.latest()
    }

    pub fn indicator(&self, handle: IndicatorHandle) -> Result<IndicatorView<'a>, BinderError> {
        self.binder.view(handle, self.window.len())
    }
}
