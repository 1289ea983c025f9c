use crate::domain::instrument::ChartData;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// Bars shown when a new series is loaded.
pub const INITIAL_WINDOW_BARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportRange {
    /// Bar-index window; `to` is exclusive of the right edge padding.
    Logical { from: f64, to: f64 },
    Time { from: NaiveDate, to: NaiveDate },
}

impl ViewportRange {
    pub fn logical(from: f64, to: f64) -> Self {
        ViewportRange::Logical { from, to }
    }

    /// The most recent `bars` bars of a `total`-bar series, starting no
    /// earlier than bar 0.
    pub fn trailing_window(total: usize, bars: usize) -> Self {
        let from = total.saturating_sub(bars);
        ViewportRange::logical(from as f64, total as f64)
    }
}

#[derive(Debug, Error)]
pub enum ViewportError {
    #[error("viewport has no data yet")]
    NotReady,

    #[error("range rejected: {0}")]
    Rejected(String),
}

pub type RangeListener = Arc<dyn Fn(Option<ViewportRange>) + Send + Sync>;

/// The slice of a charting surface the orchestrator depends on.
pub trait ChartViewport: Send + Sync {
    fn set_data(&self, data: &ChartData);

    fn subscribe_visible_range_change(&self, listener: RangeListener);

    fn set_visible_range(&self, range: ViewportRange) -> Result<(), ViewportError>;
}

/// Re-entrancy guard shared by one synchronized group of viewports.
#[derive(Debug, Default)]
pub struct SyncGuard {
    engaged: AtomicBool,
}

impl SyncGuard {
    /// Engages the guard for the lifetime of the returned scope, or returns
    /// `None` if it is already engaged.
    pub fn try_engage(&self) -> Option<SyncScope<'_>> {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncScope { guard: self })
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

pub struct SyncScope<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncScope<'_> {
    fn drop(&mut self) {
        self.guard.engaged.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Reentrant,
    EmptyDomain,
    UndefinedRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Ignored(IgnoreReason),
    /// Range was applied to `applied` of the other viewports; the rest failed
    /// and were skipped.
    Propagated { applied: usize, failed: usize },
}

/// Keeps every viewport in the group on the same horizontal range.
pub struct ViewportSync {
    viewports: Vec<Arc<dyn ChartViewport>>,
    guard: SyncGuard,
    domain_len: AtomicUsize,
}

impl ViewportSync {
    /// Subscribes to every viewport. Listeners hold a weak reference, so
    /// dropping the returned `Arc` detaches the group.
    pub fn attach(viewports: Vec<Arc<dyn ChartViewport>>) -> Arc<Self> {
        let sync = Arc::new(Self {
            viewports,
            guard: SyncGuard::default(),
            domain_len: AtomicUsize::new(0),
        });

        for (idx, viewport) in sync.viewports.iter().enumerate() {
            let weak: Weak<Self> = Arc::downgrade(&sync);
            viewport.subscribe_visible_range_change(Arc::new(move |range| {
                if let Some(sync) = weak.upgrade() {
                    sync.on_visible_range_changed(idx, range);
                }
            }));
        }

        sync
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    pub fn domain_len(&self) -> usize {
        self.domain_len.load(Ordering::Acquire)
    }

    pub fn guard(&self) -> &SyncGuard {
        &self.guard
    }

    pub fn on_visible_range_changed(
        &self,
        source: usize,
        range: Option<ViewportRange>,
    ) -> SyncOutcome {
        if self.guard.is_engaged() {
            return SyncOutcome::Ignored(IgnoreReason::Reentrant);
        }
        if self.domain_len() == 0 {
            return SyncOutcome::Ignored(IgnoreReason::EmptyDomain);
        }
        let Some(range) = range else {
            return SyncOutcome::Ignored(IgnoreReason::UndefinedRange);
        };
        let Some(_scope) = self.guard.try_engage() else {
            return SyncOutcome::Ignored(IgnoreReason::Reentrant);
        };

        let (mut applied, mut failed) = (0, 0);
        for (idx, viewport) in self.viewports.iter().enumerate() {
            if idx == source {
                continue;
            }
            match viewport.set_visible_range(range) {
                Ok(()) => applied += 1,
                Err(err) => {
                    failed += 1;
                    tracing::debug!(source, target = idx, error = %err, "viewport sync skipped");
                }
            }
        }
        SyncOutcome::Propagated { applied, failed }
    }

    /// Pushes a new series to every viewport and seeds all of them with the
    /// trailing window. Notifications emitted meanwhile are ignored.
    pub fn load(&self, data: &ChartData) -> ViewportRange {
        let _scope = self.guard.try_engage();
        let total = data.candles.len();
        self.domain_len.store(total, Ordering::Release);

        for viewport in &self.viewports {
            viewport.set_data(data);
        }

        let window = ViewportRange::trailing_window(total, INITIAL_WINDOW_BARS);
        for (idx, viewport) in self.viewports.iter().enumerate() {
            if let Err(err) = viewport.set_visible_range(window) {
                tracing::debug!(target = idx, error = %err, "initial window not applied");
            }
        }
        window
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    bars: Option<usize>,
    range: Option<ViewportRange>,
    applied: usize,
}

/// Viewport without a rendering surface. Applying a range emits a change
/// notification synchronously, like an interactive chart does.
#[derive(Default)]
pub struct HeadlessViewport {
    state: Mutex<HeadlessState>,
    listeners: Mutex<Vec<RangeListener>>,
}

impl HeadlessViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_range(&self) -> Option<ViewportRange> {
        self.state.lock().ok().and_then(|s| s.range)
    }

    pub fn bar_count(&self) -> Option<usize> {
        self.state.lock().ok().and_then(|s| s.bars)
    }

    /// Number of ranges applied through `set_visible_range`.
    pub fn applied_count(&self) -> usize {
        self.state.lock().map(|s| s.applied).unwrap_or(0)
    }

    /// Simulates the user panning or zooming this chart.
    pub fn scroll_to(&self, range: ViewportRange) {
        if let Ok(mut state) = self.state.lock() {
            state.range = Some(range);
        }
        self.emit(Some(range));
    }

    pub fn emit(&self, range: Option<ViewportRange>) {
        let listeners: Vec<RangeListener> = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(range);
        }
    }
}

impl ChartViewport for HeadlessViewport {
    fn set_data(&self, data: &ChartData) {
        if let Ok(mut state) = self.state.lock() {
            state.bars = Some(data.candles.len());
            state.range = None;
        }
    }

    fn subscribe_visible_range_change(&self, listener: RangeListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    fn set_visible_range(&self, range: ViewportRange) -> Result<(), ViewportError> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ViewportError::Rejected("state lock poisoned".to_string()))?;
            if state.bars.is_none() {
                return Err(ViewportError::NotReady);
            }
            state.range = Some(range);
            state.applied += 1;
        }
        self.emit(Some(range));
        Ok(())
    }
}
