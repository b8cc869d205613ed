//! Entry points of the protocol layers driven by the tick.

use std::fmt;

/// Timeout state machines of the higher protocol layers.
///
/// Both calls happen on the dispatcher thread, once per elapsed period, L3
/// first. They must return quickly and must not call back into
/// [`OsContext::close`](crate::OsContext::close).
pub trait ProtocolTimers: Send + Sync {
    /// Advance the application-layer (L3) timers by one period.
    fn advance_l3(&self);

    /// Advance the data-link (L2) timers by one period.
    fn advance_l2(&self);
}

impl<T: ProtocolTimers + ?Sized> ProtocolTimers for std::sync::Arc<T> {
    fn advance_l3(&self) {
        (**self).advance_l3();
    }

    fn advance_l2(&self) {
        (**self).advance_l2();
    }
}

/// [`ProtocolTimers`] built from two closures.
pub struct FnTimers<L3, L2> {
    l3: L3,
    l2: L2,
}

impl<L3, L2> FnTimers<L3, L2>
where
    L3: Fn() + Send + Sync,
    L2: Fn() + Send + Sync,
{
    /// Wrap the L3 and L2 advance closures.
    pub fn new(l3: L3, l2: L2) -> Self {
        Self { l3, l2 }
    }
}

impl<L3, L2> ProtocolTimers for FnTimers<L3, L2>
where
    L3: Fn() + Send + Sync,
    L2: Fn() + Send + Sync,
{
    fn advance_l3(&self) {
        (self.l3)();
    }

    fn advance_l2(&self) {
        (self.l2)();
    }
}

impl<L3, L2> fmt::Debug for FnTimers<L3, L2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTimers").finish_non_exhaustive()
    }
}

/// Protocol timers that ignore every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTimers;

impl ProtocolTimers for NoopTimers {
    fn advance_l3(&self) {}

    fn advance_l2(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_fn_timers_call_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let timers = {
            let l3 = Arc::clone(&calls);
            let l2 = Arc::clone(&calls);
            FnTimers::new(move || l3.lock().push("l3"), move || l2.lock().push("l2"))
        };

        timers.advance_l3();
        timers.advance_l2();
        assert_eq!(*calls.lock(), vec!["l3", "l2"]);
    }

    #[test]
    fn test_arc_forwarding() {
        let timers: Arc<dyn ProtocolTimers> = Arc::new(NoopTimers);
        timers.advance_l3();
        timers.advance_l2();
    }
}
