//! Readiness gates shared by the local statistics managers.

/// Tracks `started`, `recovered` and `closed`, plus whether a change arrived
/// while publication was not yet allowed.
#[derive(Debug, Default)]
pub(crate) struct PublishGates {
    started: bool,
    recovered: bool,
    closed: bool,
    pending: bool,
}

impl PublishGates {
    pub(crate) fn is_open(&self) -> bool {
        self.started && self.recovered && !self.closed
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Records a value change. Returns true if a publish should be scheduled now.
    pub(crate) fn on_change(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.is_open() {
            self.pending = false;
            return true;
        }
        self.pending = true;
        false
    }

    pub(crate) fn start(&mut self) -> bool {
        self.started = true;
        self.take_pending()
    }

    pub(crate) fn recovery_completed(&mut self) -> bool {
        self.recovered = true;
        self.take_pending()
    }

    /// Latches `closed`. Returns false if it was already closed.
    pub(crate) fn close(&mut self) -> bool {
        let was_closed = self.closed;
        self.closed = true;
        self.pending = false;
        !was_closed
    }

    fn take_pending(&mut self) -> bool {
        if self.is_open() && self.pending {
            self.pending = false;
            return true;
        }
        false
    }
}
