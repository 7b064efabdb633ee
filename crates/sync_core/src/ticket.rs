/// Monotonic tickets guarding against out-of-order fetch completions.
///
/// Every attempt takes a ticket at call time; a completion may only be
/// applied if its ticket is higher than the highest ticket applied so far.
/// A late completion with a lower ticket is discarded, so a slow stale
/// response can never overwrite a fresher one that already landed.
#[derive(Debug, Default)]
pub(crate) struct TicketWindow {
    next: u64,
    applied: u64,
}

impl TicketWindow {
    pub(crate) fn issue(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub(crate) fn try_apply(&mut self, ticket: u64) -> bool {
        if ticket > self.applied {
            self.applied = ticket;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_completion_is_rejected() {
        let mut window = TicketWindow::default();
        let first = window.issue();
        let second = window.issue();
        assert!(window.try_apply(second));
        assert!(!window.try_apply(first));
    }

    #[test]
    fn in_order_completions_all_apply() {
        let mut window = TicketWindow::default();
        let a = window.issue();
        let b = window.issue();
        assert!(window.try_apply(a));
        assert!(window.try_apply(b));
        assert!(!window.try_apply(b));
    }
}
