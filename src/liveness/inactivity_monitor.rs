//! InactivityMonitor (spec §4.G): a transparent [`PacketPass`] pass-through
//! that resets a timer on every `send`. On expiry it invokes a handler —
//! used to drive `up -> down` transitions (spec §7 `InactivityTimeout`) —
//! without itself interrupting the flow.

use crate::flow::packet_pass::{DoneCallback, PacketPass};
use crate::reactor::{timer::Timer, Reactor};
use std::time::Duration;

pub struct InactivityMonitor<D> {
    downstream: D,
    reactor: Reactor,
    timer: Timer,
    tolerance: Duration,
}

impl<D: PacketPass> InactivityMonitor<D> {
    /// `on_expiry` fires if `tolerance` elapses with no `send` in between.
    pub fn new(
        downstream: D,
        reactor: Reactor,
        tolerance: Duration,
        on_expiry: impl FnMut() + 'static,
    ) -> Self {
        let timer = reactor.new_timer(on_expiry);
        reactor.set_timer(&timer, tolerance);
        InactivityMonitor {
            downstream,
            reactor,
            timer,
            tolerance,
        }
    }

    pub fn into_downstream(self) -> D {
        self.downstream
    }
}

impl<D: PacketPass> PacketPass for InactivityMonitor<D> {
    fn mtu(&self) -> usize {
        self.downstream.mtu()
    }

    fn supports_cancel(&self) -> bool {
        self.downstream.supports_cancel()
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        self.reactor.set_timer(&self.timer, self.tolerance);
        self.downstream.send(data, done);
    }

    fn cancel(&mut self) {
        self.downstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::packet_pass::test_support::RecordingSink;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn expiry_fires_handler_without_traffic() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let reactor = Reactor::new();
                let sink = RecordingSink::new(1500);
                let expired = Rc::new(RefCell::new(false));
                let expired_cb = expired.clone();
                let reactor_for_timer = reactor.clone();
                let mut monitor = InactivityMonitor::new(
                    sink,
                    reactor.clone(),
                    Duration::from_millis(5),
                    move || {
                        *expired_cb.borrow_mut() = true;
                        reactor_for_timer.quit(0);
                    },
                );
                let _ = &mut monitor;

                reactor.run_until_quit().await;
                assert!(*expired.borrow());
            })
            .await;
    }

    #[tokio::test]
    async fn traffic_resets_the_timer_and_delays_expiry() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let reactor = Reactor::new();
                let sink = RecordingSink::new(1500);
                let received = sink.received.clone();
                let expired = Rc::new(RefCell::new(false));
                let expired_cb = expired.clone();
                let reactor_for_timer = reactor.clone();
                let mut monitor = InactivityMonitor::new(
                    sink,
                    reactor.clone(),
                    Duration::from_millis(20),
                    move || {
                        *expired_cb.borrow_mut() = true;
                        reactor_for_timer.quit(0);
                    },
                );

                monitor.send(vec![1], Box::new(|| {}));
                assert_eq!(*received.borrow(), vec![vec![1]]);

                reactor.run_until_quit().await;
                assert!(*expired.borrow(), "timer should still fire eventually");
            })
            .await;
    }
}
