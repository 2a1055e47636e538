//! Turns detected changes into subscriber messages and delivers them.

use std::sync::Arc;

use tracing::{debug, warn};

use super::alarm::AlarmHook;
use super::channels::NotificationSink;
use super::messages::render;
use crate::config::{Preferences, Subscribers};
use crate::state::Change;

/// One message for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub subscriber: String,
    pub message: String,
}

/// What a set of changes expands to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    pub messages: Vec<Outgoing>,
    pub ring_alarm: bool,
}

fn wants(prefs: &Preferences, change: &Change) -> bool {
    match change {
        Change::NewUpload { caption, .. } => prefs.videos && prefs.accepts_caption(caption),
        Change::VideoRemoved { .. } => prefs.videos,
        Change::WentLive => prefs.lives,
        Change::BecameAvailable | Change::BecameUnavailable => prefs.monitor,
    }
}

/// Decide who hears about `changes` of `account`.
pub fn plan(account: &str, changes: &[Change], subscribers: &Subscribers) -> DispatchPlan {
    let mut plan = DispatchPlan::default();
    for change in changes {
        let message = render(account, change);
        for (subscriber, prefs) in subscribers {
            if wants(prefs, change) {
                plan.messages.push(Outgoing {
                    subscriber: subscriber.clone(),
                    message: message.clone(),
                });
            }
            if prefs.alarm && *change == Change::WentLive {
                plan.ring_alarm = true;
            }
        }
    }
    plan
}

/// Outcome of a delivery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    pub alarm_rung: bool,
}

/// Delivers planned messages through a [`NotificationSink`].
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    alarm: Option<Arc<dyn AlarmHook>>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, alarm: Option<Arc<dyn AlarmHook>>) -> Self {
        Self { sink, alarm }
    }

    /// Deliver every message for `changes`. A failed send is logged and the
    /// round continues.
    pub async fn deliver(
        &self,
        account: &str,
        changes: &[Change],
        subscribers: &Subscribers,
    ) -> DeliveryReport {
        let plan = plan(account, changes, subscribers);
        let mut report = DeliveryReport::default();

        for outgoing in &plan.messages {
            match self.sink.send(&outgoing.subscriber, &outgoing.message).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        account,
                        subscriber = %outgoing.subscriber,
                        channel = self.sink.channel_type(),
                        error = %e,
                        "Failed to deliver notification"
                    );
                }
            }
        }

        if plan.ring_alarm {
            match &self.alarm {
                Some(alarm) => match alarm.ring(account).await {
                    Ok(()) => report.alarm_rung = true,
                    Err(e) => warn!(account, error = %e, "Alarm hook failed"),
                },
                None => debug!(account, "Alarm requested but no alarm command is configured"),
            }
        }

        report
    }
}
