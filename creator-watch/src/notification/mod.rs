//! Notification decision and delivery.

pub mod alarm;
pub mod channels;
mod dispatcher;
pub mod messages;

pub use alarm::{AlarmHook, CommandAlarm};
pub use channels::{Attachment, DiagnosticSink, NotificationSink};
pub use dispatcher::{DeliveryReport, DispatchPlan, Dispatcher, Outgoing, plan};
