//! End-to-end poll scenarios with a scripted page fetcher and recording sinks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use profile_scraper::{ContentFacts, FailureReason, PageFacts};
use tempfile::TempDir;

use creator_watch::config::{Setting, SubscriptionSource, SubscriptionStore};
use creator_watch::credentials::CookieJar;
use creator_watch::monitor::{
    PageFetcher, PartitionWorker, PollResult, Poller, PollerSettings, TickOutcome,
};
use creator_watch::notification::{
    AlarmHook, Attachment, DiagnosticSink, Dispatcher, NotificationSink,
};
use creator_watch::state::{Change, StateStore};
use creator_watch::stats::StatsStore;
use creator_watch::{Error, Result};

fn profile_page(video_id: i64, caption: &str, live: bool) -> String {
    let badge = if live {
        r#"<span class="css-1x-SpanLiveBadge">LIVE</span>"#
    } else {
        ""
    };
    format!(
        r#"<html><body>{badge}
        <div data-e2e="user-post-item-list">
          <div class="DivItemContainer">
            <div data-e2e="user-post-item"><a href="https://www.tiktok.com/@abc/video/{video_id}">v</a></div>
            <div data-e2e="user-post-item-desc"><a title="{caption}">{caption}</a></div>
          </div>
        </div></body></html>"#
    )
}

fn panel_page(text: &str) -> String {
    format!(
        r#"<html><body><div class="css-1x-DivErrorContainer"><p>{text}</p></div></body></html>"#
    )
}

const BROKEN_PAGE: &str = "<html><body><div>nothing here</div></body></html>";

#[derive(Default)]
struct ScriptedFetcher {
    pages: Mutex<HashMap<String, std::result::Result<String, String>>>,
    fetched: Mutex<Vec<String>>,
    cookies_seen: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn serve(&self, account: &str, page: impl Into<String>) {
        self.pages.lock().insert(account.to_string(), Ok(page.into()));
    }

    fn fail(&self, account: &str, error: &str) {
        self.pages
            .lock()
            .insert(account.to_string(), Err(error.to_string()));
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, account: &str, cookies: &str) -> Result<String> {
        self.fetched.lock().push(account.to_string());
        self.cookies_seen.lock().push(cookies.to_string());
        let scripted = self.pages.lock().get(account).cloned();
        match scripted {
            Some(Ok(page)) => Ok(page),
            Some(Err(error)) => Err(Error::Other(error)),
            None => Ok(BROKEN_PAGE.to_string()),
        }
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(String, String)>>);

impl RecordingSink {
    fn messages(&self) -> Vec<(String, String)> {
        self.0.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, subscriber: &str, message: &str) -> Result<()> {
        self.0
            .lock()
            .push((subscriber.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDiagnostics(Mutex<Vec<(String, Option<Attachment>)>>);

impl RecordingDiagnostics {
    fn reports(&self) -> Vec<(String, Option<Attachment>)> {
        self.0.lock().clone()
    }
}

#[async_trait]
impl DiagnosticSink for RecordingDiagnostics {
    async fn report(&self, message: &str, attachment: Option<&Attachment>) -> Result<()> {
        self.0
            .lock()
            .push((message.to_string(), attachment.cloned()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAlarm(Mutex<Vec<String>>);

#[async_trait]
impl AlarmHook for RecordingAlarm {
    async fn ring(&self, account: &str) -> Result<()> {
        self.0.lock().push(account.to_string());
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    subscriptions: Arc<SubscriptionStore>,
    fetcher: Arc<ScriptedFetcher>,
    sink: Arc<RecordingSink>,
    diagnostics: Arc<RecordingDiagnostics>,
    alarm: Arc<RecordingAlarm>,
    state: Arc<StateStore>,
    stats: Arc<StatsStore>,
    poller: Arc<Poller>,
}

impl Harness {
    async fn new(settings: PollerSettings) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("cookie.txt"), "sid=abc")
            .await
            .unwrap();

        let subscriptions = Arc::new(
            SubscriptionStore::load(dir.path().join("config.json"))
                .await
                .unwrap(),
        );
        let state = Arc::new(StateStore::load(dir.path().join("state.json")).await.unwrap());
        let stats = Arc::new(
            StatsStore::load(
                dir.path().join("stats.json"),
                dir.path().join("stats_meta.json"),
            )
            .await
            .unwrap(),
        );
        let cookies = Arc::new(CookieJar::load(dir.path().join("cookie.txt")).await.unwrap());

        let fetcher = Arc::new(ScriptedFetcher::default());
        let sink = Arc::new(RecordingSink::default());
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let alarm = Arc::new(RecordingAlarm::default());

        let subscription_source: Arc<dyn SubscriptionSource> = subscriptions.clone();
        let poller = Arc::new(Poller::new(
            subscription_source,
            fetcher.clone(),
            cookies,
            state.clone(),
            stats.clone(),
            Dispatcher::new(sink.clone(), Some(alarm.clone() as Arc<dyn AlarmHook>)),
            diagnostics.clone(),
            settings,
        ));

        Self {
            dir,
            subscriptions,
            fetcher,
            sink,
            diagnostics,
            alarm,
            state,
            stats,
            poller,
        }
    }

    async fn single() -> Self {
        Self::new(PollerSettings {
            partitions: 1,
            ..Default::default()
        })
        .await
    }

    fn worker(&self, partition: usize) -> PartitionWorker {
        self.poller.worker(partition)
    }

    async fn seed_video(&self, account: &str, video_id: i64) {
        let facts = PageFacts::Content(ContentFacts {
            video_id,
            caption: String::new(),
            is_live: false,
        });
        let mutation = self.state.update(account, &facts).await;
        assert!(mutation.is_durable());
    }

    async fn subscribe(&self, account: &str, subscriber: &str, setting: Setting) {
        self.subscriptions
            .update_setting(account, subscriber, setting, true)
            .await
            .unwrap();
    }
}

fn result(outcome: TickOutcome) -> PollResult {
    match outcome {
        TickOutcome::Polled { result, .. } => result,
        TickOutcome::Idle => panic!("expected a poll"),
    }
}

#[tokio::test]
async fn test_new_upload_matching_filter_is_delivered_once() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.subscriptions
        .set_filters("abc", "sub1", vec!["hi".to_string()])
        .await
        .unwrap();
    h.seed_video("abc", 100).await;
    h.fetcher.serve("abc", profile_page(105, "hi world", false));

    let mut worker = h.worker(0);
    let outcome = result(worker.tick().await);

    assert_eq!(
        outcome,
        PollResult::Success {
            changes: vec![Change::NewUpload {
                video_id: 105,
                caption: "hi world".to_string()
            }],
            delivery: creator_watch::notification::DeliveryReport {
                sent: 1,
                failed: 0,
                alarm_rung: false
            },
        }
    );
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "sub1");
    assert!(messages[0].1.contains("/video/105"));
    assert_eq!(h.state.get("abc").await.unwrap().latest_video_id, 105);
    assert_eq!(h.stats.record("abc").await.unwrap().success, 1);

    // Same page again: nothing new.
    worker.tick().await;
    assert_eq!(h.sink.messages().len(), 1);
}

#[tokio::test]
async fn test_post_list_failure_is_counted_and_escalated_once() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.seed_video("abc", 105).await;
    h.fetcher.serve("abc", BROKEN_PAGE);

    let mut worker = h.worker(0);
    let first = result(worker.tick().await);
    assert_eq!(
        first,
        PollResult::Failed {
            reason: FailureReason::UserPostItemList,
            detail: None,
            escalated: true
        }
    );

    let record = h.stats.record("abc").await.unwrap();
    assert_eq!(record.failure.count(FailureReason::UserPostItemList), 1);
    assert_eq!(h.state.get("abc").await.unwrap().latest_video_id, 105);
    assert!(h.sink.messages().is_empty());

    let reports = h.diagnostics.reports();
    assert_eq!(reports.len(), 1);
    let attachment = reports[0].1.as_ref().expect("raw page attached");
    assert_eq!(attachment.file_name, "error.html");
    assert_eq!(attachment.body, BROKEN_PAGE);

    let second = result(worker.tick().await);
    assert!(matches!(second, PollResult::Failed { escalated: false, .. }));
    assert_eq!(h.diagnostics.reports().len(), 1);
    assert_eq!(
        h.stats
            .record("abc")
            .await
            .unwrap()
            .failure
            .count(FailureReason::UserPostItemList),
        2
    );

    // A different reason escalates again.
    h.fetcher.serve("abc", "<html>Access Denied</html>");
    let third = result(worker.tick().await);
    assert!(matches!(
        third,
        PollResult::Failed {
            reason: FailureReason::AccessDenied,
            escalated: true,
            ..
        }
    ));
    assert_eq!(h.diagnostics.reports().len(), 2);
    assert!(h.diagnostics.reports()[1].1.is_none());
}

#[tokio::test]
async fn test_state_flush_failure_is_reported_and_poll_succeeds() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.seed_video("abc", 100).await;

    // Occupy the state file's path with a directory so the rename fails.
    let state_path = h.dir.path().join("state.json");
    tokio::fs::remove_file(&state_path).await.unwrap();
    tokio::fs::create_dir(&state_path).await.unwrap();
    tokio::fs::write(state_path.join("occupied"), "x").await.unwrap();

    h.fetcher.serve("abc", profile_page(105, "fresh", false));
    let outcome = result(h.worker(0).tick().await);

    assert!(matches!(
        outcome,
        PollResult::Success { ref changes, .. }
            if changes == &vec![Change::NewUpload { video_id: 105, caption: "fresh".to_string() }]
    ));
    assert_eq!(h.state.get("abc").await.unwrap().latest_video_id, 105);
    assert_eq!(h.sink.messages().len(), 1);
    assert_eq!(h.stats.record("abc").await.unwrap().success, 1);

    let reports = h.diagnostics.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].0.starts_with("Couldn't write to state file: "));
    assert!(reports[0].1.is_none());
}

#[tokio::test]
async fn test_first_observation_is_silent() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.fetcher.serve("abc", profile_page(7, "hello", false));

    let outcome = result(h.worker(0).tick().await);
    assert!(matches!(outcome, PollResult::Success { ref changes, .. } if changes.is_empty()));
    assert!(h.sink.messages().is_empty());
    assert_eq!(h.state.get("abc").await.unwrap().latest_video_id, 7);
}

#[tokio::test]
async fn test_please_wait_is_skipped_without_state_change() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.seed_video("abc", 5).await;
    h.fetcher.serve("abc", "<html><body>Please wait...</body></html>");

    let outcome = result(h.worker(0).tick().await);
    assert_eq!(outcome, PollResult::Skipped(FailureReason::PleaseWait));

    let state = h.state.get("abc").await.unwrap();
    assert_eq!(state.previous_error_reason, None);
    assert!(!state.error_already_reported);
    assert!(h.diagnostics.reports().is_empty());
    assert_eq!(
        h.stats
            .record("abc")
            .await
            .unwrap()
            .failure
            .count(FailureReason::PleaseWait),
        1
    );
}

#[tokio::test]
async fn test_partitions_are_disjoint_and_cursors_wrap() {
    let h = Harness::new(PollerSettings {
        partitions: 2,
        ..Default::default()
    })
    .await;
    for account in ["alpha", "bravo", "charlie"] {
        h.subscribe(account, "sub1", Setting::Videos).await;
        h.fetcher.serve(account, profile_page(1, "x", false));
    }

    let mut first = h.worker(0);
    let mut second = h.worker(1);

    let mut signals = Vec::new();
    for _ in 0..3 {
        signals.push(first.tick().await.signal(0));
    }
    assert_eq!(
        signals,
        vec![Some(".".to_string()), Some(".".to_string()), Some("0.".to_string())]
    );
    assert_eq!(h.fetcher.fetched(), vec!["alpha", "bravo", "alpha"]);

    for _ in 0..2 {
        second.tick().await;
    }
    assert_eq!(
        h.fetcher.fetched()[3..].to_vec(),
        vec!["charlie".to_string(), "charlie".to_string()]
    );

    let latest = h.stats.summarize(None).await.meta.latest_poll;
    assert_eq!(latest.as_deref(), Some("1. @charlie"));
}

#[tokio::test]
async fn test_empty_partition_is_idle() {
    let h = Harness::new(PollerSettings {
        partitions: 3,
        ..Default::default()
    })
    .await;
    h.subscribe("solo", "sub1", Setting::Videos).await;

    assert_eq!(h.worker(2).tick().await, TickOutcome::Idle);
    assert!(h.fetcher.fetched().is_empty());
}

#[tokio::test]
async fn test_monitor_mode_reports_availability_flips() {
    let h = Harness::single().await;
    h.subscribe("ghost", "watcher", Setting::Monitor).await;
    let mut worker = h.worker(0);

    // The first observation is only a baseline, even when unavailable.
    h.fetcher
        .serve("ghost", panel_page("Couldn't find this account"));
    let outcome = result(worker.tick().await);
    assert!(matches!(outcome, PollResult::Success { ref changes, .. } if changes.is_empty()));
    assert!(h.sink.messages().is_empty());

    h.fetcher
        .serve("ghost", "<html><body><h1>ghost</h1></body></html>");
    worker.tick().await;
    h.fetcher
        .serve("ghost", panel_page("Couldn't find this account"));
    let outcome = result(worker.tick().await);
    assert!(
        matches!(outcome, PollResult::Success { ref changes, .. } if changes == &vec![Change::BecameUnavailable])
    );

    h.fetcher
        .serve("ghost", "<html><body><h1>ghost</h1></body></html>");
    worker.tick().await;

    let messages: Vec<String> = h.sink.messages().into_iter().map(|(_, m)| m).collect();
    assert_eq!(
        messages,
        vec![
            "`@ghost` is now available! <https://www.tiktok.com/@ghost>".to_string(),
            "`@ghost` is no longer available!".to_string(),
            "`@ghost` is now available! <https://www.tiktok.com/@ghost>".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unknown_panel_is_keyed_by_text() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.fetcher.serve("abc", panel_page("Server is taking a nap"));

    let outcome = result(h.worker(0).tick().await);
    assert!(matches!(
        outcome,
        PollResult::Failed {
            reason: FailureReason::UnknownErrorDiv,
            escalated: true,
            ..
        }
    ));
    let record = h.stats.record("abc").await.unwrap();
    assert_eq!(record.failure.unknown_error_div["Server is taking a nap"], 1);
    // Panels are not extraction-step failures: no page attached.
    assert!(h.diagnostics.reports()[0].1.is_none());
}

#[tokio::test]
async fn test_transport_errors_are_request_failures() {
    let h = Harness::single().await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.fetcher.fail("abc", "connection reset");

    let mut worker = h.worker(0);
    let outcome = result(worker.tick().await);
    assert!(matches!(
        outcome,
        PollResult::Failed {
            reason: FailureReason::RequestFailed,
            escalated: true,
            ..
        }
    ));
    worker.tick().await;
    assert_eq!(h.diagnostics.reports().len(), 1);
    assert!(h.diagnostics.reports()[0].0.contains("connection reset"));
    assert_eq!(h.fetcher.cookies_seen.lock()[0], "sid=abc");
}

#[tokio::test]
async fn test_live_transition_notifies_and_rings_alarm() {
    let h = Harness::single().await;
    h.subscribe("abc", "fan", Setting::Lives).await;
    h.subscribe("abc", "fan", Setting::Alarm).await;
    h.subscribe("abc", "reader", Setting::Videos).await;
    h.seed_video("abc", 1).await;

    let mut worker = h.worker(0);
    h.fetcher.serve("abc", profile_page(1, "c", true));
    worker.tick().await;
    worker.tick().await;

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "fan");
    assert_eq!(messages[0].1, "`@abc` went LIVE! <https://www.tiktok.com/@abc/live>");
    assert_eq!(*h.alarm.0.lock(), vec!["abc".to_string()]);
    assert!(h.state.get("abc").await.unwrap().last_went_live_at.is_some());
}

#[tokio::test]
async fn test_live_cooldown_suppresses_flicker() {
    let h = Harness::new(PollerSettings {
        partitions: 1,
        interval: Duration::from_millis(10),
        live_cooldown: Some(Duration::from_secs(3600)),
    })
    .await;
    h.subscribe("abc", "fan", Setting::Lives).await;
    h.seed_video("abc", 1).await;

    let mut worker = h.worker(0);
    for live in [true, false, true] {
        h.fetcher.serve("abc", profile_page(1, "c", live));
        worker.tick().await;
    }

    assert_eq!(h.sink.messages().len(), 1);
}

#[tokio::test]
async fn test_worker_stops_on_cancel() {
    let h = Harness::new(PollerSettings {
        partitions: 1,
        interval: Duration::from_millis(5),
        live_cooldown: None,
    })
    .await;
    h.subscribe("abc", "sub1", Setting::Videos).await;
    h.fetcher.serve("abc", profile_page(1, "c", false));

    let cancel = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(h.poller.clone().run_worker(0, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(60)).await;
    cancel.cancel();
    task.await.unwrap();

    assert!(!h.fetcher.fetched().is_empty());
}
