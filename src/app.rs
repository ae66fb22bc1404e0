use chrono::Utc;
use log::{debug, info};
use std::io::Write;

use crate::backend::NodeBackend;
use crate::error::ReportError;
use crate::fees::{self, FeeRequest, PolicyState};
use crate::report::format::Painter;
use crate::report::{self, Ratings, ReportOptions};
use crate::score::{GoodPeers, ScoreService, ScoreTable};
use crate::state::NodeSession;

pub const NO_CHANNELS_MESSAGE: &str = "No channels found. Exiting";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub fees: FeeRequest,
    pub report: ReportOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    NoChannels,
    Rendered,
}

/// One report run: fetch, optionally push fees and refetch, look up ratings,
/// render.
///
/// `score_service` is only consulted when scores or good peers are toggled on.
pub async fn run(
    options: &RunOptions,
    backend: &dyn NodeBackend,
    score_service: Option<&dyn ScoreService>,
    painter: &Painter,
    out: &mut dyn Write,
) -> Result<RunOutcome, ReportError> {
    let mut session = NodeSession::open(backend).await?;
    if !session.has_channels() {
        writeln!(out, "{}", NO_CHANNELS_MESSAGE)?;
        return Ok(RunOutcome::NoChannels);
    }

    let state = fees::settle(options.fees.into_state(), &mut session).await?;
    if let PolicyState::Applied(policy) = state {
        info!(
            "Fee policy applied ({}ppm), node state refreshed",
            policy.fee_rate
        );
        if !session.has_channels() {
            writeln!(out, "{}", NO_CHANNELS_MESSAGE)?;
            return Ok(RunOutcome::NoChannels);
        }
    }

    let node = session.node();
    let toggles = &options.report.toggles;
    let scores = match score_service {
        Some(service) if toggles.show_scores => ScoreTable::collect(service, node.pubkeys()).await,
        _ => None,
    };
    let good_peers = match score_service {
        Some(service) if toggles.show_good_peers => {
            GoodPeers::collect(service, &node.local_pubkey).await
        }
        _ => None,
    };
    let ratings = Ratings {
        scores: scores.as_ref(),
        good_peers: good_peers.as_ref(),
    };

    debug!("Rendering {} channels", node.channels.len());
    report::write_report(out, node, &ratings, &options.report, Utc::now(), painter)?;
    out.flush()?;
    Ok(RunOutcome::Rendered)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::model::{Channel, Node, Opener};
    use crate::report::schema::Toggles;
    use crate::report::ChannelFilter;
    use crate::score::mock::MockScoreService;
    use std::sync::{Arc, Mutex};

    /// Records "render" in the shared event log on the first write.
    struct EventWriter {
        buf: Vec<u8>,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Write for EventWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if self.buf.is_empty() && !data.is_empty() {
                self.events.lock().unwrap().push("render".to_string());
            }
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn options(fee_rate: u64) -> RunOptions {
        RunOptions {
            fees: FeeRequest {
                base_fee: 0,
                fee_rate,
                fee_spread: 0.0,
                time_lock_delta: 40,
            },
            report: ReportOptions::default(),
        }
    }

    fn make_channel(id: &str, peer: &str, local: u64, private: bool) -> Channel {
        Channel {
            chan_id: id.to_string(),
            remote_node_id: peer.to_string(),
            remote_alias: Some(format!("alias_{}", id)),
            capacity: 1_000_000,
            commit_fee: 3_470,
            local_balance: local,
            remote_balance: 996_530 - local,
            local_base_fee: Some(1_000),
            local_fee_rate: Some(10),
            remote_base_fee: Some(0),
            remote_fee_rate: Some(200),
            active: true,
            uptime: Some(90),
            lifetime: Some(100),
            private,
            opener: Opener::Local,
            ..Default::default()
        }
    }

    fn make_node(channels: Vec<Channel>) -> Node {
        Node {
            local_pubkey: "03local".to_string(),
            local_alias: "report-node".to_string(),
            channels,
        }
    }

    async fn render_with(
        options: &RunOptions,
        mock: &MockBackend,
        scores: Option<&dyn ScoreService>,
    ) -> (Result<RunOutcome, ReportError>, String) {
        let mut out = Vec::new();
        let result = run(options, mock, scores, &Painter::plain(), &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    // -----------------------------------------------------------------------
    // Test 1: Node without channels
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_no_channels_prints_only_message() {
        let mock = MockBackend::new(vec![make_node(vec![])]);
        let mut out = Vec::new();
        let outcome = run(&options(50), &mock, None, &Painter::plain(), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::NoChannels);
        assert_eq!(String::from_utf8(out).unwrap(), "No channels found. Exiting\n");
        // No policy push on an empty node
        assert_eq!(*mock.events.lock().unwrap(), vec!["fetch"]);
    }

    // -----------------------------------------------------------------------
    // Test 2: Fee policy is applied and refreshed before rendering
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_apply_refresh_render_order() {
        let before = make_node(vec![make_channel("a", "02a", 500_000, false)]);
        let mut after = before.clone();
        after.channels[0].local_fee_rate = Some(50);

        let mock = MockBackend::new(vec![before, after]);
        let mut out = EventWriter {
            buf: Vec::new(),
            events: mock.events.clone(),
        };
        let outcome = run(&options(50), &mock, None, &Painter::plain(), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Rendered);
        assert_eq!(
            *mock.events.lock().unwrap(),
            vec!["fetch", "apply", "fetch", "render"]
        );
        let applied = mock.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].fee_rate, 50);
        assert_eq!(applied[0].time_lock_delta, 40);

        // The refreshed fee rate is what gets reported
        let text = String::from_utf8(out.buf.clone()).unwrap();
        let row = text.lines().find(|l| l.contains("alias_a")).unwrap();
        assert!(row.split_whitespace().any(|cell| cell == "50"), "{}", row);
    }

    #[tokio::test]
    async fn test_zero_fee_rate_skips_policy() {
        let mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        let (result, _) = render_with(&options(0), &mock, None).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert_eq!(*mock.events.lock().unwrap(), vec!["fetch"]);
        assert!(mock.applied.lock().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 3: Failures
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_fetch_failure() {
        let mut mock = MockBackend::new(vec![]);
        mock.fail_fetch = true;
        let (result, out) = render_with(&options(0), &mock, None).await;
        assert!(matches!(result, Err(ReportError::Backend(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_produces_no_output() {
        let mut mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        mock.fail_apply = true;
        let (result, out) = render_with(&options(50), &mock, None).await;
        assert!(matches!(result, Err(ReportError::PolicyApply(_))));
        assert!(out.is_empty());
        assert_eq!(*mock.events.lock().unwrap(), vec!["fetch", "apply"]);
    }

    #[tokio::test]
    async fn test_division_error_aborts_tables() {
        let mut broken = make_channel("b", "02b", 0, false);
        broken.commit_fee = broken.capacity;
        let mock = MockBackend::new(vec![make_node(vec![
            make_channel("a", "02a", 500_000, false),
            broken,
        ])]);
        let (result, out) = render_with(&options(0), &mock, None).await;

        match result {
            Err(ReportError::Division { chan_id, .. }) => assert_eq!(chan_id, "b"),
            other => panic!("expected division error, got {:?}", other),
        }
        assert!(out.contains("report-node"));
        assert!(!out.contains("alias_a"));
    }

    #[tokio::test]
    async fn test_refresh_without_channels() {
        let mock = MockBackend::new(vec![
            make_node(vec![make_channel("a", "02a", 1, false)]),
            make_node(vec![]),
        ]);
        let (result, out) = render_with(&options(50), &mock, None).await;
        assert_eq!(result.unwrap(), RunOutcome::NoChannels);
        assert_eq!(out, "No channels found. Exiting\n");
    }

    // -----------------------------------------------------------------------
    // Test 4: Scores
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_scores_rendered() {
        let mock = MockBackend::new(vec![make_node(vec![
            make_channel("a", "02a", 500_000, false),
            make_channel("b", "02a", 100_000, false),
        ])]);
        let service = MockScoreService::new()
            .with_score("03local", 1_500)
            .with_score("02a", 42);
        let mut opts = options(0);
        opts.report.toggles.show_scores = true;

        let (result, out) = render_with(&opts, &mock, Some(&service)).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(out.contains("score     : 1,500"));
        assert!(out.lines().any(|l| l.contains("score") && !l.contains(":")));
        // Each pubkey looked up once, local node first
        assert_eq!(*service.lookups.lock().unwrap(), vec!["03local", "02a"]);
    }

    #[tokio::test]
    async fn test_score_failure_renders_without_scores() {
        let mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        let mut service = MockScoreService::new().with_score("03local", 1_500);
        service.fail_on = Some("02a".to_string());
        let mut opts = options(0);
        opts.report.toggles.show_scores = true;

        let (result, out) = render_with(&opts, &mock, Some(&service)).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(!out.contains("score"));
        assert!(out.contains("alias_a"));
    }

    #[tokio::test]
    async fn test_scores_not_requested() {
        let mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        let service = MockScoreService::new().with_score("03local", 1_500);
        let (result, out) = render_with(&options(0), &mock, Some(&service)).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(service.lookups.lock().unwrap().is_empty());
        assert!(!out.contains("score"));
    }

    #[tokio::test]
    async fn test_good_peers_rendered_before_alias() {
        let mock = MockBackend::new(vec![make_node(vec![
            make_channel("a", "02a", 500_000, false),
            make_channel("b", "02b", 100_000, false),
        ])]);
        let mut service = MockScoreService::new();
        service.good_peers.inbound.insert("02a".to_string());
        service.good_peers.outbound.insert("02b".to_string());
        let mut opts = options(0);
        opts.report.toggles.show_good_peers = true;

        let (result, out) = render_with(&opts, &mock, Some(&service)).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        let row_a = out.lines().find(|l| l.contains("alias_a")).unwrap();
        let row_b = out.lines().find(|l| l.contains("alias_b")).unwrap();
        fn tail(row: &str) -> Vec<&str> {
            row.split_whitespace().rev().take(2).collect()
        }
        assert_eq!(tail(row_a), vec!["alias_a", "in|-"]);
        assert_eq!(tail(row_b), vec!["alias_b", "-|out"]);
        // Only the local node page is fetched, and no scores
        assert_eq!(*service.lookups.lock().unwrap(), vec!["peers:03local"]);
        assert!(!out.contains("score"));
    }

    #[tokio::test]
    async fn test_good_peers_failure_renders_without_column() {
        let mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        let mut service = MockScoreService::new();
        service.fail_on = Some("03local".to_string());
        let mut opts = options(0);
        opts.report.toggles.show_good_peers = true;

        let (result, out) = render_with(&opts, &mock, Some(&service)).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(!out.contains("good"));
        assert!(out.contains("alias_a"));
    }

    #[tokio::test]
    async fn test_escape_sequences_in_alias_not_rendered() {
        let mut channel = make_channel("a", "02a", 1, false);
        channel.remote_alias = Some("evil\x1b[2J\x1b]0;pwn\x07".to_string());
        let mock = MockBackend::new(vec![make_node(vec![channel])]);

        let (result, out) = render_with(&options(0), &mock, None).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(!out.contains('\x1b') && !out.contains('\x07'), "{:?}", out);
        assert!(out.contains("evil[2J]0;pwn"));
    }

    // -----------------------------------------------------------------------
    // Test 5: Channel selection
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_split_mode() {
        let mock = MockBackend::new(vec![make_node(vec![
            make_channel("a", "02a", 1, false),
            make_channel("b", "02b", 1, true),
            make_channel("c", "02c", 1, false),
        ])]);
        let mut opts = options(0);
        opts.report.filter = ChannelFilter::Split;

        let (result, out) = render_with(&opts, &mock, None).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        assert!(out.contains("public channels : 2"));
        assert!(out.contains("private channels : 1"));
        let public_at = out.find("public channels").unwrap();
        let private_row = out.find("alias_b").unwrap();
        assert!(private_row > public_at);
    }

    #[tokio::test]
    async fn test_private_filter_with_only_public_channels() {
        let mock = MockBackend::new(vec![make_node(vec![make_channel("a", "02a", 1, false)])]);
        let mut opts = options(0);
        opts.report.filter = ChannelFilter::Private;
        opts.report.toggles = Toggles {
            show_chan_ids: true,
            ..Default::default()
        };

        let (result, out) = render_with(&opts, &mock, None).await;
        assert_eq!(result.unwrap(), RunOutcome::Rendered);
        // Summary only, no table
        assert!(out.contains("channels  : 1"));
        assert!(!out.contains("chan_id"));
    }
}
