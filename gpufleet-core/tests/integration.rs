use std::sync::Arc;
use std::time::{Duration, Instant};

use gpufleet_core::report::{truncate_command, CsvExporter, JsonExporter, TextReport};
use gpufleet_core::{
    render, FleetConfig, FleetScheduler, FleetSummary, HostOutcome, HostProber, HostStatus,
    ProbeConfig, ReportFormat,
};
use gpufleet_remote::{CommandOutput, MockHost, MockReply, MockTransport};
use pretty_assertions::assert_eq;

const TWO_GPUS: &str = include_str!("fixtures/two_gpus.xml");

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn gpu_host() -> MockHost {
    MockHost::new()
        .reply("nvidia-smi -q -x", MockReply::stdout(TWO_GPUS))
        .reply(
            "ps -p 48213 ",
            MockReply::stdout("48213     1 alice    09:14:02    01:02:03 /usr/bin/python3 train.py --epochs 90\n"),
        )
}

fn host_config() -> ProbeConfig {
    ProbeConfig::with_connect_timeout(Duration::from_millis(500))
}

fn scheduler(transport: &MockTransport, concurrency: usize) -> FleetScheduler {
    let prober = HostProber::new(Arc::new(transport.clone()), host_config());
    FleetScheduler::new(
        prober,
        FleetConfig {
            concurrency,
            ..Default::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_host_telemetry_collected_and_enriched() {
    let transport = MockTransport::new().host("gpu01", gpu_host());
    let prober = HostProber::new(Arc::new(transport.clone()), host_config());

    let outcome = prober.probe("gpu01").await;

    assert_eq!(outcome.status(), HostStatus::Success);
    let telemetry = outcome.telemetry().unwrap();
    assert_eq!(telemetry.gpu_count(), 2);
    assert_eq!(telemetry.driver_version, "535.104.05");

    let process = &telemetry.gpus[0].processes[0];
    assert_eq!(process.user.as_deref(), Some("alice"));
    assert_eq!(process.elapsed_time.as_deref(), Some("01:02:03"));
    assert_eq!(process.command.as_deref(), Some("/usr/bin/python3 train.py --epochs 90"));

    assert_eq!(transport.sessions_opened(), 1);
    assert_eq!(transport.sessions_closed(), 1);
}

#[tokio::test]
async fn test_disabled_enrichment_skips_ps() {
    let transport = MockTransport::new().host("gpu01", gpu_host());
    let config = ProbeConfig {
        enrich_processes: false,
        ..host_config()
    };
    let prober = HostProber::new(Arc::new(transport.clone()), config);

    let outcome = prober.probe("gpu01").await;

    assert!(outcome.is_success());
    assert!(outcome.telemetry().unwrap().gpus[0].processes[0].user.is_none());
    assert_eq!(transport.commands_run(), 1);
}

#[tokio::test]
async fn test_failure_classification() {
    let transport = MockTransport::new()
        .host("gpu01", gpu_host())
        .host("cpu01", MockHost::new())
        .host("down", MockHost::refusing("connection refused"))
        .host("slow", MockHost::new().with_connect_delay(Duration::from_secs(10)))
        .host("garbage", MockHost::new().reply("nvidia-smi", MockReply::stdout("this is not xml")))
        .host("silent", MockHost::new().reply("nvidia-smi", MockReply::stdout("  \n")))
        .host("wedged", MockHost::new().reply("nvidia-smi", MockReply::Hang))
        .host("dropped", MockHost::new().reply("nvidia-smi", MockReply::Disconnect))
        .host(
            "locked",
            MockHost::new().reply("nvidia-smi", MockReply::Reject("exec request: refused".into())),
        )
        .host("crashy", MockHost::new().reply("nvidia-smi", MockReply::Panic("boom".into())));
    let names = hosts(&[
        "gpu01", "cpu01", "down", "ghost", "slow", "garbage", "silent", "wedged", "dropped", "locked",
        "crashy",
    ]);

    let outcomes = scheduler(&transport, 4).poll(&names).await.unwrap();

    let polled: Vec<&str> = outcomes.iter().map(|o| o.hostname()).collect();
    assert_eq!(polled, names.iter().map(String::as_str).collect::<Vec<_>>());

    let by_host = |name: &str| outcomes.iter().find(|o| o.hostname() == name).unwrap();

    assert_eq!(by_host("gpu01").status(), HostStatus::Success);

    let cpu = by_host("cpu01");
    assert_eq!(cpu.status(), HostStatus::NoGpuOrDriver);
    assert_eq!(cpu.error(), Some("nvidia-smi not found or NVIDIA drivers not installed"));

    for name in ["down", "ghost", "slow"] {
        let outcome = by_host(name);
        assert_eq!(outcome.status(), HostStatus::ConnectionFailed, "{}", name);
        assert!(outcome
            .error()
            .unwrap()
            .starts_with("Failed to establish SSH connection: "));
    }

    let garbage = by_host("garbage");
    assert_eq!(garbage.status(), HostStatus::NoGpuOrDriver);
    assert!(garbage.error().unwrap().starts_with("Failed to get GPU info: "));

    assert_eq!(by_host("silent").error(), Some("No output from nvidia-smi command"));

    let wedged = by_host("wedged");
    assert_eq!(wedged.status(), HostStatus::NoGpuOrDriver);
    assert!(wedged.error().unwrap().contains("Timed out"));

    assert_eq!(by_host("dropped").status(), HostStatus::OtherError);
    assert_eq!(by_host("dropped").error(), Some("Error during GPU check: Session closed"));

    let locked = by_host("locked");
    assert_eq!(locked.status(), HostStatus::NoGpuOrDriver);
    assert_eq!(
        locked.error(),
        Some("Failed to get GPU info: Channel error: exec request: refused")
    );

    let crashy = by_host("crashy");
    assert_eq!(crashy.status(), HostStatus::OtherError);
    assert_eq!(crashy.error(), Some("Error during GPU check: boom"));

    // Every opened session was released, whatever happened on it
    assert_eq!(transport.sessions_opened(), transport.sessions_closed());

    let summary = FleetSummary::from_outcomes(&outcomes);
    assert_eq!(summary, FleetSummary { total: 11, successful: 1, failed: 10 });
}

#[tokio::test]
async fn test_panic_while_connecting_is_contained() {
    let transport = MockTransport::new()
        .host("bad", MockHost::panicking_on_connect("connect exploded"))
        .host("ok", gpu_host());

    // A single worker must survive the panic to reach the second host
    let outcomes = scheduler(&transport, 1).poll(&hosts(&["bad", "ok"])).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].hostname(), "bad");
    assert_eq!(outcomes[0].status(), HostStatus::OtherError);
    assert_eq!(outcomes[0].error(), Some("Unexpected error: connect exploded"));
    assert_eq!(outcomes[1].hostname(), "ok");
    assert_eq!(outcomes[1].status(), HostStatus::Success);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let mut transport = MockTransport::new();
    let reply = MockReply::Delayed(
        Duration::from_millis(50),
        CommandOutput {
            stdout: TWO_GPUS.to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        },
    );
    let names: Vec<String> = (0..12).map(|i| format!("node{:02}", i)).collect();
    for name in &names {
        transport = transport.host(name.clone(), MockHost::new().reply("nvidia-smi", reply.clone()));
    }

    let mut completed = 0;
    let outcomes = scheduler(&transport, 3)
        .poll_with_progress(&names, |_| completed += 1)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 12);
    assert_eq!(completed, 12);
    assert!(outcomes.iter().all(HostOutcome::is_success));
    assert_eq!(transport.peak_in_flight(), 3);
    assert_eq!(transport.sessions_closed(), 12);
}

#[tokio::test]
async fn test_duplicate_hostnames_polled_once() {
    let transport = MockTransport::new()
        .host("a", gpu_host())
        .host("b", MockHost::refusing("connection refused"));

    let outcomes = scheduler(&transport, 10)
        .poll(&hosts(&["a", "b", "a"]))
        .await
        .unwrap();

    let polled: Vec<&str> = outcomes.iter().map(|o| o.hostname()).collect();
    assert_eq!(polled, vec!["a", "b"]);
    assert_eq!(transport.sessions_opened(), 1);
}

#[tokio::test]
async fn test_fleet_timeout_reports_unfinished_hosts() {
    let transport = MockTransport::new()
        .host("quick", gpu_host())
        .host("stuck", MockHost::new().reply("nvidia-smi", MockReply::Hang));
    let prober = HostProber::new(Arc::new(transport.clone()), ProbeConfig::default());
    let scheduler = FleetScheduler::new(
        prober,
        FleetConfig {
            concurrency: 2,
            fleet_timeout: Some(Duration::from_millis(300)),
        },
    )
    .unwrap();

    let started = Instant::now();
    let outcomes = scheduler.poll(&hosts(&["stuck", "quick"])).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcomes[0].hostname(), "stuck");
    assert_eq!(outcomes[0].status(), HostStatus::OtherError);
    assert_eq!(outcomes[0].error(), Some("Fleet timeout exceeded"));
    assert_eq!(outcomes[1].status(), HostStatus::Success);
}

#[tokio::test]
async fn test_text_report_for_two_gpu_host() {
    let transport = MockTransport::new().host("gpu01", gpu_host());
    let outcomes = scheduler(&transport, 1).poll(&hosts(&["gpu01"])).await.unwrap();

    let text = render(&outcomes, ReportFormat::Text).unwrap();

    assert!(text.contains("  GPU 0 (00000000:3B:00.0):\n"));
    assert!(text.contains("  GPU 1 (00000000:AF:00.0):\n"));
    assert!(text.contains("    Memory: 13653 MiB / 40960 MiB (33.33%)\n"));
    assert!(text.contains("    Processes (1):\n"));
    assert!(text.contains("      PID 48213 - User: alice - Memory: 13640 MiB - Time: 01:02:03\n"));
    assert_eq!(text.matches("No processes running").count(), 1);
    assert!(text.contains("  Successful: 1\n"));
}

#[test]
fn test_text_report_failed_host() {
    let outcome = HostOutcome::connection_failed("ghost", "Failed to establish SSH connection: no route to host");
    let text = TextReport::new(outcome.timestamp()).render(&[outcome]);

    assert!(text.contains("Status: connection_failed\n"));
    assert!(text.contains("Error: Failed to establish SSH connection: no route to host\n"));
    assert!(!text.contains("Driver Version"));
}

#[test]
fn test_command_truncation() {
    let command = format!("/usr/bin/python3 {}", "a".repeat(44));
    assert_eq!(command.len(), 61);

    let shown = truncate_command(&command);
    assert_eq!(shown.len(), 60);
    assert_eq!(shown, format!("{}...", &command[..57]));
}

#[tokio::test]
async fn test_csv_rows_per_host_and_gpu() {
    let transport = MockTransport::new()
        .host("gpu01", gpu_host())
        .host("down", MockHost::refusing("connection refused"));
    let outcomes = scheduler(&transport, 2)
        .poll(&hosts(&["gpu01", "down"]))
        .await
        .unwrap();

    let csv = CsvExporter::render(&outcomes).unwrap();
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][6], "00000000:3B:00.0");
    assert_eq!(&rows[0][15], "alice");
    assert_eq!(&rows[1][6], "00000000:AF:00.0");
    assert_eq!(&rows[1][14], "0");

    let failed = &rows[2];
    assert_eq!(&failed[0], "down");
    assert_eq!(&failed[1], "connection_failed");
    assert!(!failed[3].is_empty());
    assert!(failed.iter().skip(4).all(str::is_empty));
}

#[tokio::test]
async fn test_json_round_trip() {
    let transport = MockTransport::new()
        .host("gpu01", gpu_host())
        .host("cpu01", MockHost::new());
    let outcomes = scheduler(&transport, 2)
        .poll(&hosts(&["gpu01", "cpu01", "ghost"]))
        .await
        .unwrap();

    let json = render(&outcomes, ReportFormat::Json).unwrap();
    let parsed = JsonExporter::parse(&json).unwrap();

    assert_eq!(parsed.len(), outcomes.len());
    for (before, after) in outcomes.iter().zip(&parsed) {
        assert_eq!(before.hostname(), after.hostname());
        assert_eq!(before.status(), after.status());
        assert_eq!(
            before.telemetry().map(|t| t.gpu_count()),
            after.telemetry().map(|t| t.gpu_count())
        );
    }
    assert_eq!(parsed, outcomes);
}
