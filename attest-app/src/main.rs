//! Attest console host.
//!
//! Thin presentation shim over `attest-core`: wires settings, logging and
//! the real transport/recorder into a `SessionController`, bridges stdin
//! lines into session gestures, and renders snapshots to stdout.
//!
//! The core never sees stdin, stdout, or environment concerns — those all
//! live here.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use attest_core::{
    audio::capture::list_input_devices, AudioRecorder, ControllerConfig, CpalRecorder,
    HttpTransport, HttpTransportConfig, Mode, RecorderConfig, SessionController, SessionSnapshot,
    StubRecorder, StubTransport, TransportClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use settings::{default_settings_path, load_settings};

fn print_help() {
    println!("attest — conversational report assistant");
    println!("  <text>     submit a turn");
    println!("  :record    start/stop voice capture");
    println!("  :send      submit the pending transcript");
    println!("  :cancel    abandon the recording or in-flight request");
    println!("  :reset     clear the session");
    println!("  :devices   list audio input devices");
    println!("  :quit      exit");
}

/// Render new entries, draft updates and report changes as they arrive.
async fn render_loop(mut snapshots: watch::Receiver<SessionSnapshot>) {
    let mut rendered_entries = 0usize;
    let mut last_draft = String::new();
    let mut last_mode = Mode::Idle;
    let mut last_report: Option<attest_core::FinalReport> = None;

    loop {
        if snapshots.changed().await.is_err() {
            break;
        }
        let snap = snapshots.borrow_and_update().clone();

        if snap.entries.len() < rendered_entries {
            println!("(session reset)");
            rendered_entries = 0;
        }
        for entry in &snap.entries[rendered_entries..] {
            let speaker = match entry.role {
                attest_core::Role::User => "you",
                attest_core::Role::Assistant => {
                    if entry.is_error {
                        "assistant [error]"
                    } else {
                        "assistant"
                    }
                }
            };
            println!("{speaker}> {}", entry.content);
        }
        rendered_entries = snap.entries.len();

        if snap.draft != last_draft && !snap.draft.is_empty() {
            println!("transcript> {}   (:send to submit)", snap.draft);
        }
        last_draft = snap.draft.clone();

        if snap.mode != last_mode {
            match snap.mode {
                Mode::Recording => println!("… recording (:record to stop, :cancel to discard)"),
                Mode::Transcribing => println!("… transcribing your audio"),
                Mode::Processing => println!("… processing your request"),
                Mode::Idle => {}
            }
            last_mode = snap.mode;
        }

        if snap.report != last_report {
            if let Some(report) = &snap.report {
                println!("── {} ──", report.title);
                match serde_json::to_string_pretty(&report.data) {
                    Ok(pretty) => println!("{pretty}"),
                    Err(_) => println!("{}", report.data),
                }
            }
            last_report = snap.report.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attest=info".parse().unwrap()),
        )
        .init();

    info!("Attest starting");

    let settings_path = default_settings_path();
    let app_settings = load_settings(&settings_path);
    info!(
        settings_path = ?settings_path,
        backend_url = %app_settings.backend_url,
        use_stub_backend = app_settings.use_stub_backend,
        use_stub_recorder = app_settings.use_stub_recorder,
        "runtime settings loaded"
    );

    // ── Session wiring ────────────────────────────────────────────────────
    let transport: Arc<dyn TransportClient> = if app_settings.use_stub_backend {
        warn!("using stub backend — no requests leave this process");
        Arc::new(StubTransport::new())
    } else {
        Arc::new(HttpTransport::new(HttpTransportConfig {
            base_url: app_settings.backend_url.clone(),
            request_timeout: Duration::from_secs(app_settings.request_timeout_secs),
        })?)
    };

    let recorder: Box<dyn AudioRecorder> = if app_settings.use_stub_recorder {
        warn!("using stub recorder — no microphone will be opened");
        Box::new(StubRecorder::speaking())
    } else {
        Box::new(CpalRecorder::new(RecorderConfig {
            preferred_device: app_settings.preferred_input_device.clone(),
            ..Default::default()
        }))
    };

    let (controller, handle, snapshots) = SessionController::new(
        transport,
        recorder,
        ControllerConfig {
            min_artifact_bytes: app_settings.min_artifact_bytes,
        },
    );

    let input_view = snapshots.clone();
    tokio::spawn(controller.run());
    tokio::spawn(render_loop(snapshots));

    // ── Input loop ────────────────────────────────────────────────────────
    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            ":quit" | ":q" => break,
            ":help" => print_help(),
            ":reset" => handle.reset(),
            ":devices" => {
                let devices = list_input_devices();
                if devices.is_empty() {
                    println!("(no input devices found)");
                }
                for device in devices {
                    let marker = if device.is_default { " (default)" } else { "" };
                    println!("  {}{marker}", device.name);
                }
            }
            ":record" | ":r" => match input_view.borrow().mode {
                Mode::Idle => handle.start_record(),
                Mode::Recording => handle.stop_record(),
                _ => println!("(busy — cancel the active request first)"),
            },
            ":send" => {
                let draft = input_view.borrow().draft.clone();
                if draft.is_empty() {
                    println!("(no pending transcript)");
                } else {
                    handle.submit_text(draft);
                }
            }
            ":cancel" => match input_view.borrow().mode {
                Mode::Recording => handle.cancel_record(),
                Mode::Transcribing | Mode::Processing => handle.cancel_request(),
                Mode::Idle => println!("(nothing to cancel)"),
            },
            text => handle.submit_text(text),
        }
    }

    info!("Attest exiting");
    Ok(())
}
