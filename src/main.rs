//! Copilot core — live interview copilot session controller.
//!
//! Communicates with the UI shell via JSON-line IPC on stdin/stdout.
//! Owns microphone capture, the realtime model session, turn gating, and
//! transcript history; the shell only renders snapshots and sends
//! control commands.

mod audio;
mod config;
mod ipc;
mod live;

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{read_copilot_config, LiveSettings};
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{CopilotCommand, CopilotEvent};
use live::client::LiveEvent;
use live::controls::ModeConfig;
use live::session::{Session, SessionStatus};

/// Frame pump cadence. The ring buffer absorbs capture between ticks.
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout is the event channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the shell knows we're alive.
    emit_event(&CopilotEvent::Starting {});

    let settings = LiveSettings::from_config(read_copilot_config());
    info!(
        model = %settings.model,
        voice = %settings.voice,
        has_api_key = settings.api_key.is_some(),
        "Configuration loaded"
    );

    let mut cmd_rx = spawn_stdin_reader();

    let mut controls = ModeConfig::default();
    let mut session = Session::new(&settings);
    let mut live_rx: Option<mpsc::UnboundedReceiver<LiveEvent>> = None;
    let mut pump = tokio::time::interval(PUMP_INTERVAL);

    emit_event(&CopilotEvent::Ready {});
    info!("Copilot core ready");

    loop {
        let deadline = session.answering_deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !handle_command(
                            command,
                            &mut session,
                            &mut controls,
                            &mut live_rx,
                            &settings,
                        )
                        .await
                        {
                            break; // Stop command received
                        }
                    }
                    None => {
                        // stdin closed — parent process gone
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }

            event = recv_live(&mut live_rx) => {
                match event {
                    Some(event) => {
                        let now = Instant::now();
                        if let LiveEvent::TransportError { message, transient: true } = &event {
                            emit_event(&CopilotEvent::Notice { message: message.clone() });
                        }
                        if session.handle_live_event(event, now) {
                            emit_event(&session.snapshot(now));
                        }
                    }
                    None => {
                        // Reader task gone; session teardown already ran
                        // via Closed / fatal error.
                        live_rx = None;
                    }
                }
            }

            _ = pump.tick() => {
                if matches!(
                    session.status(),
                    SessionStatus::Connecting | SessionStatus::Active
                ) {
                    session.pump_frames(&controls);
                    emit_event(&session.snapshot(Instant::now()));
                }
            }

            _ = answering_sleep(deadline) => {
                let now = Instant::now();
                if session.on_answering_timeout(now) {
                    emit_event(&session.snapshot(now));
                }
            }
        }
    }

    // Shutdown path also releases the microphone.
    session.stop();
    info!("Copilot core shutting down");
}

/// Receive the next realtime event, or park forever when no session is
/// connected.
async fn recv_live(rx: &mut Option<mpsc::UnboundedReceiver<LiveEvent>>) -> Option<LiveEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the answering-timeout deadline, or park forever when the
/// fallback is not armed.
async fn answering_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d.into()).await,
        None => std::future::pending().await,
    }
}

/// Handle a single command from the shell.
/// Returns `false` if the main loop should exit.
async fn handle_command(
    cmd: CopilotCommand,
    session: &mut Session,
    controls: &mut ModeConfig,
    live_rx: &mut Option<mpsc::UnboundedReceiver<LiveEvent>>,
    settings: &LiveSettings,
) -> bool {
    match cmd {
        CopilotCommand::Ping {} => {
            emit_event(&CopilotEvent::Pong {});
            return true;
        }

        CopilotCommand::Stop {} => {
            emit_event(&CopilotEvent::Stopping {});
            return false;
        }

        CopilotCommand::ListAudioDevices {} => {
            emit_event(&CopilotEvent::AudioDevices {
                input: audio::list_devices(),
            });
            return true;
        }

        CopilotCommand::StartSession {} => {
            match session.start(settings, controls).await {
                Ok(Some(rx)) => *live_rx = Some(rx),
                Ok(None) => {} // already running, ignored
                Err(e) => emit_error(&format!("Session start failed: {e}")),
            }
        }

        CopilotCommand::StopSession {} => {
            session.stop();
            controls.reset_session_toggles();
            *live_rx = None;
        }

        CopilotCommand::SetMode { mode } => {
            controls.set_mode(mode);
            session.push_control(controls);
        }

        CopilotCommand::SetMicFlag { party, active } => {
            controls.set_mic_flag(party, active);
            session.push_control(controls);
        }

        CopilotCommand::ToggleFloatingButton {} => {
            controls.toggle_button();
            session.push_control(controls);
        }

        CopilotCommand::NavigateHistory { delta, index } => {
            if let Some(index) = index {
                session.navigate_to(index);
            } else if let Some(delta) = delta {
                session.navigate_by(delta);
            }
        }
    }

    emit_event(&session.snapshot(Instant::now()));
    true
}
