//! The main on-device binary: runs one pipeline session and drives it from
//! the terminal.
//!
//! Keys: `space` starts, then toggles pause/resume; `k` skips forward 30
//! frames while paused; `q` stops.

use clap::StructOpt;
use eyre::Result;
use talon::{cli::Cli, config::Config};

fn main() -> Result<()> {
    let cli = Cli::parse();
    talon::async_main(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let mut config =
        cli.config.as_ref().map(|path| Config::load(path)).transpose()?.unwrap_or_default();
    cli.apply(&mut config);
    session::run(config, cli.autostart).await
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
mod session {
    use eyre::Result;
    use std::{io, thread};
    use talon::{
        camera::zed::ZedCamera,
        config::Config,
        control::{Command, CommandSender},
        detector::yolo::YoloDetector,
        pipeline::Session,
        telemetry::{Lifecycle, PipelineState},
    };
    use termion::{event::Key, input::TermRead, raw::IntoRawMode};
    use tokio::sync::broadcast::error::RecvError;

    pub async fn run(config: Config, autostart: bool) -> Result<()> {
        let engine_path = config.engine_path.clone();
        let confidence_threshold = config.confidence_threshold;
        let mut session = Session::spawn(
            config,
            ZedCamera::open,
            move || YoloDetector::load(&engine_path, confidence_threshold),
        );
        let commands = session.commands();
        if autostart {
            commands.send(Command::Start);
        }
        spawn_key_thread(commands, autostart);

        let mut lifecycle = session.take_lifecycle().expect("lifecycle receiver already taken");
        let mut progress = session.subscribe_progress();
        let mut failed = false;
        loop {
            tokio::select! {
                event = lifecycle.recv() => match event {
                    Some(Lifecycle::State { state, reason }) => {
                        match reason {
                            Some(reason) => println!("\r[{state:?}] {reason}"),
                            None => println!("\r[{state:?}]"),
                        }
                        if state == PipelineState::Failed {
                            failed = true;
                        }
                        if matches!(state, PipelineState::Stopped | PipelineState::Failed) {
                            break;
                        }
                    }
                    Some(event) => println!("\r{event:?}"),
                    None => break,
                },
                event = progress.recv() => match event {
                    Ok(progress) => {
                        print!(
                            "\rframe {:>6}  {:5.1} fps  {:2} target(s)  {:6.1} ms   ",
                            progress.index,
                            progress.global_fps,
                            progress.detection_count,
                            progress.wall_ms,
                        );
                        use io::Write as _;
                        let _ = io::stdout().flush();
                    }
                    // Lossy by design; skip over the gap.
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {}
                },
            }
        }
        session.join();
        if failed {
            eyre::bail!("the session failed");
        }
        Ok(())
    }

    fn spawn_key_thread(commands: CommandSender, autostart: bool) {
        thread::spawn(move || {
            let Ok(_raw) = io::stdout().into_raw_mode() else {
                tracing::warn!("stdout is not a tty; interactive keys disabled");
                return;
            };
            let mut started = autostart;
            let mut paused = false;
            for key in io::stdin().keys() {
                match key {
                    Ok(Key::Char(' ')) => {
                        if !started {
                            started = true;
                            commands.send(Command::Start);
                        } else if paused {
                            paused = false;
                            commands.send(Command::Resume);
                        } else {
                            paused = true;
                            commands.send(Command::Pause);
                        }
                    }
                    Ok(Key::Char('k')) => commands.send(Command::Skip { frames: 30 }),
                    Ok(Key::Char('q') | Key::Ctrl('c')) => {
                        commands.send(Command::Stop);
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    }
}

#[cfg(not(all(target_arch = "aarch64", target_os = "linux")))]
mod session {
    use eyre::Result;
    use talon::config::Config;

    pub async fn run(_config: Config, _autostart: bool) -> Result<()> {
        eyre::bail!(
            "this binary drives the on-device sensor; build for aarch64-unknown-linux-gnu"
        )
    }
}
