//! oxidized-xenon - Xbox 360 emulator
//!
//! Main entry point for the emulator application.

use std::path::Path;

use anyhow::anyhow;
use ox_apu::{AudioSystem, NullAudioSystem};
use ox_core::Config;
use ox_gpu::{GraphicsSystem, NullGraphicsSystem};
use ox_hid::{InputDriver, NullInputDriver};
use ox_integration::{AudioSystemFactory, Emulator, GraphicsSystemFactory, InputDriverFactory};
use ox_ui::Window;

fn main() -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| anyhow!("failed to load configuration: {e}"))?;
    ox_core::logging::init(config.debug.log_level.as_filter());

    tracing::info!("Starting oxidized-xenon");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(target) = args.first().cloned() else {
        anyhow::bail!("usage: oxidized-xenon <path to .xex, disc image or STFS container>");
    };
    let command_line = args.join(" ");

    let window = Window::new("oxidized-xenon");

    let audio: AudioSystemFactory =
        Box::new(|_| Some(Box::new(NullAudioSystem::new()) as Box<dyn AudioSystem>));
    let graphics: GraphicsSystemFactory =
        Box::new(|| Some(Box::new(NullGraphicsSystem::new()) as Box<dyn GraphicsSystem>));
    let input: InputDriverFactory =
        Box::new(|_| vec![Box::new(NullInputDriver::new()) as Box<dyn InputDriver>]);

    let mut emulator = Emulator::new(config, command_line);
    emulator.setup(window, Some(audio), graphics, Some(input))?;
    emulator.launch_path(Path::new(&target))?;

    tracing::info!("Title launched; shutting down");
    Ok(())
}
