//! List available audio output devices.
//!
//! Small diagnostic for bug reports: prints every output device from every
//! host the way the options window would see them.

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();

    let devices = parkaudio::audio::get_available_output_devices();
    if devices.is_empty() {
        println!("No audio output devices found");
        return Ok(());
    }

    println!("Available audio output devices:");
    for device in &devices {
        if device.is_default {
            println!("  {} (default)", device);
        } else {
            println!("  {}", device);
        }
    }

    Ok(())
}
