//! Audio device listing command.

use clap::Args;
use resona_io::{AudioBackend, CpalBackend};

#[derive(Args)]
pub struct DevicesArgs {
    /// Only show input devices
    #[arg(long, conflicts_with = "output")]
    input: bool,

    /// Only show output devices
    #[arg(long)]
    output: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let backend = CpalBackend::new();
    let devices = backend.list_devices()?;

    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("Audio devices ({}):", backend.name());
    for (i, device) in devices.iter().enumerate() {
        if args.input && !device.is_input {
            continue;
        }
        if args.output && !device.is_output {
            continue;
        }
        let role = match (device.is_input, device.is_output) {
            (true, true) => "in/out",
            (true, false) => "in",
            (false, true) => "out",
            (false, false) => "-",
        };
        println!(
            "  [{i}] {} ({role}, {} Hz)",
            device.name, device.default_sample_rate
        );
    }

    if let Ok(Some(input)) = backend.default_input_device() {
        println!("Default input:  {}", input.name);
    }
    if let Ok(Some(output)) = backend.default_output_device() {
        println!("Default output: {}", output.name);
    }
    Ok(())
}
