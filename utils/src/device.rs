use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn host() -> cpal::Host {
    cpal::default_host()
}

/// Picks the named input device, or the host default when no name is given.
pub fn input_device(name: Option<&str>) -> anyhow::Result<Device> {
    let host = host();
    tracing::debug!("audio host: {:?}", host.id());
    match name {
        Some(target) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|n| n == target))
            .ok_or_else(|| anyhow::anyhow!("no input device named {target:?}")),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default input device")),
    }
}

/// Picks the named output device, or the host default when no name is given.
pub fn output_device(name: Option<&str>) -> anyhow::Result<Device> {
    let host = host();
    match name {
        Some(target) => host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|n| n == target))
            .ok_or_else(|| anyhow::anyhow!("no output device named {target:?}")),
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device")),
    }
}

/// Human-readable listing of capture devices, one per line, default marked.
pub fn describe_inputs() -> anyhow::Result<String> {
    let host = host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());

    let mut lines = Vec::new();
    for device in host.input_devices()? {
        let name = device.name()?;
        let config = device.default_input_config()?;
        let mut line = format!(" * {}({}ch, {}hz)", name, config.channels(), config.sample_rate().0);
        if Some(&name) == default_name.as_ref() {
            line.push_str(" [default]");
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

/// Human-readable listing of playback devices, one per line, default marked.
pub fn describe_outputs() -> anyhow::Result<String> {
    let host = host();
    let default_name = host
        .default_output_device()
        .and_then(|device| device.name().ok());

    let mut lines = Vec::new();
    for device in host.output_devices()? {
        let name = device.name()?;
        let config = device.default_output_config()?;
        let mut line = format!(" * {}({}ch, {}hz)", name, config.channels(), config.sample_rate().0);
        if Some(&name) == default_name.as_ref() {
            line.push_str(" [default]");
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}
