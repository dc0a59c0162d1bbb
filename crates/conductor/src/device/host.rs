//! Host Backend - Capabilities implemented with the platform's own tools
//!
//! Linux leans on NetworkManager, rfkill, ALSA and sysfs; macOS on
//! networksetup, blueutil, osascript and pmset; Windows on netsh and
//! PowerShell. Missing tools surface as `BackendError`s, never panics.

use super::{BackendError, BatteryStatus, DeviceBackend, RadioState, ShellRun, VolumeReading};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::process::Command;

const MAC_WIFI_DEVICE: &str =
    "networksetup -listallhardwareports | awk '/Hardware Port: Wi-Fi/{getline; print $2}'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Other => std::env::consts::OS,
        }
    }
}

/// Build a command that runs `line` through the platform shell
pub(crate) fn shell_command(line: &str) -> Command {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    };

    command.kill_on_drop(true);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command
}

/// Run `line` to completion and collect its output untouched
pub(crate) async fn run_shell(line: &str) -> Result<ShellRun, BackendError> {
    let output = shell_command(line)
        .output()
        .await
        .map_err(|source| BackendError::Spawn {
            program: line.to_string(),
            source,
        })?;

    Ok(ShellRun {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a helper command; a non-zero exit is an error carrying stderr
async fn capture(line: &str) -> Result<String, BackendError> {
    let run = run_shell(line).await?;
    if run.exit_code != 0 {
        let stderr = run.stderr.trim();
        log::debug!("Helper command '{}' failed: {}", line, stderr);
        return Err(BackendError::CommandFailed {
            command: line.to_string(),
            detail: if stderr.is_empty() {
                format!("exit code {}", run.exit_code)
            } else {
                stderr.to_string()
            },
        });
    }
    Ok(run.stdout.trim().to_string())
}

/// The machine this process runs on
pub struct HostBackend {
    platform: Platform,
    system: Mutex<Sampler>,
}

/// System counters plus the time CPU usage was last refreshed
struct Sampler {
    system: System,
    cpu_refreshed: Instant,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::for_platform(Platform::current())
    }

    pub fn for_platform(platform: Platform) -> Self {
        let mut system = System::new();
        // Seed CPU counters so the first usage read has a baseline
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            platform,
            system: Mutex::new(Sampler {
                system,
                cpu_refreshed: Instant::now(),
            }),
        }
    }

    fn unsupported(&self, what: &str) -> BackendError {
        BackendError::Unsupported(format!("{what} ({})", self.platform.as_str()))
    }

    async fn mac_wifi_device(&self) -> Result<String, BackendError> {
        let device = capture(MAC_WIFI_DEVICE).await?;
        if device.is_empty() {
            return Err(BackendError::Unavailable(
                "Could not determine Wi-Fi device ID on macOS.".to_string(),
            ));
        }
        Ok(device)
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBackend for HostBackend {
    fn platform(&self) -> &str {
        self.platform.as_str()
    }

    async fn set_brightness(&self, level: u8) -> Result<(), BackendError> {
        let command = match self.platform {
            Platform::Linux => format!("brightnessctl set {level}%"),
            Platform::MacOs => format!("brightness {:.2}", f32::from(level) / 100.0),
            Platform::Windows => format!(
                "powershell -NoProfile -Command \"(Get-WmiObject -Namespace root/WMI \
                 -Class WmiMonitorBrightnessMethods).WmiSetBrightness(1,{level})\""
            ),
            Platform::Other => return Err(self.unsupported("Brightness control")),
        };
        capture(&command).await.map(|_| ())
    }

    async fn set_volume(&self, level: u8) -> Result<(), BackendError> {
        let command = match self.platform {
            Platform::Linux => format!("amixer sset Master {level}%"),
            Platform::MacOs => format!("osascript -e 'set volume output volume {level}'"),
            _ => return Err(self.unsupported("Volume control")),
        };
        capture(&command).await.map(|_| ())
    }

    async fn get_volume(&self) -> Result<VolumeReading, BackendError> {
        match self.platform {
            Platform::Linux => {
                let output = capture("amixer sget Master").await?;
                parse_amixer(&output).ok_or(BackendError::Parse {
                    what: "volume".to_string(),
                    output,
                })
            }
            Platform::MacOs => {
                let level = capture("osascript -e 'output volume of (get volume settings)'").await?;
                let muted = capture("osascript -e 'output muted of (get volume settings)'").await?;
                let level = level.parse::<u8>().map_err(|_| BackendError::Parse {
                    what: "volume".to_string(),
                    output: level.clone(),
                })?;
                Ok(VolumeReading {
                    level: level.min(100),
                    muted: muted == "true",
                })
            }
            _ => Err(self.unsupported("Volume control")),
        }
    }

    async fn toggle_wifi(&self, state: RadioState) -> Result<(), BackendError> {
        let command = match self.platform {
            Platform::Linux => format!("nmcli radio wifi {state}"),
            Platform::MacOs => {
                let device = self.mac_wifi_device().await?;
                format!("networksetup -setairportpower {device} {state}")
            }
            Platform::Windows => {
                let action = match state {
                    RadioState::On => "enable",
                    RadioState::Off => "disable",
                };
                format!("netsh interface set interface name=\"Wi-Fi\" admin={action}")
            }
            Platform::Other => return Err(self.unsupported("Wi-Fi toggle")),
        };
        capture(&command).await.map(|_| ())
    }

    async fn toggle_bluetooth(&self, state: RadioState) -> Result<(), BackendError> {
        match self.platform {
            Platform::Linux => {
                let action = match state {
                    RadioState::On => "unblock",
                    RadioState::Off => "block",
                };
                let command = format!("rfkill {action} bluetooth");
                capture(&command).await?;

                // A hardware switch can leave the radio blocked even after rfkill succeeds
                let soft = capture("rfkill list bluetooth -n -o SOFT").await?;
                let now = parse_rfkill_soft(&soft);
                if now != Some(state) {
                    let seen = now.map(|s| s.as_str()).unwrap_or("unknown");
                    return Err(BackendError::CommandFailed {
                        command,
                        detail: format!(
                            "state is still {seen}. Check hardware switch or permissions."
                        ),
                    });
                }
                Ok(())
            }
            Platform::MacOs => {
                let flag = match state {
                    RadioState::On => 1,
                    RadioState::Off => 0,
                };
                capture(&format!("blueutil --power {flag}")).await.map(|_| ())
            }
            _ => Err(self.unsupported("Bluetooth toggle")),
        }
    }

    async fn get_wifi_status(&self) -> Result<RadioState, BackendError> {
        match self.platform {
            Platform::Linux => {
                let output = capture("nmcli radio wifi").await?;
                match output.to_lowercase().as_str() {
                    "enabled" => Ok(RadioState::On),
                    "disabled" => Ok(RadioState::Off),
                    _ => Err(BackendError::Parse {
                        what: "Wi-Fi state".to_string(),
                        output,
                    }),
                }
            }
            Platform::MacOs => {
                let device = self.mac_wifi_device().await?;
                let output = capture(&format!("networksetup -getairportpower {device}")).await?;
                Ok(if output.contains("On") {
                    RadioState::On
                } else {
                    RadioState::Off
                })
            }
            Platform::Windows => {
                let output = capture("netsh interface show interface name=\"Wi-Fi\"").await?;
                Ok(if output.contains("Connected") {
                    RadioState::On
                } else {
                    RadioState::Off
                })
            }
            Platform::Other => Err(self.unsupported("Wi-Fi status")),
        }
    }

    async fn get_bluetooth_status(&self) -> Result<RadioState, BackendError> {
        match self.platform {
            Platform::Linux => {
                let output = capture("rfkill list bluetooth").await?;
                Ok(if output.contains("Soft blocked: yes") {
                    RadioState::Off
                } else {
                    RadioState::On
                })
            }
            Platform::MacOs => {
                let output = capture("blueutil --power").await?;
                Ok(if output == "1" {
                    RadioState::On
                } else {
                    RadioState::Off
                })
            }
            _ => Err(self.unsupported("Bluetooth status")),
        }
    }

    async fn get_battery_status(&self) -> Result<Option<BatteryStatus>, BackendError> {
        match self.platform {
            Platform::Linux => linux_battery(Path::new("/sys/class/power_supply")).await,
            Platform::MacOs => {
                let output = capture("pmset -g batt").await?;
                Ok(parse_pmset(&output))
            }
            _ => Err(self.unsupported("Battery status")),
        }
    }

    /// Usage over the window since the previous read. A window shorter
    /// than `MINIMUM_CPU_UPDATE_INTERVAL` is stretched by blocking for the
    /// remainder, so back-to-back reads still sample a real interval.
    fn get_cpu_usage(&self) -> Result<f32, BackendError> {
        let mut sampler = self.system.lock();
        let elapsed = sampler.cpu_refreshed.elapsed();
        if elapsed < MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - elapsed);
        }
        sampler.system.refresh_cpu_usage();
        sampler.cpu_refreshed = Instant::now();
        Ok(sampler.system.global_cpu_usage())
    }

    fn get_memory_usage(&self) -> Result<f32, BackendError> {
        let mut sampler = self.system.lock();
        let system = &mut sampler.system;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(BackendError::Unavailable("Memory statistics unavailable.".to_string()));
        }
        Ok((system.used_memory() as f64 / total as f64 * 100.0) as f32)
    }

    async fn run_shell_command(&self, command: &str) -> Result<ShellRun, BackendError> {
        run_shell(command).await
    }
}

/// First `Playback` line carrying `[NN%]`; `[off]` means muted
fn parse_amixer(output: &str) -> Option<VolumeReading> {
    output
        .lines()
        .filter(|line| line.contains("Playback") && line.contains('%'))
        .find_map(|line| {
            let start = line.find('[')? + 1;
            let end = start + line[start..].find("%]")?;
            let level = line[start..end].trim().parse::<u8>().ok()?;
            Some(VolumeReading {
                level: level.min(100),
                muted: line.to_lowercase().contains("[off]"),
            })
        })
}

/// `rfkill list -n -o SOFT` prints one `blocked`/`unblocked` per device
fn parse_rfkill_soft(output: &str) -> Option<RadioState> {
    let states: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if states.is_empty() {
        None
    } else if states.iter().all(|s| *s == "unblocked") {
        Some(RadioState::On)
    } else {
        Some(RadioState::Off)
    }
}

/// `pmset -g batt`: `-InternalBattery-0 (id=..)	87%; charging; 1:02 remaining`
fn parse_pmset(output: &str) -> Option<BatteryStatus> {
    let line = output.lines().find(|line| line.contains("InternalBattery"))?;
    let mut fields = line.split(';').map(str::trim);

    let percent = fields
        .next()?
        .split_whitespace()
        .last()?
        .trim_end_matches('%')
        .parse::<f32>()
        .ok()?;
    let state = fields.next().unwrap_or_default();

    Some(BatteryStatus {
        percent,
        charging: state != "discharging",
    })
}

async fn linux_battery(root: &Path) -> Result<Option<BatteryStatus>, BackendError> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let dir = entry.path();
        let kind = read_trimmed(&dir.join("type")).await.unwrap_or_default();
        if kind != "Battery" {
            continue;
        }

        let capacity = read_trimmed(&dir.join("capacity")).await?;
        let percent = capacity.parse::<f32>().map_err(|_| BackendError::Parse {
            what: "battery capacity".to_string(),
            output: capacity.clone(),
        })?;
        let status = read_trimmed(&dir.join("status")).await.unwrap_or_default();

        return Ok(Some(BatteryStatus {
            percent,
            charging: status != "Discharging",
        }));
    }

    Ok(None)
}

async fn read_trimmed(path: &Path) -> Result<String, BackendError> {
    Ok(tokio::fs::read_to_string(path).await?.trim().to_string())
}
