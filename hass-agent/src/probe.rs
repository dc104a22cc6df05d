//! Reachability probing
//!
//! Sends one echo request per target, sequentially, each bounded by
//! [`PROBE_TIMEOUT`], and reduces the successful round trips to their mean.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::ProbeError;

/// Upper bound for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// One echo request.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Round-trip time in milliseconds.
    async fn ping(&self, target: IpAddr, timeout: Duration) -> Result<f64, ProbeError>;
}

/// Mean round trip over `targets` in milliseconds, `None` when no probe
/// succeeded.
pub async fn probe<'a, I>(pinger: &dyn Pinger, targets: I, timeout: Duration) -> Option<f64>
where
    I: IntoIterator<Item = &'a IpAddr>,
{
    let mut total = 0.0;
    let mut replies = 0u32;

    for target in targets {
        match pinger.ping(*target, timeout).await {
            Ok(round_trip) => {
                total += round_trip;
                replies += 1;
            }
            Err(e) => debug!("Ping {} {}", target, e),
        }
    }

    (replies > 0).then(|| total / f64::from(replies))
}

/// [`Pinger`] running the platform `ping` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPinger;

impl SystemPinger {
    fn command(target: IpAddr, timeout: Duration) -> AsyncCommand {
        let mut command = AsyncCommand::new("ping");
        if cfg!(windows) {
            command.args(["-n", "1", "-w", &timeout.as_millis().to_string()]);
        } else if cfg!(target_os = "macos") {
            command.args(["-c", "1", "-W", &timeout.as_millis().to_string()]);
        } else {
            command.args(["-c", "1", "-W", &timeout.as_secs().max(1).to_string()]);
        }
        if !cfg!(windows) {
            // parse_round_trip expects the untranslated `time=`
            command.env("LC_ALL", "C");
        }
        command
            .arg(target.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, target: IpAddr, timeout: Duration) -> Result<f64, ProbeError> {
        // Process start-up gets a little slack on top of the echo timeout
        let output = tokio::time::timeout(
            timeout + Duration::from_millis(500),
            Self::command(target, timeout).output(),
        )
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(ProbeError::Unreachable(format!(
                "exit code {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        parse_round_trip(&stdout)
            .ok_or_else(|| ProbeError::Unreachable("no round-trip time in reply".to_string()))
    }
}

/// Round-trip milliseconds from `ping` output (`time=12.3 ms`, `time<1ms`).
pub fn parse_round_trip(output: &str) -> Option<f64> {
    let Some(start) = output.find("time=") else {
        // Sub-millisecond replies are reported as 0
        return output.contains("time<").then_some(0.0);
    };
    let rest = &output[start + "time=".len()..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}
