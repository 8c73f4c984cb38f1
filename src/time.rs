// SPDX-License-Identifier: Apache-2.0

use std::{os::fd::OwnedFd, time::Duration};

use nix::sys::{
    time::TimeSpec,
    timerfd::{
        ClockId::CLOCK_BOOTTIME, Expiration, TimerFd, TimerFlags,
        TimerSetTimeFlags,
    },
};
use tokio::io::unix::AsyncFd;

use crate::{DhcpError, ErrorKind};

/// Timer depend on CLOCK_BOOTTIME so it continue ticks when system
/// sleeps/hibernates.
#[derive(Debug)]
pub(crate) struct DhcpTimer {
    /// Deadline as time since boot
    pub(crate) end: Duration,
}

impl DhcpTimer {
    pub(crate) fn new_at(end: Duration) -> Self {
        Self { end }
    }

    pub(crate) async fn wait(&self) -> Result<(), DhcpError> {
        let remains = self.remains()?;
        if !remains.is_zero() {
            let fd = TimerFd::new(CLOCK_BOOTTIME, TimerFlags::TFD_NONBLOCK)
                .map_err(|e| {
                    let e = DhcpError::new(
                        ErrorKind::Bug,
                        format!("Failed to create timerfd {e}"),
                    );
                    log::error!("{e}");
                    e
                })?;
            fd.set(
                Expiration::OneShot(TimeSpec::from_duration(remains)),
                TimerSetTimeFlags::empty(),
            )
            .map_err(|e| {
                let e = DhcpError::new(
                    ErrorKind::Bug,
                    format!("Failed to set timerfd {e}"),
                );
                log::error!("{e}");
                e
            })?;
            log::trace!(
                "DHCP timer {:?} armed for {} seconds {} milliseconds",
                fd,
                remains.as_secs(),
                remains.subsec_millis(),
            );
            let _ = AsyncFd::new(OwnedFd::from(fd))?.readable().await?;
        }
        Ok(())
    }

    pub(crate) fn remains(&self) -> Result<Duration, DhcpError> {
        Ok(self.end.saturating_sub(boot_time_now()?))
    }
}

pub(crate) fn boot_time_now() -> Result<Duration, DhcpError> {
    nix::time::clock_gettime(nix::time::ClockId::CLOCK_BOOTTIME)
        .map(Duration::from)
        .map_err(|e| {
            let e = DhcpError::new(
                ErrorKind::Bug,
                format!("Failed to retrieve CLOCK_BOOTTIME: {e}"),
            );
            log::error!("{e}");
            e
        })
}
