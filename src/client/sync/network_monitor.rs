//! # Network Monitor
//!
//! Tracks connectivity for sync gating. The OS-level online signal is
//! necessary but not sufficient: the monitor only reports online once a
//! `ping` to the backend has succeeded, and goes offline again on the first
//! failed probe.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::client::api_client::RemoteApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Network available and the backend answered the last ping
    Online,
    /// Network available but the backend is unreachable
    Limited,
    Offline,
}

#[derive(Debug)]
pub struct NetworkMonitor {
    os_online: AtomicBool,
    connected: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl NetworkMonitor {
    /// Assumes the network is up but the backend unverified
    pub fn new() -> Self {
        Self {
            os_online: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Record an OS-level online/offline signal
    ///
    /// Returns true on an offline → online transition. Going offline also
    /// drops the connected flag until the next successful probe.
    pub fn set_os_online(&self, online: bool) -> bool {
        let was_online = self.os_online.swap(online, Ordering::AcqRel);
        if !online {
            self.connected.store(false, Ordering::Release);
        }
        online && !was_online
    }

    /// Record a probe result; returns the new connected flag
    pub fn record_probe(&self, ok: bool) -> bool {
        let connected = ok && self.os_online.load(Ordering::Acquire);
        let was_connected = self.connected.swap(connected, Ordering::AcqRel);

        if ok {
            self.consecutive_failures.store(0, Ordering::Release);
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::debug!(failures, "Backend ping failed");
        }

        if connected != was_connected {
            tracing::info!(connected, "Backend connectivity changed");
        }
        connected
    }

    /// Ping the backend and record the result
    ///
    /// Skips the call entirely while the OS reports no network.
    pub async fn probe(&self, api: &dyn RemoteApi) -> bool {
        if !self.os_online.load(Ordering::Acquire) {
            return self.record_probe(false);
        }
        let ok = api.ping().await;
        self.record_probe(ok)
    }

    pub fn is_online(&self) -> bool {
        self.os_online.load(Ordering::Acquire) && self.connected.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn status(&self) -> NetworkStatus {
        match (self.os_online.load(Ordering::Acquire), self.connected.load(Ordering::Acquire)) {
            (false, _) => NetworkStatus::Offline,
            (true, true) => NetworkStatus::Online,
            (true, false) => NetworkStatus::Limited,
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}
