//! Async ICMP echo driver, backed by `surge-ping`.
//!
//! One `surge_ping::Client` per process owns the raw socket; `ping()` opens
//! no new handle and is cheap to call from many concurrently-suspended
//! tasks within a single worker (spec §5 concurrency contract).

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, ICMP};
use tracing::debug;

use crate::error::ProbeError;
use super::{IcmpDriver, IcmpEcho};

/// Payload carried in every echo request — small and fixed, like most
/// monitoring pingers.
const PAYLOAD: &[u8] = &[0u8; 32];

pub struct SurgePingDriver {
    client_v4: Client,
    client_v6: Client,
    next_sequence: AtomicU16,
}

impl SurgePingDriver {
    pub fn new() -> Result<Self, ProbeError> {
        let config_v4 = Config::builder().kind(ICMP::V4).build();
        let config_v6 = Config::builder().kind(ICMP::V6).build();
        let client_v4 = Client::new(&config_v4)
            .map_err(|e| ProbeError::Transient(format!("failed to open ICMPv4 socket: {e}")))?;
        let client_v6 = Client::new(&config_v6)
            .map_err(|e| ProbeError::Transient(format!("failed to open ICMPv6 socket: {e}")))?;
        Ok(Self {
            client_v4,
            client_v6,
            next_sequence: AtomicU16::new(0),
        })
    }
}

#[async_trait]
impl IcmpDriver for SurgePingDriver {
    async fn ping(&self, ip: IpAddr, deadline: Duration) -> Result<IcmpEcho, ProbeError> {
        let client = match ip {
            IpAddr::V4(_) => &self.client_v4,
            IpAddr::V6(_) => &self.client_v6,
        };

        let identifier = PingIdentifier(std::process::id() as u16);
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut pinger = client.pinger(ip, identifier).await;
        pinger.timeout(deadline);

        let attempt = tokio::time::timeout(
            deadline,
            pinger.ping(PingSequence(sequence), PAYLOAD),
        )
        .await;

        match attempt {
            Err(_elapsed) => Err(ProbeError::Timeout(deadline)),
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "ICMP echo failed");
                Err(ProbeError::Transient(e.to_string()))
            }
            Ok(Ok((IcmpPacket::V4(_), rtt))) | Ok(Ok((IcmpPacket::V6(_), rtt))) => {
                Ok(IcmpEcho { rtt })
            }
        }
    }
}
