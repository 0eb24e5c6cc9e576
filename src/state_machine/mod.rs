//! Device State Machine (component G, spec §3, §4.2).
//!
//! `down_since` is the sole source of truth for up/down state — never
//! re-derived from the most recent probe alone, since probes can arrive
//! out of order across worker pools. A probe older than the last one
//! applied to a device is dropped here, not upstream, so every caller gets
//! the same ordering guarantee for free.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

use crate::config::FlapConfig;
use crate::types::{Device, DeviceId, FlapState, ProbeResult};

/// What happened when a probe result was applied to a device, if anything
/// observable changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    WentDown { since: DateTime<Utc> },
    CameUp { down_duration: ChronoDuration },
    EnteredFlapping { until: DateTime<Utc> },
    ExitedFlapping,
}

/// Per-device bookkeeping the state machine needs beyond what's persisted
/// on `Device` itself: the ordering key of the last-applied probe (to
/// reject stale arrivals) and a short window of recent up/down flips (to
/// classify flapping).
struct DeviceTrack {
    last_timestamp: DateTime<Utc>,
    last_sequence: u64,
    recent_flips: VecDeque<DateTime<Utc>>,
}

/// The State Machine: owns per-device ordering and flap-history tracking,
/// and is the only writer of `Device::down_since` / `flap_state`.
pub struct StateMachine {
    tracks: DashMap<DeviceId, DeviceTrack>,
    flap: FlapConfig,
}

impl StateMachine {
    pub fn new(flap: FlapConfig) -> Self {
        Self {
            tracks: DashMap::new(),
            flap,
        }
    }

    /// Apply one probe result to a device's state. Returns the updated
    /// device (caller persists it via the Gateway) and the transition that
    /// occurred, if any. A stale or duplicate result is a no-op: returns
    /// the device unchanged and `None`.
    pub fn apply(&self, device: &Device, result: &ProbeResult) -> (Device, Option<Transition>) {
        let mut track = self.tracks.entry(device.id.clone()).or_insert_with(|| DeviceTrack {
            last_timestamp: DateTime::<Utc>::MIN_UTC,
            last_sequence: 0,
            recent_flips: VecDeque::new(),
        });

        if !result.is_newer_than(track.last_timestamp, track.last_sequence) {
            return (device.clone(), None);
        }
        track.last_timestamp = result.timestamp;
        track.last_sequence = result.sequence;

        let was_up = device.is_up();
        let mut next = device.clone();
        let mut transition = None;

        if result.reachable && !was_up {
            let down_since = device.down_since.expect("was_up=false implies down_since is set");
            next.down_since = None;
            transition = Some(Transition::CameUp {
                down_duration: result.timestamp - down_since,
            });
            track.recent_flips.push_back(result.timestamp);
        } else if !result.reachable && was_up {
            next.down_since = Some(result.timestamp);
            transition = Some(Transition::WentDown {
                since: result.timestamp,
            });
            track.recent_flips.push_back(result.timestamp);
        }

        self.prune_flips(&mut track.recent_flips, result.timestamp);

        let required = if device.is_isp_link() {
            self.flap.transitions_isp
        } else {
            self.flap.transitions
        };
        let was_flapping = next.flap_state == FlapState::Flapping
            && next.flap_until.is_some_and(|until| until > result.timestamp);

        if track.recent_flips.len() as u32 >= required {
            let until = result.timestamp + ChronoDuration::seconds(self.flap.suspend_sec as i64);
            next.flap_state = FlapState::Flapping;
            next.flap_until = Some(until);
            if !was_flapping {
                // Flap entry always wins over a same-tick up/down transition —
                // suppression needs to be visible to the Alert Evaluator
                // immediately, not one tick later.
                transition = Some(Transition::EnteredFlapping { until });
            }
        } else if was_flapping {
            next.flap_state = FlapState::Stable;
            next.flap_until = None;
            transition = Some(Transition::ExitedFlapping);
        }

        (next, transition)
    }

    fn prune_flips(&self, flips: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let window_start = now - ChronoDuration::seconds(self.flap.window_sec as i64);
        while flips.front().is_some_and(|t| *t < window_start) {
            flips.pop_front();
        }
    }

    /// Drop tracking state for a device (device deleted/disabled).
    pub fn forget(&self, id: &DeviceId) {
        self.tracks.remove(id);
    }
}
