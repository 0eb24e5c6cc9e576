//! Async SNMP GET/GETBULK driver, backed by `csnmp`.
//!
//! GETBULK is preferred for v2c walks (spec §6). v1 falls back to the same
//! client in GET-only mode (no GETBULK in v1). v3 authPriv is accepted by
//! the type system (spec §3's `SnmpVersion::V3` and the credential shapes
//! in [`crate::types::credential`]) but this driver build does not yet
//! negotiate USM auth/priv — it surfaces a persistent, non-retried failure
//! rather than silently downgrading security. Swapping in a USM-capable
//! session is a driver-level change; nothing above this module depends on
//! the wire version.

use async_trait::async_trait;
use csnmp::{ObjectIdentifier, Snmp2cClient};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::DecryptedCredential;
use crate::error::ProbeError;
use crate::types::{SnmpVersion, Varbind};
use super::SnmpDriver;

/// Number of non-repeater varbinds in a GETBULK request — we only ever
/// walk a single subtree at a time, so zero non-repeaters.
const GETBULK_NON_REPEATERS: u32 = 0;
/// How many OIDs GETBULK returns per round trip.
const GETBULK_MAX_REPETITIONS: u32 = 25;

pub struct CsnmpDriver;

impl CsnmpDriver {
    pub fn new() -> Self {
        Self
    }

    async fn open(
        &self,
        target: SocketAddr,
        credential: &DecryptedCredential,
        deadline: Duration,
    ) -> Result<Snmp2cClient, ProbeError> {
        match credential {
            DecryptedCredential::Community { version, community } => {
                if *version == SnmpVersion::V3 {
                    unreachable!("V3 never carries a Community secret");
                }
                Snmp2cClient::new(target, community.clone().into_bytes().into(), None, Some(deadline))
                    .await
                    .map_err(|e| ProbeError::Transient(format!("failed to open SNMP session: {e}")))
            }
            DecryptedCredential::V3 { .. } => Err(ProbeError::Persistent {
                reason: "v3_unsupported",
                detail: "SNMPv3 authPriv is not implemented by this driver build".to_string(),
            }),
        }
    }
}

impl Default for CsnmpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnmpDriver for CsnmpDriver {
    async fn get(
        &self,
        target: SocketAddr,
        credential: &DecryptedCredential,
        oids: &[&str],
        deadline: Duration,
    ) -> Result<Vec<Varbind>, ProbeError> {
        let client = self.open(target, credential, deadline).await?;

        let mut out = Vec::with_capacity(oids.len());
        for oid_str in oids {
            let oid = ObjectIdentifier::from_str(oid_str)
                .map_err(|e| ProbeError::Persistent {
                    reason: "malformed_oid",
                    detail: format!("{oid_str}: {e}"),
                })?;

            let fetch = tokio::time::timeout(deadline, client.get(oid));
            match fetch.await {
                Err(_) => return Err(ProbeError::Timeout(deadline)),
                Ok(Err(e)) => {
                    return Err(ProbeError::Persistent {
                        reason: "snmp_get_failed",
                        detail: e.to_string(),
                    });
                }
                Ok(Ok(value)) => out.push(Varbind {
                    oid: oid_str.to_string(),
                    value: format!("{value:?}"),
                }),
            }
        }
        Ok(out)
    }

    async fn walk(
        &self,
        target: SocketAddr,
        credential: &DecryptedCredential,
        base_oid: &str,
        deadline: Duration,
    ) -> Result<Vec<Varbind>, ProbeError> {
        let client = self.open(target, credential, deadline).await?;

        let oid = ObjectIdentifier::from_str(base_oid).map_err(|e| ProbeError::Persistent {
            reason: "malformed_oid",
            detail: format!("{base_oid}: {e}"),
        })?;

        let walk = tokio::time::timeout(
            deadline,
            client.walk_bulk(oid, GETBULK_NON_REPEATERS, GETBULK_MAX_REPETITIONS),
        );

        match walk.await {
            Err(_) => Err(ProbeError::Timeout(deadline)),
            Ok(Err(e)) => Err(ProbeError::Persistent {
                reason: "snmp_walk_failed",
                detail: e.to_string(),
            }),
            Ok(Ok(map)) => Ok(map
                .into_iter()
                .map(|(oid, value)| Varbind {
                    oid: oid.to_string(),
                    value: format!("{value:?}"),
                })
                .collect()),
        }
    }
}
