//! SNMPCredential (spec §3). Ciphertexts only — decryption happens in
//! [`crate::credentials`] at the point of use, never at load time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

/// SNMP v3 security parameters (authPriv only, per spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V3Params {
    pub user: String,
    /// Ciphertext — authenticated decryption happens at use, never logged.
    pub auth_key_ciphertext: Vec<u8>,
    pub priv_key_ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CredentialSecret {
    /// v1/v2c: encrypted community string.
    Community { ciphertext: Vec<u8> },
    /// v3 authPriv.
    V3(V3Params),
}

/// A stored SNMP credential. Invariant: at most one `is_default` per
/// organization; this is enforced at the relational layer (a partial
/// unique index), not re-derived here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpCredential {
    pub id: String,
    pub version: SnmpVersion,
    pub secret: CredentialSecret,
    pub priority: i32,
    pub is_default: bool,
}
