// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers of keyed objects, invocations and awakeables.

use std::fmt::{self, Display, Formatter};
use std::mem::size_of;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytestring::ByteString;
use ulid::Ulid;

use crate::errors::IdDecodeError;
use crate::id_util::{IdDecoder, IdResourceType, encode_prefix};

/// Sequence number of an entry in an invocation journal.
pub type EntryIndex = u32;

/// Position of a command among the commands of an invocation journal. Notifications do not
/// take part in this numbering.
pub type CommandIndex = u32;

/// Identifies one instance of a keyed virtual object. All the invocations addressed to the same
/// [`ServiceId`] are executed one after the other.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ServiceId {
    pub service_name: ByteString,
    pub key: ByteString,
}

impl ServiceId {
    pub fn new(service_name: impl Into<ByteString>, key: impl Into<ByteString>) -> Self {
        Self {
            service_name: service_name.into(),
            key: key.into(),
        }
    }
}

impl Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_name, self.key)
    }
}

/// Things that are owned by exactly one invocation.
pub trait WithInvocationId {
    fn invocation_id(&self) -> InvocationId;
}

/// Globally unique id of an invocation, rendered as `inv_1<ulid>`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde_with::SerializeDisplay,
    serde_with::DeserializeFromStr,
)]
pub struct InvocationId(Ulid);

impl InvocationId {
    pub const RAW_BYTES_LEN: usize = size_of::<u128>();

    pub fn generate() -> Self {
        InvocationId(Ulid::new())
    }

    pub fn to_bytes(&self) -> [u8; Self::RAW_BYTES_LEN] {
        self.0.to_bytes()
    }

    pub fn from_slice(b: &[u8]) -> Result<Self, IdDecodeError> {
        let bytes: [u8; Self::RAW_BYTES_LEN] = b.try_into().map_err(|_| IdDecodeError::Length)?;
        Ok(InvocationId(Ulid::from_bytes(bytes)))
    }
}

impl FromStr for InvocationId {
    type Err = IdDecodeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let decoder = IdDecoder::new(input)?;
        // Ensure we are decoding the right type
        if decoder.resource_type != IdResourceType::Invocation {
            return Err(IdDecodeError::TypeMismatch);
        }
        let ulid = Ulid::from_string(decoder.remaining).map_err(|_| IdDecodeError::Codec)?;
        Ok(InvocationId(ulid))
    }
}

impl Display for InvocationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut buf = String::with_capacity(32);
        encode_prefix(IdResourceType::Invocation, &mut buf);
        buf.push_str(&self.0.to_string().to_lowercase());
        f.write_str(&buf)
    }
}

impl WithInvocationId for InvocationId {
    fn invocation_id(&self) -> InvocationId {
        *self
    }
}

/// Externally addressable token of a durable promise. It encodes the owning invocation and the
/// command index of the `promise-created` entry, so whoever holds it can resolve the promise
/// without knowing the key the invocation runs on.
///
/// The body is base64 (url safe, no padding) for wider language support.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde_with::SerializeDisplay,
    serde_with::DeserializeFromStr,
)]
pub struct AwakeableIdentifier {
    invocation_id: InvocationId,
    command_index: CommandIndex,
}

impl AwakeableIdentifier {
    const RAW_BYTES_LEN: usize = InvocationId::RAW_BYTES_LEN + size_of::<CommandIndex>();

    pub fn new(invocation_id: InvocationId, command_index: CommandIndex) -> Self {
        Self {
            invocation_id,
            command_index,
        }
    }

    pub fn command_index(&self) -> CommandIndex {
        self.command_index
    }

    pub fn into_inner(self) -> (InvocationId, CommandIndex) {
        (self.invocation_id, self.command_index)
    }
}

impl WithInvocationId for AwakeableIdentifier {
    fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }
}

impl FromStr for AwakeableIdentifier {
    type Err = IdDecodeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let decoder = IdDecoder::new(input)?;
        // Ensure we are decoding the right type
        if decoder.resource_type != IdResourceType::Awakeable {
            return Err(IdDecodeError::TypeMismatch);
        }

        let buffer = URL_SAFE_NO_PAD
            .decode(decoder.remaining)
            .map_err(|_| IdDecodeError::Codec)?;

        if buffer.len() != Self::RAW_BYTES_LEN {
            return Err(IdDecodeError::Length);
        }

        let (invocation_id, command_index) = buffer.split_at(InvocationId::RAW_BYTES_LEN);
        let invocation_id = InvocationId::from_slice(invocation_id)?;
        let command_index = CommandIndex::from_be_bytes(
            command_index
                .try_into()
                .map_err(|_| IdDecodeError::Length)?,
        );

        Ok(Self {
            invocation_id,
            command_index,
        })
    }
}

impl Display for AwakeableIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut input_buf = [0u8; Self::RAW_BYTES_LEN];
        input_buf[..InvocationId::RAW_BYTES_LEN].copy_from_slice(&self.invocation_id.to_bytes());
        input_buf[InvocationId::RAW_BYTES_LEN..]
            .copy_from_slice(&self.command_index.to_be_bytes());

        let mut buf = String::with_capacity(40);
        encode_prefix(IdResourceType::Awakeable, &mut buf);
        URL_SAFE_NO_PAD.encode_string(input_buf, &mut buf);
        f.write_str(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_id_roundtrip() {
        let expected = InvocationId::generate();
        let encoded = expected.to_string();
        assert!(encoded.starts_with("inv_1"));
        assert_eq!(InvocationId::from_str(&encoded).unwrap(), expected);
    }

    #[test]
    fn awakeable_identifier_roundtrip() {
        let expected = AwakeableIdentifier::new(InvocationId::generate(), 42);
        let encoded = expected.to_string();
        assert!(encoded.starts_with("prom_1"));

        let actual = AwakeableIdentifier::from_str(&encoded).unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.command_index(), 42);
        assert_eq!(actual.invocation_id(), expected.invocation_id());
    }

    #[test]
    fn awakeable_identifier_serde_uses_string_form() {
        let id = AwakeableIdentifier::new(InvocationId::generate(), 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let decoded: AwakeableIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn ids_are_not_interchangeable() {
        let invocation_id = InvocationId::generate();
        assert_eq!(
            AwakeableIdentifier::from_str(&invocation_id.to_string()),
            Err(IdDecodeError::TypeMismatch)
        );

        let awakeable_id = AwakeableIdentifier::new(invocation_id, 0);
        assert_eq!(
            InvocationId::from_str(&awakeable_id.to_string()),
            Err(IdDecodeError::TypeMismatch)
        );
    }

    #[test]
    fn truncated_awakeable_identifier_is_rejected() {
        let encoded = AwakeableIdentifier::new(InvocationId::generate(), 1).to_string();
        let truncated = &encoded[..encoded.len() - 3];
        assert_eq!(
            AwakeableIdentifier::from_str(truncated),
            Err(IdDecodeError::Length)
        );
        assert_eq!(
            AwakeableIdentifier::from_str("prom_1!!!"),
            Err(IdDecodeError::Codec)
        );
    }

    #[test]
    fn service_id_display() {
        assert_eq!(ServiceId::new("ClaimAgent", "alice").to_string(), "ClaimAgent/alice");
    }
}
