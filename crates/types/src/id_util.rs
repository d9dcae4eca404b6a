// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Resource identifier helpers and core structures

use std::str::FromStr;

use crate::errors::IdDecodeError;

pub const ID_RESOURCE_SEPARATOR: char = '_';

///  versions of the ID encoding scheme that we use to generate user-facing ID tokens.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum IdSchemeVersion {
    #[default]
    /// V1 is the first version of the ID encoding scheme.
    ///
    /// V1 IDs are encoded as follows:
    /// - up to 4c for the resource type (defined in [`IdResourceType`])
    /// - a separator character `_` as defined in [`ID_RESOURCE_SEPARATOR`]
    /// - 1c for the codec version, currently `1`
    /// - A type-specific encoded string for the ID type.
    V1,
}

impl IdSchemeVersion {
    const fn as_char(&self) -> char {
        match self {
            Self::V1 => '1',
        }
    }
}

impl FromStr for IdSchemeVersion {
    type Err = IdDecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1" => Ok(Self::V1),
            _ => Err(IdDecodeError::Version),
        }
    }
}

/// The set of resources that we can generate IDs for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IdResourceType {
    Invocation,
    Awakeable,
}

impl IdResourceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            IdResourceType::Invocation => "inv",
            IdResourceType::Awakeable => "prom",
        }
    }
}

impl FromStr for IdResourceType {
    type Err = IdDecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "inv" => Ok(IdResourceType::Invocation),
            "prom" => Ok(IdResourceType::Awakeable),
            other => Err(IdDecodeError::UnrecognizedType(other.to_string())),
        }
    }
}

/// Writes the `<type>_<version>` prefix, the caller appends the type-specific body.
pub fn encode_prefix(resource_type: IdResourceType, buf: &mut String) {
    buf.push_str(resource_type.as_str());
    buf.push(ID_RESOURCE_SEPARATOR);
    buf.push(IdSchemeVersion::default().as_char());
}

/// Splits a user-facing id into its resource type and the type-specific body.
pub struct IdDecoder<'a> {
    pub resource_type: IdResourceType,
    pub version: IdSchemeVersion,
    pub remaining: &'a str,
}

impl<'a> IdDecoder<'a> {
    pub fn new(input: &'a str) -> Result<Self, IdDecodeError> {
        let (resource_type, rest) = input
            .split_once(ID_RESOURCE_SEPARATOR)
            .ok_or(IdDecodeError::Format)?;
        let resource_type = IdResourceType::from_str(resource_type)?;

        if rest.is_empty() || !rest.is_char_boundary(1) {
            return Err(IdDecodeError::Length);
        }
        let (version, remaining) = rest.split_at(1);
        let version = IdSchemeVersion::from_str(version)?;
        if remaining.is_empty() {
            return Err(IdDecodeError::Length);
        }

        Ok(Self {
            resource_type,
            version,
            remaining,
        })
    }
}
