//! Named results of one resolution session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::{Error, Result};
use crate::memory::Address;

/// Every value a session resolves
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RecordField {
    BugCheckEntry,
    DisplayRoutine,
    SecondaryDisplayRoutine,
    /// Descriptor of the sad-face text
    ConfigHandlerTable,
    LastBranchRecordBase,
    FirstLevelOffset,
    SecondLevelOffset,
    MessageSlotOne,
    MessageSlotTwo,
}

impl RecordField {
    /// Whether the field holds an address (as opposed to a small integer)
    pub fn is_address(self) -> bool {
        !matches!(self, Self::FirstLevelOffset | Self::SecondLevelOffset)
    }
}

/// A resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Address(Address),
    Scalar(u64),
}

impl RecordValue {
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Address(address) => address.get(),
            Self::Scalar(value) => value,
        }
    }
}

/// Built up field by field across the pipeline; valid only once complete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionRecord {
    fields: BTreeMap<RecordField, RecordValue>,
}

impl ResolutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: RecordField, value: RecordValue) {
        self.fields.insert(field, value);
    }

    pub fn set_address(&mut self, field: RecordField, address: Address) {
        self.set(field, RecordValue::Address(address));
    }

    pub fn set_scalar(&mut self, field: RecordField, value: u64) {
        self.set(field, RecordValue::Scalar(value));
    }

    pub fn get(&self, field: RecordField) -> Option<RecordValue> {
        self.fields.get(&field).copied()
    }

    pub fn contains(&self, field: RecordField) -> bool {
        self.fields.contains_key(&field)
    }

    /// The field's value, or `MissingField`
    pub fn require(&self, field: RecordField) -> Result<RecordValue> {
        self.get(field).ok_or(Error::MissingField(field))
    }

    pub fn address(&self, field: RecordField) -> Result<Address> {
        self.require(field).map(|value| Address::new(value.as_u64()))
    }

    pub fn scalar(&self, field: RecordField) -> Result<u64> {
        self.require(field).map(RecordValue::as_u64)
    }

    /// Copy every field of `other` into this record
    pub fn merge(&mut self, other: ResolutionRecord) {
        self.fields.extend(other.fields);
    }

    pub fn missing(&self) -> Vec<RecordField> {
        RecordField::iter().filter(|f| !self.contains(*f)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Fail with the first missing field, if any
    pub fn require_complete(&self) -> Result<()> {
        match self.missing().first() {
            Some(field) => Err(Error::MissingField(*field)),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordField, RecordValue)> + '_ {
        self.fields.iter().map(|(field, value)| (*field, *value))
    }

    /// Move every address from image base `from` to image base `to`
    pub fn rebase(&self, from: Address, to: Address) -> Self {
        let delta = to.distance_from(from);
        let fields = self
            .fields
            .iter()
            .map(|(field, value)| {
                let value = match value {
                    RecordValue::Address(address) => RecordValue::Address(address.offset(delta)),
                    RecordValue::Scalar(_) => *value,
                };
                (*field, value)
            })
            .collect();
        Self { fields }
    }
}
