//! Interface to the schemas giving fields their meaning.
//!
//! The engine learns the size and base type of every field from the document
//! itself. What a field means (its name, units, scale and offset) and which
//! fields a message must carry are properties of the FIT profile, supplied by
//! the application through a [`Catalog`]. Static tables of [`MessageProfile`]s
//! implement the trait directly:
//!
//! ```ignore
//! use cassette::{
//!     catalog::{FieldProfile, MessageProfile},
//!     sans::{base::BaseType, value::Resolution},
//! };
//!
//! const RECORD_FIELDS: &[FieldProfile] = &[
//!     FieldProfile::new(253, "timestamp", BaseType::Uint32),
//!     FieldProfile::new(2, "altitude", BaseType::Uint16)
//!         .with_resolution(Resolution::new(5.0, 500.0))
//!         .with_units("m"),
//! ];
//!
//! const CATALOG: &[MessageProfile] = &[MessageProfile::new(20, "record", RECORD_FIELDS)];
//! ```

use alloc::vec::Vec;

use crate::sans::{
    base::BaseType,
    data::Message,
    timestamp::TIMESTAMP_FIELD,
    value::{DecodingStrategy, Resolution, Resolved},
};

/// Checks an encoder applies before writing a message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ValidityStrategy {
    /// Write any well-formed message.
    #[default]
    None,
    /// Require the fields the profile marks as mandatory for the file type.
    FileTypeInvariants,
    /// Additionally require the fields particular consumers treat as
    /// mandatory.
    VendorSpecificInvariants,
}

/// The meaning of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldProfile {
    pub number: u8,
    pub name: &'static str,
    /// The base type the profile declares, for applications building messages.
    pub base_type: BaseType,
    pub resolution: Resolution,
    pub units: &'static str,
}

impl FieldProfile {
    /// A field stored as is, without units.
    pub const fn new(number: u8, name: &'static str, base_type: BaseType) -> Self {
        Self {
            number,
            name,
            base_type,
            resolution: Resolution::IDENTITY,
            units: "",
        }
    }

    /// Set the scale and offset of stored values.
    pub const fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the units of physical values.
    pub const fn with_units(mut self, units: &'static str) -> Self {
        self.units = units;
        self
    }
}

/// The meaning of a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageProfile {
    pub number: u16,
    pub name: &'static str,
    pub fields: &'static [FieldProfile],
    /// Fields required under [`ValidityStrategy::FileTypeInvariants`].
    pub required: &'static [u8],
    /// Fields additionally required under
    /// [`ValidityStrategy::VendorSpecificInvariants`].
    pub vendor_required: &'static [u8],
}

impl MessageProfile {
    /// A message with no required fields.
    pub const fn new(number: u16, name: &'static str, fields: &'static [FieldProfile]) -> Self {
        Self {
            number,
            name,
            fields,
            required: &[],
            vendor_required: &[],
        }
    }

    /// Set the fields required under [`ValidityStrategy::FileTypeInvariants`].
    pub const fn with_required(mut self, required: &'static [u8]) -> Self {
        self.required = required;
        self
    }

    /// Set the fields additionally required under
    /// [`ValidityStrategy::VendorSpecificInvariants`].
    pub const fn with_vendor_required(mut self, vendor_required: &'static [u8]) -> Self {
        self.vendor_required = vendor_required;
        self
    }

    /// The profile of a field, if known.
    pub fn field(&self, number: u8) -> Option<&FieldProfile> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Field numbers required under a validity strategy.
    pub fn required_for(&self, strategy: ValidityStrategy) -> impl Iterator<Item = u8> + '_ {
        let (required, vendor_required): (&[u8], &[u8]) = match strategy {
            ValidityStrategy::None => (&[], &[]),
            ValidityStrategy::FileTypeInvariants => (self.required, &[]),
            ValidityStrategy::VendorSpecificInvariants => (self.required, self.vendor_required),
        };

        required.iter().chain(vendor_required).copied()
    }

    /// The first required field a message lacks, if any.
    ///
    /// Fields holding their 'invalid' marker value count as missing. A
    /// compressed timestamp satisfies a required timestamp field.
    pub fn missing_field(&self, m: &Message, strategy: ValidityStrategy) -> Option<u8> {
        self.required_for(strategy).find(|n| {
            let present = m.field(*n).is_some_and(|f| {
                f.resolve(m.architecture, Resolution::IDENTITY, DecodingStrategy::DropInvalid)
                    .is_some()
            });

            !present && !(*n == TIMESTAMP_FIELD && m.timestamp().is_some())
        })
    }
}

/// A field converted to physical values under its profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub number: u8,
    /// Name from the catalog, if the field is known.
    pub name: Option<&'static str>,
    pub units: &'static str,
    pub value: Resolved,
}

/// A source of message profiles.
pub trait Catalog {
    /// Retrieve the profile of a message, if known.
    fn message(&self, global: u16) -> Option<&MessageProfile>;

    /// Retrieve the profile of a field of a message, if known.
    fn field(&self, global: u16, number: u8) -> Option<&FieldProfile> {
        self.message(global)?.field(number)
    }

    /// Convert every field of a message to physical values.
    ///
    /// Fields unknown to the catalog are resolved as stored.
    fn resolve(&self, m: &Message, strategy: DecodingStrategy) -> Vec<ResolvedField> {
        m.fields
            .iter()
            .filter_map(|f| {
                let profile = self.field(m.global, f.number);
                let resolution = profile.map_or(Resolution::IDENTITY, |p| p.resolution);

                let value = f.resolve(m.architecture, resolution, strategy)?;

                Some(ResolvedField {
                    number: f.number,
                    name: profile.map(|p| p.name),
                    units: profile.map_or("", |p| p.units),
                    value,
                })
            })
            .collect()
    }
}

/// An empty catalog.
impl Catalog for () {
    fn message(&self, _: u16) -> Option<&MessageProfile> {
        None
    }
}

impl Catalog for [MessageProfile] {
    fn message(&self, global: u16) -> Option<&MessageProfile> {
        self.iter().find(|m| m.number == global)
    }
}
