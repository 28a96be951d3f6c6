//! Resolution of developer fields.
//!
//! Developer fields carry no base type on the wire. Instead, a document
//! declares a developer with a developer data ID message, then describes each
//! of its fields with a field description message. Later data records refer to
//! these descriptions by developer data index and field number.

use alloc::{collections::BTreeMap, string::String, vec::Vec};

use thiserror::Error;
use tracing::debug;

use super::{
    base::{Architecture, BaseType},
    data::{Field, Message},
    value::{DecodingStrategy, Number, Resolution, Resolved},
};

/// Global message number of field description messages.
pub const FIELD_DESCRIPTION: u16 = 206;

/// Global message number of developer data ID messages.
pub const DEVELOPER_DATA_ID: u16 = 207;

/// A developer field without a matching field description.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Developer field {number} of developer {developer_index} has no description.")]
pub struct DeveloperFieldError {
    pub developer_index: u8,
    pub number: u8,
}

/// A developer data ID or field description message missing required fields.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Message {global} is missing required fields.")]
pub struct MalformedDeclaration {
    pub global: u16,
}

/// A developer, as declared by a developer data ID message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeveloperDataId {
    pub developer_index: u8,
    pub developer_id: Option<Vec<u8>>,
    pub application_id: Option<Vec<u8>>,
    pub manufacturer_id: Option<u16>,
    pub application_version: Option<u32>,
}

impl DeveloperDataId {
    /// A developer with no identifiers.
    pub fn new(developer_index: u8) -> Self {
        Self {
            developer_index,
            ..Default::default()
        }
    }

    /// Read a developer data ID message.
    ///
    /// Fails if the message lacks a valid developer index.
    pub fn from_message(m: &Message) -> Result<Self, MalformedDeclaration> {
        let malformed = MalformedDeclaration { global: m.global };
        let bytes = |n| m.field(n).map(|f: &Field| f.bytes.clone());

        Ok(Self {
            developer_index: unsigned(m, 3).ok_or(malformed)? as u8,
            developer_id: bytes(0),
            application_id: bytes(1),
            manufacturer_id: unsigned(m, 2).map(|x| x as u16),
            application_version: unsigned(m, 4).map(|x| x as u32),
        })
    }

    /// A developer data ID message declaring this developer.
    pub fn to_message(&self, architecture: Architecture) -> Message {
        let a = architecture;
        let mut m = Message::new(DEVELOPER_DATA_ID).with_architecture(a);

        if let Some(id) = &self.developer_id {
            m = m.with_field(Field::new(0, BaseType::Byte, id.clone()));
        }
        if let Some(id) = &self.application_id {
            m = m.with_field(Field::new(1, BaseType::Byte, id.clone()));
        }
        if let Some(x) = self.manufacturer_id {
            m = m.with_field(Field::from_value(2, BaseType::Uint16, a, x as f64));
        }
        m = m.with_field(Field::from_value(3, BaseType::Uint8, a, self.developer_index as f64));
        if let Some(x) = self.application_version {
            m = m.with_field(Field::from_value(4, BaseType::Uint32, a, x as f64));
        }

        m
    }
}

/// A developer field, as declared by a field description message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub developer_index: u8,
    pub number: u8,
    pub base_type: BaseType,
    pub name: String,
    pub units: String,
    pub scale: Option<u8>,
    pub offset: Option<i8>,
    pub native_message: Option<u16>,
    pub native_field: Option<u8>,
}

impl FieldDescription {
    /// A field stored as is, without units.
    pub fn new(developer_index: u8, number: u8, base_type: BaseType, name: &str) -> Self {
        Self {
            developer_index,
            number,
            base_type,
            name: name.into(),
            units: String::new(),
            scale: None,
            offset: None,
            native_message: None,
            native_field: None,
        }
    }

    /// Set the units of physical values.
    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.into();
        self
    }

    /// Set the scale and offset of stored values.
    pub fn with_resolution(mut self, scale: u8, offset: i8) -> Self {
        self.scale = Some(scale);
        self.offset = Some(offset);
        self
    }

    /// The resolution of values. A missing or zero scale is taken as one.
    pub fn resolution(&self) -> Resolution {
        let scale = self.scale.filter(|s| *s != 0).unwrap_or(1);
        let offset = self.offset.unwrap_or(0);
        Resolution::new(scale as f64, offset as f64)
    }

    /// Convert the bytes of a developer field to physical values.
    pub fn resolve(
        &self,
        r: &[u8],
        architecture: Architecture,
        strategy: DecodingStrategy,
    ) -> Option<Resolved> {
        // Bytes that cannot hold whole elements are left untyped.
        if r.len() % self.base_type.width() != 0 {
            return None;
        }
        super::value::resolve(r, self.base_type, architecture, self.resolution(), strategy)
    }

    /// Read a field description message.
    ///
    /// Fails if the message lacks a developer index, field number or known
    /// base type.
    pub fn from_message(m: &Message) -> Result<Self, MalformedDeclaration> {
        let malformed = MalformedDeclaration { global: m.global };
        let text = |n| {
            m.resolve(n, Resolution::IDENTITY, DecodingStrategy::DropInvalid)
                .and_then(|r| r.as_str().map(String::from))
                .unwrap_or_default()
        };

        let base_type = unsigned(m, 2).ok_or(malformed)? as u8;

        Ok(Self {
            developer_index: unsigned(m, 0).ok_or(malformed)? as u8,
            number: unsigned(m, 1).ok_or(malformed)? as u8,
            base_type: BaseType::from_id(base_type).map_err(|_| malformed)?,
            name: text(3),
            units: text(8),
            scale: unsigned(m, 6).map(|x| x as u8),
            offset: signed(m, 7).map(|x| x as i8),
            native_message: unsigned(m, 14).map(|x| x as u16),
            native_field: unsigned(m, 15).map(|x| x as u8),
        })
    }

    /// A field description message declaring this field.
    pub fn to_message(&self, architecture: Architecture) -> Message {
        let a = architecture;
        let mut m = Message::new(FIELD_DESCRIPTION)
            .with_architecture(a)
            .with_field(Field::from_value(0, BaseType::Uint8, a, self.developer_index as f64))
            .with_field(Field::from_value(1, BaseType::Uint8, a, self.number as f64))
            .with_field(Field::from_value(2, BaseType::Uint8, a, self.base_type.id() as f64));

        if !self.name.is_empty() {
            m = m.with_field(Field::string(3, &self.name));
        }
        if let Some(x) = self.scale {
            m = m.with_field(Field::from_value(6, BaseType::Uint8, a, x as f64));
        }
        if let Some(x) = self.offset {
            m = m.with_field(Field::from_value(7, BaseType::Sint8, a, x as f64));
        }
        if !self.units.is_empty() {
            m = m.with_field(Field::string(8, &self.units));
        }
        if let Some(x) = self.native_message {
            m = m.with_field(Field::from_value(14, BaseType::Uint16, a, x as f64));
        }
        if let Some(x) = self.native_field {
            m = m.with_field(Field::from_value(15, BaseType::Uint8, a, x as f64));
        }

        m
    }
}

fn unsigned(m: &Message, n: u8) -> Option<u64> {
    match m.number(n)? {
        Number::Unsigned(x) => Some(x),
        Number::Signed(x) => u64::try_from(x).ok(),
        Number::Float(_) => None,
    }
}

fn signed(m: &Message, n: u8) -> Option<i64> {
    match m.number(n)? {
        Number::Unsigned(x) => i64::try_from(x).ok(),
        Number::Signed(x) => Some(x),
        Number::Float(_) => None,
    }
}

/// Developers and field descriptions declared so far in a document.
#[derive(Debug, Default, Clone)]
pub struct DeveloperRegistry {
    developers: BTreeMap<u8, DeveloperDataId>,
    fields: BTreeMap<(u8, u8), FieldDescription>,
}

impl DeveloperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a developer.
    ///
    /// Redeclaring a developer data index discards the field descriptions
    /// made under it.
    pub fn register_developer_data(&mut self, id: DeveloperDataId) {
        let index = id.developer_index;

        if self.developers.insert(index, id).is_some() {
            self.fields.retain(|(i, _), _| *i != index);
        }

        debug!(developer_index = index, "Registered developer");
    }

    /// Declare a developer field, replacing any earlier declaration.
    pub fn register_field_description(&mut self, description: FieldDescription) {
        debug!(
            developer_index = description.developer_index,
            number = description.number,
            name = %description.name,
            "Registered developer field"
        );

        let key = (description.developer_index, description.number);
        self.fields.insert(key, description);
    }

    /// The developer declared for an index.
    pub fn developer(&self, developer_index: u8) -> Option<&DeveloperDataId> {
        self.developers.get(&developer_index)
    }

    /// The description of a developer field.
    pub fn resolve(
        &self,
        developer_index: u8,
        number: u8,
    ) -> Result<&FieldDescription, DeveloperFieldError> {
        self.fields
            .get(&(developer_index, number))
            .ok_or(DeveloperFieldError {
                developer_index,
                number,
            })
    }

    /// Register the declaration carried by a message, if any.
    ///
    /// Returns whether the message was a declaration.
    pub fn observe(&mut self, m: &Message) -> Result<bool, MalformedDeclaration> {
        match m.global {
            DEVELOPER_DATA_ID => self.register_developer_data(DeveloperDataId::from_message(m)?),
            FIELD_DESCRIPTION => self.register_field_description(FieldDescription::from_message(m)?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    /// Forget every declaration, as at the start of a document.
    pub fn clear(&mut self) {
        self.developers.clear();
        self.fields.clear();
    }
}
