#![cfg(feature = "std")]

use std::path::Path;

use cassette::{
    avec::{
        DecodeOptions, DeveloperValue, Error, ErrorKind, FromRecord, FromRecords, Warning,
        encode::{EncodeOptions, encode},
        slice::SliceSource,
    },
    sans::{
        base::{Architecture, BaseType},
        check::compute_crc,
        data::{Field, Message},
        developer::DeveloperFieldError,
        value::DecodingStrategy,
    },
};
use csv::ReaderBuilder;

const PATH: &str = "fixtures/synthetic-ride.fit";

fn unresolved() -> Warning {
    Warning::UnresolvedDeveloperField {
        message: 8,
        source: DeveloperFieldError {
            developer_index: 0,
            number: 1,
        },
    }
}

#[test]
fn decode_slice_synthetic_ride() {
    let data = std::fs::read(PATH).unwrap();
    let mut validator = Validator::new(PATH);
    let warnings = cassette::avec::decode_slice(&data, &mut validator).unwrap();
    validator.finish();

    assert_eq!(warnings, vec![unresolved()]);
}

#[test]
fn decode_reader_synthetic_ride() {
    let mut file = std::fs::File::open(PATH).unwrap();
    let mut validator = Validator::new(PATH);
    let warnings = cassette::avec::decode_reader(&mut file, &mut validator).unwrap();
    validator.finish();

    assert_eq!(warnings, vec![unresolved()]);
}

#[test]
fn decode_chained_documents() {
    let data = std::fs::read(PATH).unwrap();
    let chained = [data.as_slice(), data.as_slice()].concat();

    let messages = cassette::avec::slice::messages(&chained, DecodeOptions::default());
    assert_eq!(messages.map(Result::unwrap).count(), 20);

    let options = DecodeOptions::default().with_chained(false);
    let messages = cassette::avec::slice::messages(&chained, options);
    assert_eq!(messages.map(Result::unwrap).count(), 10);
}

#[test]
fn decode_developer_declarations() {
    let data = std::fs::read(PATH).unwrap();
    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());

    // File ID, developer data ID, field description.
    for _ in 0..3 {
        messages.next().unwrap().unwrap();
    }

    let description = messages.developer().resolve(0, 0).unwrap();
    assert_eq!(description.name, "power");
    assert_eq!(description.units, "watts");
    assert_eq!(description.scale, Some(2));

    let developer = messages.developer().developer(0).unwrap();
    assert_eq!(developer.application_id, Some((0..16).collect()));
}

#[test]
fn decode_compressed_timestamps() {
    let data = std::fs::read(PATH).unwrap();
    let timestamps: Vec<_> = cassette::avec::slice::messages(&data, DecodeOptions::default())
        .map(Result::unwrap)
        .filter(|m| m.global == 20)
        .map(|m| (m.timestamp(), m.compressed_timestamp.is_some()))
        .collect();

    assert_eq!(
        timestamps,
        vec![
            (Some(1_000_000_000), false),
            (Some(1_000_000_002), false),
            (Some(1_000_000_005), true),
            (Some(1_000_000_035), true),
            (Some(1_000_000_040), false),
            (Some(1_000_000_041), false),
        ]
    );
}

#[test]
fn decode_keeping_sentinels() {
    #[derive(Default)]
    struct Latitudes(Vec<i32>, usize);

    impl FromRecords for Latitudes {
        fn add_record(&mut self, id: u16) -> Option<&mut dyn FromRecord> {
            (id == 20).then_some(self as _)
        }
    }

    impl FromRecord for Latitudes {
        fn add_i32(&mut self, field: u8, value: i32) {
            if field == 0 {
                self.0.push(value);
            }
        }

        fn add_developer_field(&mut self, field: &DeveloperValue<'_>) {
            if field.description.is_some() {
                self.1 += 1;
            }
        }
    }

    let data = std::fs::read(PATH).unwrap();
    let options = DecodeOptions::default().with_strategy(DecodingStrategy::KeepSentinel);

    let mut latitudes = Latitudes::default();
    cassette::avec::slice::decode_with(&data, &mut latitudes, options).unwrap();
    assert_eq!(latitudes.0, vec![-1000, i32::MAX]);
    assert_eq!(latitudes.1, 2);

    let mut latitudes = Latitudes::default();
    cassette::avec::decode_slice(&data, &mut latitudes).unwrap();
    assert_eq!(latitudes.0, vec![-1000]);
    assert_eq!(latitudes.1, 1);
}

#[test]
fn decode_corrupt_checksum() {
    let mut data = std::fs::read(PATH).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;

    let mut validator = Validator::new(PATH);
    let warnings = cassette::avec::decode_slice(&data, &mut validator).unwrap();
    assert!(matches!(
        warnings.last(),
        Some(Warning::Checksum { .. })
    ));

    let options = DecodeOptions::default().with_require_checksum(true);
    let mut validator = Validator::new(PATH);
    let err = cassette::avec::slice::decode_with(&data, &mut validator, options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn decode_truncated() {
    let data = std::fs::read(PATH).unwrap();

    for end in [0, 5, 13, 40, data.len() - 2] {
        let mut messages =
            cassette::avec::Messages::new(SliceSource::new(&data[..end]), DecodeOptions::default());

        let err = messages.find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::Structural, "truncated at {end}");
        assert!(messages.next().is_none());
    }
}

#[test]
fn decode_not_fit_data() {
    let mut data = std::fs::read(PATH).unwrap();
    data[8..12].copy_from_slice(b".TIF");

    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());
    let err = messages.next().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn decode_undefined_local_message() {
    let data = std::fs::read(PATH).unwrap();
    let mut data = data[..14].to_vec();
    set_data_size(&mut data, 1);
    data.push(0x07); // Data record for local message 7.
    data.extend_from_slice(&[0, 0]);

    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());
    let err = messages.next().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolState);
}

#[test]
fn decode_declared_size_beyond_data() {
    let mut data = std::fs::read(PATH).unwrap();
    let size = data_size(&data);
    set_data_size(&mut data, size + 1);

    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());
    let err = messages.next().unwrap().unwrap_err();
    assert!(matches!(err, Error::Truncated { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(messages.next().is_none());
}

#[test]
fn decode_records_beyond_declared_size() {
    let mut data = std::fs::read(PATH).unwrap();
    let size = data_size(&data);
    set_data_size(&mut data, size - 1);

    let err = cassette::avec::slice::messages(&data, DecodeOptions::default())
        .find_map(Result::err)
        .unwrap();

    match err {
        Error::DataSize { declared, consumed } => {
            assert_eq!(declared, size - 1);
            assert_eq!(consumed, size as usize);
        }
        err => panic!("unexpected error: {err}"),
    }
}

#[test]
fn decode_compressed_timestamp_without_reference() {
    let mut data = vec![12, 0x20, 0x54, 0x08, 12, 0, 0, 0];
    data.extend_from_slice(b".FIT");
    // Local message 0 as a record with an altitude field.
    data.extend_from_slice(&[0x40, 0, 0, 20, 0, 1, 2, 2, 0x84]);
    // Compressed timestamp header for local message 0, with offset 5.
    data.extend_from_slice(&[0x85, 0xC4, 0x09]);
    let crc = compute_crc(0, &data);
    data.extend_from_slice(&crc.to_le_bytes());

    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());
    let err = messages.next().unwrap().unwrap_err();
    assert!(matches!(err, Error::MissingReference(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::ProtocolState);
}

#[test]
fn decode_corrupt_header_checksum() {
    let mut data = std::fs::read(PATH).unwrap();
    let found = u16::from_le_bytes([data[12], data[13]]);
    data[12] ^= 0xFF;

    let mut validator = Validator::new(PATH);
    let warnings = cassette::avec::decode_slice(&data, &mut validator).unwrap();
    validator.finish();

    let [header, unresolved_field, checksum] = warnings.as_slice() else {
        panic!("unexpected warnings: {warnings:?}");
    };
    assert_eq!(
        *header,
        Warning::HeaderChecksum {
            found: found ^ 0xFF,
            calculated: found,
        }
    );
    assert_eq!(*unresolved_field, unresolved());
    // The trailer covers the header too.
    assert!(matches!(checksum, Warning::Checksum { .. }));
}

#[test]
fn decode_arrays_with_invalid_elements() {
    #[derive(Default)]
    struct Elements(Vec<(u8, u64)>);

    impl FromRecords for Elements {
        fn add_record(&mut self, _: u16) -> Option<&mut dyn FromRecord> {
            Some(self)
        }
    }

    impl FromRecord for Elements {
        fn add_u8(&mut self, field: u8, value: u8) {
            self.0.push((field, value as u64));
        }
        fn add_u16(&mut self, field: u8, value: u16) {
            self.0.push((field, value as u64));
        }
    }

    let a = Architecture::Little;
    let application_id = vec![0x10, 0xFF, 0x20, 0xFF];
    let data = encode(
        &[
            Message::new(207)
                .with_field(Field::new(1, BaseType::Byte, application_id.clone()))
                .with_field(Field::from_value(3, BaseType::Uint8, a, 0.0)),
            Message::new(0xFF01)
                .with_field(Field::from_values(0, BaseType::Uint16, a, &[1.0, 65535.0, 3.0]))
                .with_field(Field::invalid(1, BaseType::Uint16, a, 2)),
        ],
        EncodeOptions::default(),
    )
    .unwrap();

    let mut elements = Elements::default();
    cassette::avec::decode_slice(&data, &mut elements).unwrap();
    assert_eq!(
        elements.0,
        vec![
            (1, 0x10),
            (1, 0xFF),
            (1, 0x20),
            (1, 0xFF),
            (3, 0),
            (0, 1),
            (0, 0xFFFF),
            (0, 3),
        ]
    );

    let options = DecodeOptions::default().with_strategy(DecodingStrategy::KeepSentinel);
    let mut elements = Elements::default();
    cassette::avec::slice::decode_with(&data, &mut elements, options).unwrap();
    assert_eq!(elements.0[8..], [(1, 0xFFFF), (1, 0xFFFF)]);

    let mut messages = cassette::avec::slice::messages(&data, DecodeOptions::default());
    messages.next().unwrap().unwrap();
    let developer = messages.developer().developer(0).unwrap();
    assert_eq!(developer.application_id, Some(application_id));
}

fn data_size(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[4], data[5], data[6], data[7]])
}

/// Overwrite the data size of a 14-byte header, clearing its check value.
fn set_data_size(data: &mut [u8], size: u32) {
    data[4..8].copy_from_slice(&size.to_le_bytes());
    data[12..14].copy_from_slice(&[0, 0]);
}

/// Checks published values against rows of a CSV file.
struct Validator(Vec<String>, Vec<Vec<String>>, Option<u8>);

impl Validator {
    fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().with_extension("csv");

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .unwrap();

        let expected: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect();

        Self(vec![], expected, None)
    }

    fn validate_field(&mut self, field: u8) {
        if Some(field) != self.2 {
            self.2 = Some(field);
            assert_eq!(self.0.remove(0), field.to_string())
        }
    }

    fn finish(&self) {
        assert!(self.0.is_empty(), "unpublished values: {:?}", self.0);
        assert!(self.1.is_empty(), "unpublished records: {:?}", self.1);
    }
}

impl FromRecords for Validator {
    fn add_record(&mut self, id: u16) -> Option<&mut dyn FromRecord> {
        assert!(self.0.is_empty(), "unpublished values: {:?}", self.0);

        self.0 = self.1.remove(0);
        self.2 = None;
        assert_eq!(self.0.remove(0), id.to_string());
        Some(self)
    }
}

impl FromRecord for Validator {
    fn add_timestamp(&mut self, timestamp: u32) {
        assert_eq!(self.0.remove(0), "time");
        assert_eq!(self.0.remove(0), timestamp.to_string());
    }
    fn add_u8(&mut self, field: u8, value: u8) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_u16(&mut self, field: u8, value: u16) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_u32(&mut self, field: u8, value: u32) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_u64(&mut self, field: u8, value: u64) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_i8(&mut self, field: u8, value: i8) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_i16(&mut self, field: u8, value: i16) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_i32(&mut self, field: u8, value: i32) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_i64(&mut self, field: u8, value: i64) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_f32(&mut self, field: u8, value: f32) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_f64(&mut self, field: u8, value: f64) {
        self.validate_field(field);
        assert_eq!(self.0.remove(0), value.to_string());
    }
    fn add_developer_field(&mut self, field: &DeveloperValue<'_>) {
        let value = field.as_f64().map_or("-".to_string(), |x| x.to_string());

        assert_eq!(self.0.remove(0), "dev");
        assert_eq!(self.0.remove(0), field.developer_index.to_string());
        assert_eq!(self.0.remove(0), field.number.to_string());
        assert_eq!(self.0.remove(0), value);
    }
}
