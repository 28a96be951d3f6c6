#![allow(dead_code, unused)]
#![cfg(all(feature = "derive", feature = "std"))]

use cassette::avec::{FromRecord, FromRecords};
use tinyvec::ArrayVec;
use zerocopy::TryFromBytes;

const PATH: &str = "fixtures/synthetic-ride.fit";

#[test]
fn decode_slice_synthetic_ride() {
    let data = std::fs::read(PATH).unwrap();
    let mut records = ActivityRecordSet::default();
    cassette::avec::decode_slice(&data, &mut records).unwrap();

    let file_id = records.file_id.unwrap();
    assert_eq!(file_id.type_, Some(FileType::Activity));
    assert_eq!(file_id.manufacturer, Some(1));
    assert_eq!(file_id.product, Some(3121));
    assert_eq!(file_id.serial_number, Some(123456789));
    assert_eq!(file_id.time_created, Some(1_000_000_000));

    assert_eq!(records.records.len(), 6);

    let timestamps: Vec<_> = records
        .records
        .iter()
        .map(|r| r.timestamp.or(r.time))
        .collect();
    assert_eq!(
        timestamps,
        vec![
            Some(1_000_000_000),
            Some(1_000_000_002),
            Some(1_000_000_005),
            Some(1_000_000_035),
            Some(1_000_000_040),
            Some(1_000_000_041),
        ]
    );

    let [first, second, third, ..] = records.records.as_slice() else {
        panic!("expected records");
    };

    assert_eq!(first.position_lat, Some(-1000));
    assert_eq!(first.altitude, Some(2500));
    assert_eq!(first.temperature, Some(-5));
    assert_eq!(first.power, Some(250.0));

    // Invalid values are not published.
    assert_eq!(second.position_lat, None);
    assert_eq!(second.power, None);

    assert_eq!(third.time, Some(1_000_000_005));
    assert_eq!(third.timestamp, None);

    let big_endian = &records.records[4];
    assert_eq!(big_endian.distance, Some(12345));
    assert_eq!(big_endian.speed, Some(4000));

    let custom = records.custom.unwrap();
    assert_eq!(custom.ratio, Some(2.5));
    assert_eq!(custom.offset, Some(-0.25));
    assert_eq!(custom.samples.as_slice(), &[1, 0xFFFF, 3]);
    assert_eq!(custom.total, Some(1 << 40));
    assert_eq!(custom.zero, None);
}

#[test]
fn decode_slice_developer_declarations() {
    let data = std::fs::read(PATH).unwrap();
    let mut records = DeveloperRecordSet::default();
    cassette::avec::decode_slice(&data, &mut records).unwrap();

    let [description] = records.descriptions.as_slice() else {
        panic!("expected a single field description");
    };

    assert_eq!(description.name(), Some("power"));
    assert_eq!(description.base_type, Some(0x84));
    assert_eq!(description.scale, Some(2));

    let developer = records.developer.unwrap();
    assert_eq!(developer.application_id.len(), 16);
    assert_eq!(developer.developer_index, Some(0));
}

#[test]
fn decode_slice_shared_receiver() {
    let data = std::fs::read(PATH).unwrap();
    let mut records = DeclarationRecordSet::default();
    cassette::avec::decode_slice(&data, &mut records).unwrap();

    // One developer data ID and one field description.
    assert_eq!(records.declarations.len(), 2);
    assert_eq!(records.file_id.unwrap().serial_number, Some(123456789));
}

#[derive(Debug, Default, FromRecords)]
struct ActivityRecordSet {
    #[record(0)]
    file_id: Option<FileId>,
    #[record(20)]
    records: Vec<Record>,
    #[record(65280)]
    custom: Option<Custom>,
}

#[derive(Debug, Default, FromRecord)]
struct FileId {
    #[field(3)]
    serial_number: Option<u32>,
    #[field(4)]
    time_created: Option<u32>,
    #[field(1)]
    manufacturer: Option<u16>,
    #[field(2)]
    product: Option<u16>,
    #[field(0, |p, x: u8| {
        if let Ok(x) = zerocopy::try_transmute!(x) {
            *p = Some(x);
        }
    })]
    type_: Option<FileType>,
}

#[repr(u8)]
#[derive(Debug, Default, PartialEq, TryFromBytes)]
enum FileType {
    #[default]
    Device = 1,
    Settings = 2,
    Activity = 4,
    Course = 6,
}

#[derive(Debug, Default, FromRecord)]
struct Record {
    #[field(time)]
    time: Option<u32>,
    #[field(253)]
    timestamp: Option<u32>,
    #[field(0)]
    position_lat: Option<i32>,
    #[field(2)]
    altitude: Option<u16>,
    #[field(5)]
    distance: Option<u32>,
    #[field(6)]
    speed: Option<u16>,
    #[field(13)]
    temperature: Option<i8>,
    #[developer(0, 0)]
    power: Option<f64>,
}

#[derive(Debug, Default, FromRecord)]
struct Custom {
    #[field(0)]
    ratio: Option<f32>,
    #[field(1)]
    offset: Option<f64>,
    #[field(2, |v, x: u16| v.push(x))]
    samples: ArrayVec<[u16; 4]>,
    #[field(3)]
    total: Option<u64>,
    #[field(5)]
    zero: Option<u8>,
}

#[derive(Debug, Default, FromRecords)]
struct DeveloperRecordSet {
    #[record(207)]
    developer: Option<DeveloperDataId>,
    #[record(206)]
    descriptions: Vec<FieldDescription>,
}

#[derive(Debug, Default, FromRecords)]
struct DeclarationRecordSet {
    #[record(206, 207)]
    declarations: Vec<Declaration>,
    #[record(0)]
    file_id: Option<FileId>,
}

#[derive(Debug, Default, FromRecord)]
struct Declaration {}

#[derive(Debug, Default, FromRecord)]
struct DeveloperDataId {
    #[field(1, |v, b: u8| v.push(b))]
    application_id: Vec<u8>,
    #[field(3)]
    developer_index: Option<u8>,
}

#[derive(Debug, Default, FromRecord)]
struct FieldDescription {
    #[field(0)]
    developer_index: Option<u8>,
    #[field(1)]
    number: Option<u8>,
    #[field(2)]
    base_type: Option<u8>,
    #[field(3, |v, c: u8| v.push(c))]
    name: Vec<u8>,
    #[field(6)]
    scale: Option<u8>,
}

impl FieldDescription {
    fn name(&self) -> Option<&str> {
        if !self.name.is_empty() {
            std::str::from_utf8(&self.name).ok()
        } else {
            None
        }
    }
}
