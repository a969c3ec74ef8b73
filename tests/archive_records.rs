//! Записи сущностей: эволюция версий, условные поля и обрыв файла.

use std::fs;

use posdata::{
    engine::archive::Entry, Money, Persist, PosResult, RecordReader, RecordWriter, StatusCode,
    TimeStamp,
};
use tempfile::tempdir;

/// Сотрудник в том виде, в каком его знал код версии 1.
#[derive(Debug, Default, PartialEq)]
struct EmployeeV1 {
    id: u32,
    name: String,
}

impl Persist for EmployeeV1 {
    fn read_from(
        &mut self,
        r: &mut RecordReader,
        _version: i32,
    ) -> PosResult<()> {
        self.id = r.read()?;
        self.name = r.read()?;
        Ok(())
    }

    fn write_to(
        &self,
        w: &mut RecordWriter,
        _version: i32,
    ) -> PosResult<()> {
        w.write(&self.id)?;
        w.write(&self.name)
    }
}

/// Версия 2 дописала в конец ставку и дату найма.
#[derive(Debug, Default, PartialEq)]
struct EmployeeV2 {
    id: u32,
    name: String,
    wage: Money,
    hired: TimeStamp,
}

impl Persist for EmployeeV2 {
    fn read_from(
        &mut self,
        r: &mut RecordReader,
        version: i32,
    ) -> PosResult<()> {
        self.id = r.read()?;
        self.name = r.read()?;
        if version >= 2 {
            self.wage = r.read()?;
            self.hired = r.read()?;
        }
        Ok(())
    }

    fn write_to(
        &self,
        w: &mut RecordWriter,
        version: i32,
    ) -> PosResult<()> {
        w.write(&self.id)?;
        w.write(&self.name)?;
        if version >= 2 {
            w.write(&self.wage)?;
            w.write(&self.hired)?;
        }
        Ok(())
    }
}

fn staff_v2() -> Vec<EmployeeV2> {
    vec![
        EmployeeV2 {
            id: 1,
            name: "Alice".into(),
            wage: Money::from_cents(1550),
            hired: TimeStamp::from_epoch(1_600_000_000),
        },
        EmployeeV2 {
            id: 2,
            name: "Bob".into(),
            wage: Money::from_cents(1200),
            hired: TimeStamp::unset(),
        },
    ]
}

/// Тест проверяет, что старый код читает архив новой версии, пропуская
/// дописанные поля, и не теряет синхронизацию между записями.
#[test]
fn test_old_reader_skips_appended_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("staff.dat");

    let mut w = RecordWriter::create(&path, 2, false).unwrap();
    w.write_records(&staff_v2()).unwrap();
    w.write(&99u16).unwrap();
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    let first: EmployeeV1 = r.read_record().unwrap();
    let second: EmployeeV1 = r.read_record().unwrap();
    assert_eq!(
        (first.id, first.name.as_str(), second.id, second.name.as_str()),
        (1, "Alice", 2, "Bob")
    );
    assert_eq!(r.records_read(), 2);
    assert_eq!(r.read_u16().unwrap(), 99);
}

/// Тест проверяет, что новый код читает архив версии 1 и оставляет новые
/// поля по умолчанию.
#[test]
fn test_new_reader_on_old_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("staff_v1.dat");

    let mut w = RecordWriter::create(&path, 1, true).unwrap();
    w.write_records(&staff_v2()).unwrap();
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    assert_eq!(r.version(), 1);
    let staff: Vec<EmployeeV2> = r.read_records().unwrap();
    assert_eq!(staff.len(), 2);
    assert_eq!(staff[0].name, "Alice");
    assert_eq!(staff[0].wage, Money::default());
    assert!(!staff[1].hired.is_set());
    assert!(r.end_of_stream());
}

#[test]
fn test_same_version_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("staff_v2.dat");

    let mut w = RecordWriter::create(&path, 2, true).unwrap();
    w.write_records(&staff_v2()).unwrap();
    assert_eq!(w.records_written(), 2);
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    assert_eq!(r.read_records::<EmployeeV2>().unwrap(), staff_v2());
}

/// Тест проверяет, что вложенная запись пропускается целиком, если
/// читатель о ней не знает.
#[test]
fn test_nested_record_skipped_by_finish() {
    struct Table {
        seats: u8,
        server: EmployeeV1,
    }

    impl Persist for Table {
        fn read_from(
            &mut self,
            _r: &mut RecordReader,
            _version: i32,
        ) -> PosResult<()> {
            unreachable!("only written in this test")
        }

        fn write_to(
            &self,
            w: &mut RecordWriter,
            _version: i32,
        ) -> PosResult<()> {
            w.write(&self.seats)?;
            w.write_record(&self.server)
        }
    }

    #[derive(Default)]
    struct SeatsOnly {
        seats: u8,
    }

    impl Persist for SeatsOnly {
        fn read_from(
            &mut self,
            r: &mut RecordReader,
            _version: i32,
        ) -> PosResult<()> {
            self.seats = r.read()?;
            Ok(())
        }

        fn write_to(
            &self,
            w: &mut RecordWriter,
            _version: i32,
        ) -> PosResult<()> {
            w.write(&self.seats)
        }
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("tables.dat");
    let mut w = RecordWriter::create(&path, 1, false).unwrap();
    let table = Table {
        seats: 4,
        server: EmployeeV1 {
            id: 7,
            name: "Carol".into(),
        },
    };
    w.write_record(&table).unwrap();
    w.write_record(&SeatsOnly { seats: 2 }).unwrap();
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    let tables: Vec<SeatsOnly> = r.read_records().unwrap();
    assert_eq!(tables.iter().map(|t| t.seats).collect::<Vec<_>>(), vec![4, 2]);
}

/// Тест проверяет условные поля: отсутствующий адресат ничего не пишет и
/// ничего не читает, а `skip_field` пропускает присутствующее поле.
#[test]
fn test_conditional_fields_stay_in_sync() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cond.dat");
    let tip: Option<&i32> = None;

    let mut w = RecordWriter::create(&path, 1, false).unwrap();
    assert!(w.write_opt(Some(&10u8)).unwrap());
    assert!(!w.write_opt(tip).unwrap());
    w.write(&"skipped".to_string()).unwrap();
    w.write(&20u8).unwrap();
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    let mut first = 0u8;
    assert!(r.read_opt(Some(&mut first)).unwrap());
    assert_eq!(first, 10);
    assert!(!r.read_opt::<i32>(None).unwrap());
    r.skip_field().unwrap();
    assert_eq!(r.read_u8().unwrap(), 20);
    assert_eq!(r.fields_read(), 2);
}

/// Тест проверяет, что обрыв файла посреди поля даёт `UnexpectedEof` и
/// отмечает конец потока.
#[test]
fn test_truncated_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cut.dat");
    let mut w = RecordWriter::create(&path, 1, false).unwrap();
    w.write(&7u32).unwrap();
    w.write(&i64::MAX).unwrap();
    w.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    assert_eq!(r.read_u32().unwrap(), 7);
    assert!(!r.end_of_stream());
    let err = r.read_i64().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UnexpectedEof);
    assert!(r.end_of_stream());
}

/// Тест проверяет, что запись без маркера конца не читается как целая.
#[test]
fn test_record_without_end_marker() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("open_record.dat");
    let mut w = RecordWriter::create(&path, 1, false).unwrap();
    w.write_record(&EmployeeV1 {
        id: 3,
        name: "Dan".into(),
    })
    .unwrap();
    w.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    let err = r.read_record::<EmployeeV1>().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UnexpectedEof);
}

#[test]
fn test_field_where_record_expected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flat.dat");
    let mut w = RecordWriter::create(&path, 1, false).unwrap();
    w.write(&1u32).unwrap();
    w.close().unwrap();

    let mut r = RecordReader::open(&path).unwrap();
    let err = r.read_record::<EmployeeV1>().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::TypeError);

    let mut r = RecordReader::open(&path).unwrap();
    assert!(matches!(r.next_entry().unwrap(), Some(Entry::Value(_))));
}
