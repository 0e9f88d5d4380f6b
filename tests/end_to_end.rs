use std::collections::VecDeque;

use fitsbuf::{
    ColumnSpec, DescriptorFormat, ElementSize, Error, FileConfig, FileDevice, FitsFile,
    HduDirectory, HduLayout, InsertAt, MemoryDevice, Mode, BLOCK_SIZE, DEFAULT_SLOTS,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;

const B: u64 = BLOCK_SIZE as u64;

fn zeros(blocks: usize) -> MemoryDevice {
    MemoryDevice::from_bytes(vec![0; blocks * BLOCK_SIZE])
}

#[test]
fn clean_victim_is_evicted_without_a_write() {
    let mut file: FitsFile<MemoryDevice> =
        FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
    let header = [b'H'; 80];
    file.position(0, false).unwrap();
    file.write_bytes(&header).unwrap();
    assert!(file.is_dirty(0));
    assert!(file.device().is_empty());
    assert_eq!(file.stats().device_writes, 0);

    file.flush(false).unwrap();
    assert_eq!(file.stats().device_writes, 1);
    assert_eq!(file.device().len(), BLOCK_SIZE);
    assert!(file.is_resident(0));
    assert!(!file.is_dirty(0));

    let mut byte = [0u8];
    for block in 1..DEFAULT_SLOTS as u64 {
        file.position(block * B, false).unwrap();
        file.read_bytes(&mut byte).unwrap();
    }
    assert!(file.is_resident(0));
    assert!(!file.is_dirty(0));

    file.position((DEFAULT_SLOTS as u64 + 1) * B, false).unwrap();
    file.write_bytes(b"X").unwrap();
    assert!(!file.is_resident(0));
    assert_eq!(file.stats().device_writes, 1);

    let mut read = [0u8; 80];
    file.position(0, true).unwrap();
    file.read_bytes(&mut read).unwrap();
    assert_eq!(read, header);
}

#[test]
fn residency_follows_least_recently_used_order() {
    const SLOTS: usize = 5;
    let blocks = 12u64;
    let mut file: FitsFile<MemoryDevice, SLOTS> =
        FitsFile::open(zeros(blocks as usize), FileConfig::default()).unwrap();
    let mut model: VecDeque<u64> = VecDeque::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut byte = [0u8];

    for _ in 0..500 {
        let block = rng.gen_range(0..blocks);
        file.position(block * B + rng.gen_range(0..B), true).unwrap();
        file.read_bytes(&mut byte).unwrap();

        model.retain(|&resident| resident != block);
        model.push_back(block);
        if model.len() > SLOTS {
            model.pop_front();
        }
        for candidate in 0..blocks {
            assert_eq!(file.is_resident(candidate), model.contains(&candidate));
        }
    }
}

#[test]
fn file_device_round_trip_across_paths() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.fits");
    let data: Vec<u8> = (0..6 * BLOCK_SIZE).map(|i| (i % 253) as u8).collect();

    let device = FileDevice::create(&path).unwrap();
    let mut file: FitsFile<FileDevice, 4> =
        FitsFile::create(device, FileConfig::default()).unwrap();
    file.position(0, false).unwrap();
    file.write_bytes(&data[..100]).unwrap();
    file.write_bytes(&data[100..5 * BLOCK_SIZE]).unwrap();
    file.write_bytes(&data[5 * BLOCK_SIZE..]).unwrap();
    file.close().unwrap();

    let device = FileDevice::open(&path, Mode::ReadOnly).unwrap();
    let mut file: FitsFile<FileDevice, 4> =
        FitsFile::open(device, FileConfig::read_only()).unwrap();
    assert_eq!(file.file_size(), 6 * B);
    let mut read = vec![0u8; data.len()];
    file.position(0, true).unwrap();
    file.read_bytes(&mut read).unwrap();
    assert_eq!(read, data);

    let mut past = [0u8; 4];
    file.position(6 * B, false).unwrap();
    assert!(file.read_bytes(&mut past).is_ok());
    assert!(matches!(file.flush(false), Err(Error::ReadOnly)));
}

#[test]
fn failed_operation_blocks_the_handle_until_cleared() {
    let mut file: FitsFile<MemoryDevice, 4> =
        FitsFile::open(zeros(1), FileConfig::default()).unwrap();
    assert!(matches!(
        file.position(5 * B, true),
        Err(Error::EndOfFile { block: 5 })
    ));
    assert!(matches!(file.position(0, true), Err(Error::Failed(_))));
    file.clear_status();
    file.position(0, true).unwrap();
}

#[test]
fn table_with_heap_survives_restructuring() {
    let mut file: FitsFile<MemoryDevice, 8> =
        FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
    file.set_directory(HduDirectory::new(vec![0, B, 3 * B, 4 * B]).unwrap())
        .unwrap();
    file.position(3 * B, false).unwrap();
    file.write_bytes(&[b'Z'; BLOCK_SIZE]).unwrap();

    let columns = vec![
        ColumnSpec::fixed(0, 8),
        ColumnSpec::var_array(8, DescriptorFormat::P, ElementSize::Bytes(2)),
    ];
    file.select_hdu(1, HduLayout::binary_table(B, 2 * B, 16, 4, columns))
        .unwrap();
    for row in 0..4u64 {
        file.write_table_bytes(row, 0, &row.to_be_bytes()).unwrap();
        let payload = vec![row as u8 + 1; 2 * (row as usize + 1)];
        file.append_heap_payload(1, row, &payload, row as i64 + 1).unwrap();
    }

    file.insert_blocks(1, InsertAt::HeaderEnd).unwrap();
    file.insert_rows(2, 1).unwrap();
    file.append_heap_payload(1, 0, &[9, 9], 1).unwrap();
    file.compact_heap().unwrap();

    assert_eq!(file.layout().rows, 5);
    assert_eq!(file.read_heap_payload(1, 0).unwrap(), vec![9, 9]);
    assert_eq!(file.read_heap_payload(1, 3).unwrap(), vec![3; 6]);
    assert_eq!(file.read_heap_payload(1, 2).unwrap(), Vec::<u8>::new());
    let mut key = [0u8; 8];
    file.read_table_bytes(4, 0, &mut key).unwrap();
    assert_eq!(key, 3u64.to_be_bytes());

    let next = file.hdu_directory().start(2).unwrap();
    assert_eq!(next, 4 * B);
    let mut marker = [0u8; 2];
    file.position(next, true).unwrap();
    file.read_bytes(&mut marker).unwrap();
    assert_eq!(&marker, b"ZZ");
}
