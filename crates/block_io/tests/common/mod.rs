use std::{
    collections::HashMap,
    convert::Infallible,
    sync::Mutex,
    thread,
    time::Duration,
};

use block_io::{
    BlockData, BlockDevice, BlockKey, BlockNo, Bucket, BufGuard, BufPin, BufferCache, DeviceNo,
};
use mutex_api::StdSleepLock;

pub const BLOCK_SIZE: usize = 64;

pub const DEV: DeviceNo = DeviceNo::new(1);

pub type SpinCache<'a> =
    BufferCache<&'a MockDevice, spin::Mutex<Bucket>, StdSleepLock<BlockData<BLOCK_SIZE>>>;

pub type StdCache<'a> =
    BufferCache<&'a MockDevice, Mutex<Bucket>, StdSleepLock<BlockData<BLOCK_SIZE>>>;

pub type StdBuf<'a, 'd> = BufGuard<
    'a,
    &'d MockDevice,
    Mutex<Bucket>,
    StdSleepLock<BlockData<BLOCK_SIZE>>,
    BLOCK_SIZE,
    true,
>;

pub type StdPin<'a, 'd> =
    BufPin<'a, &'d MockDevice, Mutex<Bucket>, StdSleepLock<BlockData<BLOCK_SIZE>>>;

#[derive(Default)]
struct Block {
    data: Option<[u8; BLOCK_SIZE]>,
    reads: usize,
    writes: usize,
}

/// In-memory device. Unwritten blocks read as [`initial_contents`].
#[derive(Default)]
pub struct MockDevice {
    pub blocks: Mutex<HashMap<BlockKey, Block>>,
    /// Delay of every read and write.
    pub latency: Option<Duration>,
}

impl MockDevice {
    pub fn reads(&self, block_no: u32) -> usize {
        self.with(block_no, |block| block.reads)
    }

    pub fn total_reads(&self) -> usize {
        self.blocks.lock().unwrap().values().map(|b| b.reads).sum()
    }

    pub fn contents(&self, block_no: u32) -> [u8; BLOCK_SIZE] {
        self.with(block_no, |block| {
            block.data.unwrap_or_else(|| initial_contents(block_no))
        })
    }

    fn with<T>(&self, block_no: u32, f: impl FnOnce(&mut Block) -> T) -> T {
        let key = BlockKey::new(DEV, BlockNo::new(block_no));
        f(self.blocks.lock().unwrap().entry(key).or_default())
    }

    fn wait(&self) {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
    }
}

/// Contents of a never written block: its number, truncated, repeated.
#[expect(clippy::cast_possible_truncation)]
pub fn initial_contents(block_no: u32) -> [u8; BLOCK_SIZE] {
    [block_no as u8; BLOCK_SIZE]
}

impl BlockDevice<BLOCK_SIZE> for MockDevice {
    type Error = Infallible;

    fn read(&self, key: BlockKey, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.wait();
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.entry(key).or_default();
        block.reads += 1;
        *data = block
            .data
            .unwrap_or_else(|| initial_contents(key.block_no.value()));
        Ok(())
    }

    fn write(&self, key: BlockKey, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.wait();
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.entry(key).or_default();
        block.writes += 1;
        block.data = Some(*data);
        Ok(())
    }
}

pub fn block(n: u32) -> BlockNo {
    BlockNo::new(n)
}
