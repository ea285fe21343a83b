use std::collections::HashMap;

use block_io::{BlockKey, CacheConfig, EvictionScan};
use proptest::prelude::*;

use self::common::{DEV, MockDevice, SpinCache, StdBuf, StdCache, StdPin, block};

mod common;

const NUM_BUFFERS: usize = 4;
const NUM_BUCKETS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    Read(u32),
    Write(usize),
    Release(usize),
    Pin(usize),
    Unpin(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0_u32..10).prop_map(Op::Read),
        1 => any::<usize>().prop_map(Op::Write),
        2 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Pin),
        1 => any::<usize>().prop_map(Op::Unpin),
    ]
}

fn check_bookkeeping(cache: &StdCache<'_>, refs: &HashMap<BlockKey, (usize, usize)>) {
    let snapshot = cache.snapshot();

    let mut seen = HashMap::new();
    for info in &snapshot {
        assert!(seen.insert(info.key, info.slot).is_none(), "{} bound twice", info.key);
        assert_eq!(info.bucket, info.key.bucket_index(NUM_BUCKETS));
        let expected = refs.get(&info.key).map_or(0, |&(_, count)| count);
        assert_eq!(info.ref_count, expected, "reference count of {}", info.key);
    }

    let mut slots = snapshot.iter().map(|info| info.slot).collect::<Vec<_>>();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), snapshot.len());

    for (key, &(slot, count)) in refs {
        if count > 0 {
            assert_eq!(seen.get(key), Some(&slot), "referenced {key} not resident");
        }
    }
}

/// Applies `ops` to a fresh cache, checking the bookkeeping after each step.
fn run_sequence(eviction: EvictionScan, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let device = MockDevice::default();
    let config = CacheConfig::default()
        .with_num_buffers(NUM_BUFFERS)
        .with_num_buckets(NUM_BUCKETS)
        .with_eviction(eviction);
    let cache = StdCache::new(&device, config).unwrap();

    let mut held: Vec<StdBuf<'_, '_>> = Vec::new();
    let mut pins: Vec<StdPin<'_, '_>> = Vec::new();
    // holders and pins per block, with the slot they refer to
    let mut refs = HashMap::<BlockKey, (usize, usize)>::new();

    for op in ops {
        match op {
            Op::Read(n) => {
                let key = BlockKey::new(DEV, block(n));
                // locking a held block again would block this thread
                if held.iter().any(|buf| buf.key() == key) {
                    continue;
                }
                if let Some(buf) = cache.try_get(DEV, block(n)) {
                    let Ok(buf) = buf.read().map_err(|(_buf, e)| e);
                    prop_assert_eq!(buf.key(), key);
                    let entry = refs.entry(key).or_insert((buf.slot(), 0));
                    if entry.1 > 0 {
                        prop_assert_eq!(entry.0, buf.slot());
                    }
                    *entry = (buf.slot(), entry.1 + 1);
                    held.push(buf);
                } else {
                    check_exhausted(&cache, eviction, key)?;
                }
            }
            Op::Write(i) if !held.is_empty() => {
                let index = i % held.len();
                let buf = &mut held[index];
                buf.bytes_mut()[0] ^= 0xff;
                let Ok(()) = buf.write();
                let n = buf.block_no().value();
                prop_assert_eq!(device.contents(n)[0], buf.bytes()[0]);
            }
            Op::Release(i) if !held.is_empty() => {
                let buf = held.swap_remove(i % held.len());
                if let Some(entry) = refs.get_mut(&buf.key()) {
                    entry.1 -= 1;
                }
                buf.release();
            }
            Op::Pin(i) if !held.is_empty() => {
                let buf = &held[i % held.len()];
                pins.push(buf.pin());
                if let Some(entry) = refs.get_mut(&buf.key()) {
                    entry.1 += 1;
                }
            }
            Op::Unpin(i) if !pins.is_empty() => {
                let pin = pins.swap_remove(i % pins.len());
                if let Some(entry) = refs.get_mut(&pin.key()) {
                    entry.1 -= 1;
                }
                pin.unpin();
            }
            Op::Write(_) | Op::Release(_) | Op::Pin(_) | Op::Unpin(_) => {}
        }
        check_bookkeeping(&cache, &refs);
    }

    drop(held);
    drop(pins);
    prop_assert!(cache.snapshot().iter().all(|info| info.ref_count == 0));
    Ok(())
}

/// Checks that a failed lookup of `key` had no free buffer to take.
fn check_exhausted(
    cache: &StdCache<'_>,
    eviction: EvictionScan,
    key: BlockKey,
) -> Result<(), TestCaseError> {
    let snapshot = cache.snapshot();
    match eviction {
        EvictionScan::LockOrdered => {
            prop_assert_eq!(snapshot.len(), NUM_BUFFERS);
            prop_assert!(snapshot.iter().all(|info| info.ref_count > 0));
        }
        EvictionScan::HoldHome => {
            // free buffers may only be left in the home bucket
            let home = key.bucket_index(NUM_BUCKETS);
            prop_assert!(
                snapshot
                    .iter()
                    .all(|info| info.bucket == home || info.ref_count > 0)
            );
            // unbound buffers all start out in bucket 0
            if home != 0 {
                prop_assert_eq!(snapshot.len(), NUM_BUFFERS);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lock_ordered_sequences_keep_bookkeeping_consistent(
        ops in proptest::collection::vec(op(), 1..120),
    ) {
        run_sequence(EvictionScan::LockOrdered, ops)?;
    }

    #[test]
    fn hold_home_sequences_keep_bookkeeping_consistent(
        ops in proptest::collection::vec(op(), 1..120),
    ) {
        run_sequence(EvictionScan::HoldHome, ops)?;
    }
}

#[test]
fn test_cached_contents_survive_until_recycled() {
    let device = MockDevice::default();
    let config = CacheConfig::default()
        .with_num_buffers(NUM_BUFFERS)
        .with_eviction(EvictionScan::LockOrdered);
    let cache = SpinCache::new(&device, config).unwrap();

    for n in 0..4 {
        let Ok(mut buf) = cache.read(DEV, block(n));
        buf.bytes_mut()[0] = 0xaa;
    }
    // dirty but unwritten contents are served from the cache
    for n in 0..4 {
        let Ok(buf) = cache.read(DEV, block(n));
        assert_eq!(buf.bytes()[0], 0xaa);
    }
    assert_eq!(device.total_reads(), 4);

    // recycling drops the unwritten change
    for n in 4..8 {
        let Ok(_buf) = cache.read(DEV, block(n));
    }
    let Ok(buf) = cache.read(DEV, block(0));
    assert_eq!(buf.bytes()[0], 0);
    assert_eq!(device.reads(0), 2);
}
