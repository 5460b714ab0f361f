//! Property tests: no block is handed out while device work may still touch it

mod common;

use std::collections::{HashMap, HashSet};

use common::SimFixture;
use pinforge::PinnedPtr;
use proptest::prelude::*;

const STREAMS: usize = 2;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
    Record(usize, usize),
    Complete(usize),
    Poll,
    EmptyCache,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..=4).prop_map(|k| Op::Alloc(k * 64)),
        3 => any::<usize>().prop_map(Op::Free),
        3 => (any::<usize>(), 0..STREAMS).prop_map(|(i, s)| Op::Record(i, s)),
        2 => (0..STREAMS).prop_map(Op::Complete),
        1 => Just(Op::Poll),
        1 => Just(Op::EmptyCache),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_allocate_never_returns_busy_memory(ops in prop::collection::vec(op_strategy(), 1..150)) {
        let fx = SimFixture::manual();
        let streams: Vec<_> = (0..STREAMS).map(|_| fx.stream()).collect();

        // Live blocks with the streams that used them since allocation
        let mut live: Vec<(PinnedPtr, usize, HashSet<usize>)> = Vec::new();
        // Freed blocks whose recorded work has not finished
        let mut busy: HashMap<usize, HashSet<usize>> = HashMap::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let ptr = fx.alloc.allocate(size).unwrap();
                    prop_assert!(!busy.contains_key(&ptr.addr()), "reused draining block {:?}", ptr);
                    prop_assert!(live.iter().all(|(p, _, _)| *p != ptr), "block handed out twice");
                    let info = fx.alloc.block_info(ptr).unwrap().unwrap();
                    prop_assert!(info.size >= size);
                    prop_assert_eq!(info.pending_events, 0);
                    live.push((ptr, size, HashSet::new()));
                }
                Op::Free(i) if !live.is_empty() => {
                    let (ptr, _, used_by) = live.swap_remove(i % live.len());
                    fx.alloc.free(ptr).unwrap();
                    if !used_by.is_empty() {
                        busy.insert(ptr.addr(), used_by);
                    }
                }
                Op::Record(i, s) if !live.is_empty() => {
                    let idx = i % live.len();
                    fx.alloc.record_event(live[idx].0, &streams[s]).unwrap();
                    live[idx].2.insert(s);
                }
                Op::Complete(s) => {
                    fx.finish(&streams[s]);
                    for (_, _, used_by) in live.iter_mut() {
                        used_by.remove(&s);
                    }
                    busy.retain(|_, used_by| {
                        used_by.remove(&s);
                        !used_by.is_empty()
                    });
                }
                Op::Poll => {
                    fx.alloc.process_events().unwrap();
                }
                Op::EmptyCache => {
                    let report = fx.alloc.empty_cache().unwrap();
                    prop_assert!(report.is_clean());
                }
                _ => {}
            }

            let stats = fx.alloc.stats().unwrap();
            prop_assert_eq!(stats.live_blocks, live.len());
            prop_assert!(stats.live_bytes >= live.iter().map(|(_, s, _)| *s).sum::<usize>());
            prop_assert!(stats.draining_blocks >= busy.len());
        }

        for (ptr, _, _) in live.drain(..) {
            fx.alloc.free(ptr).unwrap();
        }
        fx.runtime.complete_all();
        fx.alloc.process_events().unwrap();
        fx.assert_no_leak();
    }
}
