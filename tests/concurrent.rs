use std::{ptr::NonNull, thread};

use osmem::{CriticalSection, Heap, HeapConfig, Interrupts, SharedCriticalSection, SpinLock, StaticArena};

const CONFIG: HeapConfig = HeapConfig::new(16 * 1024).with_alignment(8);

type Arena = StaticArena<{ CONFIG.arena_bytes::<u16>() }>;

static SPIN_HEAP: Heap<Arena, u16, SpinLock> = Heap::new(StaticArena::new(), CONFIG, SpinLock::new());

static IRQ_HEAP: Heap<Arena, u16, Interrupts> = Heap::new(StaticArena::new(), CONFIG, Interrupts);

const THREADS: usize = 8;
const ROUNDS: usize = 500;

/// Every thread keeps a handful of blocks alive, stamps them with its own
/// id and verifies the stamp before freeing them.
fn hammer<S>(heap: &'static Heap<Arena, u16, S>)
where
    S: SharedCriticalSection + Sync,
{
    let workers: Vec<_> = (0..THREADS)
        .map(|id| {
            thread::spawn(move || {
                let stamp = id as u8 + 1;
                let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

                for round in 0..ROUNDS {
                    let size = (round * 7 + id * 13) % 200 + 1;

                    if let Some(ptr) = heap.malloc(size) {
                        unsafe { ptr.as_ptr().write_bytes(stamp, size) };
                        live.push((ptr, size));
                    }

                    if live.len() > 4 || (round % 3 == 0 && !live.is_empty()) {
                        let (ptr, size) = live.remove(0);
                        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                        assert!(bytes.iter().all(|&byte| byte == stamp));

                        unsafe { heap.free(ptr.as_ptr()) };
                    }
                }

                for (ptr, _) in live {
                    unsafe { heap.free(ptr.as_ptr()) };
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

fn assert_empty<S: CriticalSection>(heap: &Heap<Arena, u16, S>) {
    heap.check().unwrap();

    let stats = heap.stats();
    assert_eq!(stats.used_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.lowest_free, 0);
}

#[test]
fn spin_lock_heap_survives_threads() {
    hammer(&SPIN_HEAP);
    assert_empty(&SPIN_HEAP);
}

#[test]
fn interrupt_heap_survives_threads() {
    hammer(&IRQ_HEAP);
    assert_empty(&IRQ_HEAP);
}

#[test]
fn concurrent_first_use_initializes_once() {
    static LAZY: Heap<Arena, u16, SpinLock> = Heap::new(StaticArena::new(), CONFIG, SpinLock::new());

    let ptrs: Vec<usize> = (0..THREADS)
        .map(|_| thread::spawn(|| LAZY.malloc(32).map(|ptr| ptr.as_ptr() as usize)))
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(ptrs.len(), THREADS);
    assert_eq!(LAZY.stats().used_blocks, THREADS);
    LAZY.check().unwrap();
}
