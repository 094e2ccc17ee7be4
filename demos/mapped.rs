use osmem::{Heap, HeapConfig, MappedArena, SpinLock};

fn main() {
    // Too big for 16-bit offsets.
    let config = HeapConfig::new(256 * 1024).with_alignment(8);
    let arena = MappedArena::for_config::<u32>(&config).expect("mmap failed");
    println!("Mapped {} bytes", arena.len());

    let heap: Heap<MappedArena, u32, SpinLock> = Heap::new(arena, config, SpinLock::new());

    let block1 = heap.malloc(100_000).expect("room for block1");
    println!("{:?}", block1);
    let block2 = heap.malloc(4).expect("room for block2");
    println!("{:?}", block2);

    println!("Deallocating block1");
    unsafe { heap.free(block1.as_ptr()) };

    let block3 = heap.malloc(4).expect("room for block3");
    println!("Should be first addr {:?}", block3);

    heap.check().expect("chain is consistent");
}
