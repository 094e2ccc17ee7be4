use osmem::{BlockInfo, Heap, HeapConfig, StaticArena, Unprotected};

const CONFIG: HeapConfig = HeapConfig::new(256);

fn print_blocks<A: osmem::Arena>(heap: &Heap<A, u16, Unprotected>) {
    let mut blocks = [BlockInfo::default(); 16];
    let count = heap.blocks(&mut blocks);

    for block in &blocks[..count.min(blocks.len())] {
        let state = if block.used { "used" } else { "free" };
        println!("  [{:>3}] {:>3} bytes {}", block.offset, block.size, state);
    }
}

fn main() {
    let heap: Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, Unprotected> =
        Heap::new(StaticArena::new(), CONFIG, Unprotected);

    heap.init().expect("arena is sized from the configuration");
    println!("Fresh heap:");
    print_blocks(&heap);

    let a = heap.malloc(10).expect("room for a");
    let b = heap.malloc(40).expect("room for b");
    let c = heap.calloc(4, 8).expect("room for c");
    println!("\nAllocated a at {a:p}, b at {b:p}, c at {c:p}:");
    print_blocks(&heap);

    unsafe { heap.free(b.as_ptr()) };
    println!("\nFreed b:");
    print_blocks(&heap);

    let c = unsafe { heap.trim(c, 16) }.expect("shrinking never fails");
    println!("\nTrimmed c to 16 bytes:");
    print_blocks(&heap);

    unsafe {
        heap.free(a.as_ptr());
        heap.free(c.as_ptr());
    }
    println!("\nFreed everything:");
    print_blocks(&heap);

    println!("\n{:?}", heap.stats());
    heap.check().expect("chain is consistent");
}
