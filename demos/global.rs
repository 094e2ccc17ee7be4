//! Runs a program on top of a heap installed as the global allocator.
//! Boxes, vectors and strings all come out of one static arena.

use std::thread;

use osmem::{Heap, HeapConfig, SpinLock, StaticArena};

const CONFIG: HeapConfig = HeapConfig::new(60 * 1024).with_alignment(16);

#[global_allocator]
static HEAP: Heap<StaticArena<{ CONFIG.arena_bytes::<u16>() }>, u16, SpinLock> =
    Heap::new(StaticArena::new(), CONFIG, SpinLock::new());

fn main() {
    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    // Merge example: two freed neighbours are reused as one block.
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    let ptr_c = c.as_ptr();

    if ptr_a == ptr_c {
        println!("Correctly reused at {:p}", ptr_c);
    } else {
        println!("Not reused. A was at {:p} and C is at {:p}", ptr_a, ptr_c);
    }

    // Shrinking a vector trims its block in place.
    let mut big = Vec::<u8>::with_capacity(1024);
    big.extend_from_slice(b"shrink me");
    let before = big.as_ptr();
    big.shrink_to_fit();
    println!("\nShrunk in place: {}", before == big.as_ptr());

    let t1 = thread::spawn(|| Box::new(222));
    let t2 = thread::spawn(|| Box::new(333));

    println!("\nThreads: {} {}", t1.join().unwrap(), t2.join().unwrap());
    println!("{:?}", HEAP.stats());
}
