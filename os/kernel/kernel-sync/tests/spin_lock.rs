use kernel_sync::SpinLock;
use std::panic;

#[test]
fn lock_mutates_and_releases_on_drop() {
    let l = SpinLock::new("counter", 0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());

    let mut g = l.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new("byte", 1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn name_shows_up_in_debug() {
    let l = SpinLock::new("kmem", ());
    assert_eq!(l.name(), "kmem");
    let dbg = format!("{l:?}");
    assert!(dbg.contains("kmem"), "{dbg}");
    assert!(dbg.contains("locked: false"), "{dbg}");
}

#[test]
fn get_mut_bypasses_locking() {
    let mut l = SpinLock::new("list", vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn contended_pushes_are_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    let threads = 8;
    let iters = 2_000;

    // Emulates a free-list head: pop/push pairs must never interleave.
    let lock = Arc::new(SpinLock::new("stack", Vec::<usize>::new()));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for i in 0..iters {
                lock.with_lock(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    v.push(t * iters + i);
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let mut all = lock.with_lock(core::mem::take);
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new("poisoned", 0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new("sync", 0u8);
    takes_sync(&l);
}
