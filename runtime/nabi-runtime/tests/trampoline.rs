use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use nabi_runtime::pinning::{active_pins, pins_taken};
use nabi_runtime::{
    trampoline, trampoline_state, Callback, NativeBool, NativeFn, RawFnPtr, TrampolineError,
    TrampolineState,
};

/// Mirrors a native read request whose completion routine is stored inline.
#[repr(C)]
#[derive(Clone, Copy)]
struct ReadRequest {
    offset: u32,
    bytes_read: u32,
    done: Callback<ReadDoneFn>,
}

type ReadDoneFn = unsafe extern "C" fn(*mut ReadRequest, i32) -> i32;

static SEEN_ADDR: AtomicUsize = AtomicUsize::new(0);
static SEEN_ACTIVE_PINS: AtomicUsize = AtomicUsize::new(usize::MAX);

unsafe extern "C" fn read_done(request: *mut ReadRequest, result: i32) -> i32 {
    SEEN_ADDR.store(request as usize, Ordering::SeqCst);
    SEEN_ACTIVE_PINS.store(active_pins(), Ordering::SeqCst);
    unsafe {
        (*request).bytes_read = 2048;
        (*request).offset += 1;
    }
    result * 10
}

unsafe extern "C" fn toggle(flag: i32) -> i32 {
    (flag == 0) as i32
}

#[test]
fn test_reference_argument_is_stable_during_write_back() {
    let mut request = ReadRequest {
        offset: 7,
        bytes_read: 0,
        done: Callback::from_fn(read_done as ReadDoneFn),
    };
    let expected_addr = &request as *const ReadRequest as usize;
    let done = request.done;

    let ret = unsafe { done.invoke((&mut request, 3i32)) }.expect("non-null callback");

    assert_eq!(ret, 30);
    assert_eq!(SEEN_ADDR.load(Ordering::SeqCst), expected_addr);
    assert_eq!(SEEN_ACTIVE_PINS.load(Ordering::SeqCst), 1);
    assert_eq!(active_pins(), 0);
    assert_eq!(request.bytes_read, 2048);
    assert_eq!(request.offset, 8);
}

#[test]
fn test_null_target_makes_no_call() {
    let mut request = ReadRequest {
        offset: 0,
        bytes_read: 0,
        done: Callback::null(),
    };
    let pins = pins_taken();
    let done = request.done;

    let err = unsafe { done.invoke((&mut request, 1i32)) }.unwrap_err();

    assert!(matches!(err, TrampolineError::NullFunctionPointer { .. }));
    assert_eq!(err.to_string(), "null function pointer passed to trampoline (ptr_mut, i32) -> i32");
    assert_eq!(pins_taken(), pins);
    assert_eq!(request.bytes_read, 0);
}

#[test]
fn test_raw_target_through_shared_table() {
    type ToggleFn = unsafe extern "C" fn(i32) -> i32;
    let t = trampoline::<ToggleFn>();
    assert_eq!(trampoline_state::<ToggleFn>(), TrampolineState::Ready);
    assert_eq!(t.shape(), &ToggleFn::shape());

    let target = (toggle as ToggleFn).to_raw();
    assert_eq!(unsafe { t.invoke(target, (NativeBool::FALSE,)) }, Ok(1));
    assert_eq!(unsafe { t.invoke(target, (5i32,)) }, Ok(0));
    assert!(unsafe { t.invoke(RawFnPtr::NULL, (1i32,)) }.is_err());
}

#[test]
fn test_concurrent_first_use_builds_one_trampoline() {
    type Shape = unsafe extern "C" fn(*mut c_void, u64, u64) -> u64;

    let addrs: Vec<usize> = (0..8)
        .map(|_| thread::spawn(|| trampoline::<Shape>() as *const _ as usize))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();

    assert!(addrs.windows(2).all(|pair| pair[0] == pair[1]));
}
