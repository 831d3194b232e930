//! Thread-confined handoff of slot words to a generated initializer.
//!
//! Bridge wiring is for artifacts whose slots can be neither embedded nor
//! written after definition. The engine registers the words for one artifact
//! serial, the artifact's `init` calls [`cmpforge_bridge_resolve`] and copies
//! what it gets back into its slot object. A registration answers exactly
//! one resolve, only on the registering thread, and only for its serial; it
//! is cleared when its guard drops.

use std::cell::RefCell;
use std::marker::PhantomData;

use cmpforge_core::{ComparatorError, Result};
use tracing::{trace, warn};

struct Pending {
    serial: u64,
    words: Box<[usize]>,
    consumed: bool,
}

thread_local! {
    static PENDING: RefCell<Option<Pending>> = const { RefCell::new(None) };
}

/// Keeps a bridge registration alive. Not `Send`.
#[derive(Debug)]
pub(crate) struct BridgeRegistration {
    serial: u64,
    _thread: PhantomData<*const ()>,
}

/// Registers `words` for the artifact with `serial` on the current thread.
pub(crate) fn register(serial: u64, words: Box<[usize]>) -> Result<BridgeRegistration> {
    PENDING.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(pending) = slot.as_ref() {
            return Err(ComparatorError::Instantiation {
                artifact: format!("#{serial}"),
                reason: format!(
                    "bridge already holds a registration for #{}",
                    pending.serial
                ),
            });
        }
        *slot = Some(Pending {
            serial,
            words,
            consumed: false,
        });
        trace!(serial, "Bridge registration opened");
        Ok(BridgeRegistration {
            serial,
            _thread: PhantomData,
        })
    })
}

impl Drop for BridgeRegistration {
    fn drop(&mut self) {
        let _ = PENDING.try_with(|cell| {
            if let Ok(mut slot) = cell.try_borrow_mut() {
                if slot.as_ref().is_some_and(|p| p.serial == self.serial) {
                    *slot = None;
                }
            }
        });
    }
}

/// Resolver called by generated initializers.
///
/// Returns the address of the registered words, or 0 when nothing is
/// registered for `serial` on this thread or it was already resolved.
pub(crate) extern "C" fn cmpforge_bridge_resolve(serial: i64) -> i64 {
    let serial = serial as u64;
    let resolved = PENDING
        .try_with(|cell| {
            let mut slot = cell.try_borrow_mut().ok()?;
            let pending = slot.as_mut()?;
            if pending.serial != serial || pending.consumed {
                return None;
            }
            pending.consumed = true;
            Some(pending.words.as_ptr() as i64)
        })
        .ok()
        .flatten();
    match resolved {
        Some(address) => address,
        None => {
            warn!(serial, "Rejected bridge resolution");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(address: i64, len: usize) -> Vec<usize> {
        // SAFETY: tests only read addresses returned while the registration
        // is alive.
        unsafe { std::slice::from_raw_parts(address as *const usize, len) }.to_vec()
    }

    #[test]
    fn test_resolve_is_single_use() {
        let guard = register(11, vec![1, 2, 3].into_boxed_slice()).unwrap();
        let address = cmpforge_bridge_resolve(11);
        assert_ne!(address, 0);
        assert_eq!(read(address, 3), vec![1, 2, 3]);
        assert_eq!(cmpforge_bridge_resolve(11), 0);
        drop(guard);
    }

    #[test]
    fn test_mismatched_serial_sees_nothing() {
        let _guard = register(21, vec![9].into_boxed_slice()).unwrap();
        assert_eq!(cmpforge_bridge_resolve(22), 0);
        assert_ne!(cmpforge_bridge_resolve(21), 0);
    }

    #[test]
    fn test_other_threads_see_nothing() {
        let _guard = register(31, vec![4].into_boxed_slice()).unwrap();
        let remote = std::thread::spawn(|| cmpforge_bridge_resolve(31))
            .join()
            .unwrap();
        assert_eq!(remote, 0);
        assert_ne!(cmpforge_bridge_resolve(31), 0);
    }

    #[test]
    fn test_guard_clears_registration() {
        let guard = register(41, vec![5].into_boxed_slice()).unwrap();
        drop(guard);
        assert_eq!(cmpforge_bridge_resolve(41), 0);
        let _again = register(42, vec![6].into_boxed_slice()).unwrap();
    }

    #[test]
    fn test_not_reentrant() {
        let _guard = register(51, vec![7].into_boxed_slice()).unwrap();
        let err = register(52, vec![8].into_boxed_slice()).unwrap_err();
        assert!(matches!(err, ComparatorError::Instantiation { .. }));
    }
}
