//! Deterministic 32-bit hashing for criterion keys.
//!
//! Comparator hashes must agree across processes so that a comparator rebuilt
//! from its serialized proxy hashes exactly like the original. `std::hash`
//! makes no such promise, so keys implement [`StableHash`] instead.

/// Deterministic 32-bit hash of a criterion key.
pub trait StableHash {
    fn stable_hash(&self) -> i32;
}

macro_rules! impl_stable_hash_narrow {
    ($($t:ty),*) => {
        $(
            impl StableHash for $t {
                #[inline]
                fn stable_hash(&self) -> i32 {
                    *self as i32
                }
            }
        )*
    };
}

macro_rules! impl_stable_hash_wide {
    ($($t:ty),*) => {
        $(
            impl StableHash for $t {
                #[inline]
                fn stable_hash(&self) -> i32 {
                    let bits = *self as u64;
                    (bits ^ (bits >> 32)) as i32
                }
            }
        )*
    };
}

impl_stable_hash_narrow!(i8, i16, i32, u8, u16, u32);
impl_stable_hash_wide!(i64, u64, isize, usize);

impl StableHash for bool {
    #[inline]
    fn stable_hash(&self) -> i32 {
        i32::from(*self)
    }
}

impl StableHash for char {
    #[inline]
    fn stable_hash(&self) -> i32 {
        *self as i32
    }
}

impl StableHash for str {
    fn stable_hash(&self) -> i32 {
        self.chars()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
    }
}

impl StableHash for String {
    #[inline]
    fn stable_hash(&self) -> i32 {
        self.as_str().stable_hash()
    }
}

impl<T: StableHash + ?Sized> StableHash for &T {
    #[inline]
    fn stable_hash(&self) -> i32 {
        (**self).stable_hash()
    }
}

impl<T: StableHash + ?Sized> StableHash for Box<T> {
    #[inline]
    fn stable_hash(&self) -> i32 {
        (**self).stable_hash()
    }
}

impl<T: StableHash> StableHash for Option<T> {
    #[inline]
    fn stable_hash(&self) -> i32 {
        self.as_ref().map_or(0, StableHash::stable_hash)
    }
}

impl<T: StableHash> StableHash for [T] {
    fn stable_hash(&self) -> i32 {
        self.iter()
            .fold(1i32, |h, e| h.wrapping_mul(31).wrapping_add(e.stable_hash()))
    }
}

impl<T: StableHash> StableHash for Vec<T> {
    #[inline]
    fn stable_hash(&self) -> i32 {
        self.as_slice().stable_hash()
    }
}

macro_rules! impl_stable_hash_tuple {
    ($($name:ident),+) => {
        impl<$($name: StableHash),+> StableHash for ($($name,)+) {
            #[allow(non_snake_case)]
            fn stable_hash(&self) -> i32 {
                let ($($name,)+) = self;
                let mut h = 1i32;
                $(h = h.wrapping_mul(31).wrapping_add($name.stable_hash());)+
                h
            }
        }
    };
}

impl_stable_hash_tuple!(A);
impl_stable_hash_tuple!(A, B);
impl_stable_hash_tuple!(A, B, C);
impl_stable_hash_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_hash_to_themselves() {
        assert_eq!(42i32.stable_hash(), 42);
        assert_eq!((-7i16).stable_hash(), -7);
        assert_eq!(255u8.stable_hash(), 255);
    }

    #[test]
    fn test_wide_integers_fold_halves() {
        assert_eq!(5i64.stable_hash(), 5);
        assert_eq!((1u64 << 32).stable_hash(), 1);
        assert_eq!((-1i64).stable_hash(), 0);
    }

    #[test]
    fn test_string_polynomial() {
        assert_eq!("".stable_hash(), 0);
        assert_eq!("a".stable_hash(), 97);
        assert_eq!("ab".stable_hash(), 97 * 31 + 98);
        assert_eq!(String::from("test").stable_hash(), "test".stable_hash());
        assert_eq!("test".stable_hash(), 3_556_498);
    }

    #[test]
    fn test_option_and_sequences() {
        assert_eq!(None::<i32>.stable_hash(), 0);
        assert_eq!(Some(9).stable_hash(), 9);
        assert_eq!(vec![1, 2].stable_hash(), (31 + 1) * 31 + 2);
        assert_eq!((1, 2).stable_hash(), vec![1, 2].stable_hash());
    }
}
