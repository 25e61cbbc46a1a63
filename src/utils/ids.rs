use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out ids from one monotonic counter, starting at 1.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next<T: From<u64>>(&self) -> T {
        T::from(self.next_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegisteredId;

    #[test]
    fn test_ids_are_sequential() {
        let ids = IdAllocator::new();
        let a: RegisteredId = ids.next();
        let b: RegisteredId = ids.next();
        assert_eq!(a, RegisteredId(1));
        assert_eq!(b, RegisteredId(2));
    }
}
