//! Boot counter kept in reset-surviving memory.
//!
//! The backing memory keeps its contents across deep sleep and software or
//! watchdog resets, but powers up with arbitrary bits. [`RetainedSlot`] pairs
//! the count with a check word so garbage left behind by a power loss reads
//! back as "absent" and the counter starts over.

/// Check-word seed mixed into every retained slot.
pub const RETAINED_SLOT_MAGIC: u32 = 0x7C32_B007;

/// Storage that survives deep sleep but not full power loss.
pub trait BootCounterStore {
    /// Returns the stored count, or `None` when the store holds no valid value.
    fn read(&self) -> Option<u32>;

    /// Replaces the stored count.
    fn write(&mut self, value: u32);
}

/// Encoded representation of a count in two retained words.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RetainedSlot {
    pub check: u32,
    pub value: u32,
}

impl RetainedSlot {
    /// Encodes `value` together with its check word.
    pub const fn seal(value: u32) -> Self {
        Self {
            check: value ^ RETAINED_SLOT_MAGIC,
            value,
        }
    }

    /// Decodes the slot, rejecting contents whose check word does not match.
    pub const fn unseal(self) -> Option<u32> {
        if self.check ^ RETAINED_SLOT_MAGIC == self.value {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Counter incremented exactly once per boot.
pub struct PersistentBootCounter<S> {
    store: S,
}

impl<S> PersistentBootCounter<S>
where
    S: BootCounterStore,
{
    /// Wraps an explicit store handle.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Increments the stored count and returns the new value (always `>= 1`).
    pub fn increment_and_get(&mut self) -> u32 {
        let next = self.store.read().unwrap_or(0).saturating_add(1);
        self.store.write(next);
        next
    }

    /// Returns the stored count without modifying it.
    pub fn current(&self) -> Option<u32> {
        self.store.read()
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the underlying store mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consumes the counter and returns the store.
    pub fn into_store(self) -> S {
        self.store
    }
}

/// Store backed by a plain [`RetainedSlot`], used by the emulator and tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBootCounterStore {
    slot: RetainedSlot,
}

impl InMemoryBootCounterStore {
    /// Creates a store holding power-on garbage.
    pub const fn new() -> Self {
        Self {
            slot: RetainedSlot {
                check: 0,
                value: 0xFFFF_FFFF,
            },
        }
    }

    /// Simulates a full power loss by scrambling the retained words.
    pub fn lose_power(&mut self) {
        self.slot = RetainedSlot {
            check: self.slot.check.rotate_left(7) ^ 0xA5A5_A5A5,
            value: !self.slot.value,
        };
    }
}

impl BootCounterStore for InMemoryBootCounterStore {
    fn read(&self) -> Option<u32> {
        self.slot.unseal()
    }

    fn write(&mut self, value: u32) {
        self.slot = RetainedSlot::seal(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_boot_after_power_loss_counts_one() {
        let mut counter = PersistentBootCounter::new(InMemoryBootCounterStore::new());
        assert_eq!(counter.current(), None);
        assert_eq!(counter.increment_and_get(), 1);
        assert_eq!(counter.current(), Some(1));
    }

    #[test]
    fn count_strictly_increases_across_resets() {
        let mut store = InMemoryBootCounterStore::new();
        let mut previous = 0;
        for _ in 0..5 {
            let mut counter = PersistentBootCounter::new(store);
            let value = counter.increment_and_get();
            assert!(value > previous);
            previous = value;
            store = counter.into_store();
        }
        assert_eq!(previous, 5);
    }

    #[test]
    fn power_loss_restarts_the_count() {
        let mut counter = PersistentBootCounter::new(InMemoryBootCounterStore::new());
        counter.increment_and_get();
        counter.increment_and_get();
        counter.store_mut().lose_power();

        assert_eq!(counter.current(), None);
        assert_eq!(counter.increment_and_get(), 1);
    }

    #[test]
    fn counter_saturates() {
        let mut store = InMemoryBootCounterStore::new();
        store.write(u32::MAX);
        let mut counter = PersistentBootCounter::new(store);
        assert_eq!(counter.increment_and_get(), u32::MAX);
    }

    #[test]
    fn slot_rejects_mismatched_check_word() {
        let sealed = RetainedSlot::seal(42);
        assert_eq!(sealed.unseal(), Some(42));

        let corrupted = RetainedSlot {
            check: sealed.check,
            value: 43,
        };
        assert_eq!(corrupted.unseal(), None);
    }
}
