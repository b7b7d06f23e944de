//! # Generational Pool
//!
//! Fixed-capacity arena for entities that spawn and despawn all the time
//! (mobs, interactive objects).
//!
//! Each slot carries a generation counter. Freeing a slot bumps it, so a
//! [`Handle`] taken before the free can never see the next occupant. This is
//! what lets worker results and chunk back-references hold plain integer
//! handles instead of owning references.

/// Handle to a value stored in a [`Pool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index inside the pool.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the handle into a single `u64` (generation in the high half).
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Rebuilds a handle from [`Handle::to_bits`] output.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A generational arena with a hard capacity.
///
/// Storage is reserved up front. Insertion fails (returns `None`) once the
/// pool is full rather than growing, which keeps spawn storms bounded.
///
/// # Example
///
/// ```rust
/// use strata_core::Pool;
///
/// let mut pool: Pool<u32> = Pool::with_capacity(2);
/// let a = pool.insert(10).unwrap();
/// assert_eq!(pool.remove(a), Some(10));
///
/// // The slot is reused, but the old handle is dead.
/// let b = pool.insert(20).unwrap();
/// assert_eq!(a.index(), b.index());
/// assert!(pool.get(a).is_none());
/// ```
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl<T> Pool<T> {
    /// Creates an empty pool that can hold at most `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be greater than zero");
        assert!(u32::try_from(capacity).is_ok(), "pool capacity exceeds u32");

        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
            capacity,
        }
    }

    /// Maximum number of live values.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no value is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its handle, or `None` when the pool is full.
    pub fn insert(&mut self, value: T) -> Option<Handle> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Some(Handle {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.len() >= self.capacity {
            return None;
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.len += 1;
        Some(Handle {
            index,
            generation: 0,
        })
    }

    /// Removes the value behind `handle`.
    ///
    /// Returns `None` for stale or foreign handles.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// True if `handle` still refers to a live value.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Shared access to the value behind `handle`.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Exclusive access to the value behind `handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Removes every value. All outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_list.push(index as u32);
        }
        self.len = 0;
    }

    /// Removes every value for which `keep` returns false and hands the
    /// removed values back in slot order.
    pub fn drain_filter<F>(&mut self, mut keep: F) -> Vec<(Handle, T)>
    where
        F: FnMut(Handle, &mut T) -> bool,
    {
        let mut removed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let handle = Handle {
                index: index as u32,
                generation: slot.generation,
            };
            let drop_it = match slot.value.as_mut() {
                Some(value) => !keep(handle, value),
                None => false,
            };
            if drop_it {
                if let Some(value) = slot.value.take() {
                    slot.generation = slot.generation.wrapping_add(1);
                    self.free_list.push(handle.index);
                    self.len -= 1;
                    removed.push((handle, value));
                }
            }
        }
        removed
    }

    /// Handles of all live values, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Iterates over live values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Iterates mutably over live values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);

        let h = pool.insert(42).unwrap();
        assert_eq!(pool.get(h), Some(&42));
        assert_eq!(pool.len(), 1);

        assert_eq!(pool.remove(h), Some(42));
        assert!(pool.is_empty());
        assert_eq!(pool.remove(h), None, "double remove must be a no-op");
    }

    #[test]
    fn test_full_pool_rejects() {
        let mut pool: Pool<u8> = Pool::with_capacity(2);
        pool.insert(1).unwrap();
        pool.insert(2).unwrap();
        assert!(pool.insert(3).is_none());
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut pool: Pool<&str> = Pool::with_capacity(1);

        let old = pool.insert("zombie").unwrap();
        pool.remove(old);
        let new = pool.insert("golem").unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new), Some(&"golem"));
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut pool: Pool<u32> = Pool::with_capacity(3);
        let a = pool.insert(1).unwrap();
        let b = pool.insert(2).unwrap();

        pool.clear();

        assert!(pool.is_empty());
        assert!(!pool.contains(a));
        assert!(!pool.contains(b));
        assert_eq!(pool.handles().len(), 0);

        // Capacity is fully available again.
        for i in 0..3 {
            assert!(pool.insert(i).is_some());
        }
    }

    #[test]
    fn test_drain_filter_removes_rejected() {
        let mut pool: Pool<u32> = Pool::with_capacity(8);
        for i in 0..6 {
            pool.insert(i).unwrap();
        }

        let removed = pool.drain_filter(|_, v| *v % 2 == 0);

        assert_eq!(removed.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(pool.len(), 3);
        for (handle, _) in removed {
            assert!(!pool.contains(handle));
        }
    }

    #[test]
    fn test_handle_bits_roundtrip() {
        let mut pool: Pool<u8> = Pool::with_capacity(2);
        let h = pool.insert(9).unwrap();
        pool.remove(h);
        let h2 = pool.insert(7).unwrap();
        assert_eq!(Handle::from_bits(h2.to_bits()), h2);
    }
}
