//! # Ordered Container
//!
//! A `Vec`-backed sequence that keeps its elements in ascending order as they are
//! inserted one at a time. The protocol layer uses it to keep in-flight exchanges
//! sorted by retransmission deadline and seen message ids sorted by expiry.
//!
//! ## Ordering rules
//!
//! Ordering is an explicit value passed at construction, never an ambient type
//! capability. Anything implementing [`OrderingRule`] works:
//!
//! - [`Natural`] defers to the element's own `PartialOrd`
//! - [`ByKey`] orders by an extracted key
//! - any closure `Fn(&T, &T) -> Option<Ordering>`
//!
//! A rule returns `None` for a pair it cannot order (for example `f64::NAN`).
//! Inserting such an element is a wiring defect and fails with
//! [`ContainerError::Incomparable`], leaving the container untouched.
//!
//! ## Ties
//!
//! Elements comparing equal keep their insertion order: a new element lands after
//! every existing element it ties with. Exchanges sharing a deadline are therefore
//! retransmitted first-in, first-out.
//!
//! ```rust
//! use minicoap::ordered::{ByKey, OrderedContainer};
//!
//! let mut jobs = OrderedContainer::new(ByKey(|job: &(u32, &str)| job.0));
//! jobs.insert((2, "b")).unwrap();
//! jobs.insert((1, "a")).unwrap();
//! jobs.insert((2, "c")).unwrap();
//! assert_eq!(jobs.to_vec(), vec![(1, "a"), (2, "b"), (2, "c")]);
//! ```

use std::cmp::Ordering;
use std::fmt;

/// Errors raised by [`OrderedContainer`] operations.
///
/// Both variants indicate a defect in the caller, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// The ordering rule could not order two elements.
    #[error("ordering rule cannot compare the element at index {index}")]
    Incomparable {
        /// Where the failing comparison happened.
        ///
        /// For [`OrderedContainer::insert`] and the merge step of
        /// [`OrderedContainer::insert_batch`] this is the stored element the new
        /// one was compared against, or `len()` when the new element cannot be
        /// compared with itself. When sorting a batch it is the position within
        /// the batch of an element from the failing pair.
        index: usize,
    },
    /// Indexed access past the end of the container.
    #[error("index {index} out of range for container of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Container length at the time of the call
        len: usize,
    },
}

/// A comparison capability for elements of type `T`.
pub trait OrderingRule<T> {
    /// Compare two elements; `None` if the pair is not comparable.
    fn compare(&self, a: &T, b: &T) -> Option<Ordering>;
}

/// Orders elements by their intrinsic `PartialOrd`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<T: PartialOrd> OrderingRule<T> for Natural {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Option<Ordering> {
        a.partial_cmp(b)
    }
}

/// Orders elements by a key extracted with the wrapped function.
#[derive(Clone, Copy)]
pub struct ByKey<F>(pub F);

impl<T, K, F> OrderingRule<T> for ByKey<F>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Option<Ordering> {
        (self.0)(a).partial_cmp(&(self.0)(b))
    }
}

impl<F> fmt::Debug for ByKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByKey(..)")
    }
}

impl<T, F> OrderingRule<T> for F
where
    F: Fn(&T, &T) -> Option<Ordering>,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Option<Ordering> {
        self(a, b)
    }
}

/// Sequence container kept in non-decreasing order under its rule.
pub struct OrderedContainer<T, R = Natural> {
    items: Vec<T>,
    rule: R,
}

impl<T: PartialOrd> OrderedContainer<T, Natural> {
    /// Create an empty container ordered by the elements' own ordering.
    #[must_use]
    pub fn natural() -> Self {
        Self::new(Natural)
    }
}

impl<T: PartialOrd> Default for OrderedContainer<T, Natural> {
    fn default() -> Self {
        Self::natural()
    }
}

impl<T, R: OrderingRule<T>> OrderedContainer<T, R> {
    /// Create an empty container with the given ordering rule.
    #[must_use]
    pub fn new(rule: R) -> Self {
        Self {
            items: Vec::new(),
            rule,
        }
    }

    /// Create an empty container with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(rule: R, capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            rule,
        }
    }

    /// Seed a container from an existing collection, sorting it once.
    ///
    /// The sort is stable, so equal elements keep their order from `elements`.
    pub fn from_batch<I>(rule: R, elements: I) -> Result<Self, ContainerError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut items: Vec<T> = elements.into_iter().collect();
        sort_stable(&rule, &mut items)?;
        Ok(Self { items, rule })
    }

    /// Insert one element, returning the index it was placed at.
    ///
    /// Scans from the tail and stops at the first element not greater than the
    /// new one, so ties are placed after existing equals.
    pub fn insert(&mut self, element: T) -> Result<usize, ContainerError> {
        // An empty container runs no comparison, so check reflexivity directly
        if self.rule.compare(&element, &element).is_none() {
            return Err(ContainerError::Incomparable {
                index: self.items.len(),
            });
        }
        let mut i = self.items.len();
        while i > 0 {
            match self.rule.compare(&element, &self.items[i - 1]) {
                Some(Ordering::Less) => i -= 1,
                Some(_) => break,
                None => return Err(ContainerError::Incomparable { index: i - 1 }),
            }
        }
        self.items.insert(i, element);
        Ok(i)
    }

    /// Insert a batch of elements with a single sort pass.
    ///
    /// The batch is sorted on its own and then merged into the existing run.
    /// The result equals a stable sort of `existing ++ batch`. Nothing is
    /// inserted if any comparison fails.
    pub fn insert_batch<I>(&mut self, elements: I) -> Result<(), ContainerError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut batch: Vec<T> = elements.into_iter().collect();
        if batch.is_empty() {
            return Ok(());
        }
        sort_stable(&self.rule, &mut batch)?;

        // Plan the merge on references first so a failed comparison leaves
        // `self.items` untouched.
        let mut take_batch = Vec::with_capacity(self.items.len() + batch.len());
        let (mut i, mut j) = (0, 0);
        while i < self.items.len() && j < batch.len() {
            match self.rule.compare(&batch[j], &self.items[i]) {
                Some(Ordering::Less) => {
                    take_batch.push(true);
                    j += 1;
                }
                Some(_) => {
                    take_batch.push(false);
                    i += 1;
                }
                None => return Err(ContainerError::Incomparable { index: i }),
            }
        }

        let mut existing = std::mem::take(&mut self.items).into_iter();
        let mut incoming = batch.into_iter();
        let mut merged = Vec::with_capacity(take_batch.len() + existing.len() + incoming.len());
        for from_batch in take_batch {
            let next = if from_batch {
                incoming.next()
            } else {
                existing.next()
            };
            merged.extend(next);
        }
        merged.extend(existing);
        merged.extend(incoming);
        self.items = merged;
        Ok(())
    }

    /// Number of stored elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` when nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element at `index`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Smallest element.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, ContainerError> {
        if index >= self.items.len() {
            return Err(ContainerError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    /// Index of the first element matching `pred`.
    pub fn position<P>(&self, pred: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().position(pred)
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Borrow the ordered elements as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Owned snapshot of the current sequence.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.clone()
    }

    /// The ordering rule in use.
    pub fn rule(&self) -> &R {
        &self.rule
    }
}

impl<T: fmt::Debug, R> fmt::Debug for OrderedContainer<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<'a, T, R> IntoIterator for &'a OrderedContainer<T, R> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Stable sort that reports an incomparable pair instead of guessing.
///
/// On failure `items` is left in its original order.
fn sort_stable<T, R: OrderingRule<T>>(rule: &R, items: &mut Vec<T>) -> Result<(), ContainerError> {
    for (index, item) in items.iter().enumerate() {
        if rule.compare(item, item).is_none() {
            return Err(ContainerError::Incomparable { index });
        }
    }
    // `sort_by` cannot abort midway, so catch the common case up front
    for (index, pair) in items.windows(2).enumerate() {
        if rule.compare(&pair[0], &pair[1]).is_none() {
            return Err(ContainerError::Incomparable { index });
        }
    }

    // Sort positions rather than elements so a late failure can name one
    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failed = None;
    order.sort_by(|&a, &b| {
        rule.compare(&items[a], &items[b]).unwrap_or_else(|| {
            failed.get_or_insert(a.min(b));
            Ordering::Equal
        })
    });
    if let Some(index) = failed {
        return Err(ContainerError::Incomparable { index });
    }

    let mut slots: Vec<Option<T>> = std::mem::take(items).into_iter().map(Some).collect();
    items.extend(order.into_iter().filter_map(|i| slots[i].take()));
    Ok(())
}
