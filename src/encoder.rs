//! Recursive splitting of one bucket.
//!
//! Every node of the recursion tree searches trial seeds, starting right
//! after the seed of its parent, until the keys either land on a perfect
//! permutation (leaf) or fall into children of exactly the planned sizes
//! (split). Only the seed offset is written, Golomb-Rice coded with the
//! parameter of the node size; the tree shape is implied by the sizes.

use crate::bits::BitBuffer;
use crate::hash::{UniversalHash, scale, supplemental_hash};
use crate::processor::Processor;
use crate::settings::{MAX_FANOUT, SUPPLEMENTAL_HASH_SHIFT, Settings, SplitPlan};

/// A key together with its hash for the current epoch.
pub struct Entry<'k, K: ?Sized> {
    pub hash: u64,
    pub key: &'k K,
}

impl<K: ?Sized> Clone for Entry<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ?Sized> Copy for Entry<'_, K> {}

struct Child<'s, 'k, K: ?Sized> {
    entries: &'s mut [Entry<'k, K>],
    scratch: &'s mut [Entry<'k, K>],
}

pub struct Encoder<'a, H, P> {
    settings: &'a Settings,
    hash: &'a H,
    processor: &'a P,
}

impl<'a, H, P: Processor> Encoder<'a, H, P> {
    pub fn new(settings: &'a Settings, hash: &'a H, processor: &'a P) -> Self {
        Self {
            settings,
            hash,
            processor,
        }
    }

    /// Encodes one bucket whose entries carry `hash(key, 0)`. Entries are
    /// reordered in place.
    pub fn encode_bucket<K>(&self, entries: &mut [Entry<'_, K>], out: &mut BitBuffer)
    where
        K: ?Sized + Sync,
        H: UniversalHash<K> + Sync,
    {
        let mut scratch = entries.to_vec();
        self.encode(entries, &mut scratch, 0, 0, out);
    }

    fn encode<'k, K>(
        &self,
        entries: &mut [Entry<'k, K>],
        scratch: &mut [Entry<'k, K>],
        start: u64,
        mut epoch: u64,
        out: &mut BitBuffer,
    ) where
        K: ?Sized + Sync,
        H: UniversalHash<K> + Sync,
    {
        let size = entries.len();
        if size < 2 {
            return;
        }
        let plan = self.settings.split_of(size);
        let mut seed = start;
        loop {
            seed += 1;
            let seed_epoch = seed >> SUPPLEMENTAL_HASH_SHIFT;
            if seed_epoch != epoch {
                for e in entries.iter_mut() {
                    e.hash = self.hash.universal_hash(e.key, seed_epoch);
                }
                epoch = seed_epoch;
            }
            let found = match plan {
                SplitPlan::Leaf => is_bijection(entries, seed),
                _ => matches_plan(entries, seed, plan),
            };
            if found {
                break;
            }
        }
        out.write_golomb_rice(self.settings.golomb_shift(size), seed - start - 1);
        if plan == SplitPlan::Leaf {
            return;
        }

        reorder(entries, scratch, seed, plan);

        if self.processor.should_fork(size) {
            let mut children = Vec::with_capacity(plan.fanout());
            let (mut rest, mut rest_scratch) = (entries, scratch);
            for c in 0..plan.fanout() {
                let n = plan.child_size(size, c);
                let (child, tail) = std::mem::take(&mut rest).split_at_mut(n);
                let (child_scratch, scratch_tail) =
                    std::mem::take(&mut rest_scratch).split_at_mut(n);
                children.push(Child {
                    entries: child,
                    scratch: child_scratch,
                });
                rest = tail;
                rest_scratch = scratch_tail;
            }
            out.append(&self.encode_children(&mut children, seed, epoch));
            return;
        }

        let (mut rest, mut rest_scratch) = (entries, scratch);
        for c in 0..plan.fanout() {
            let n = plan.child_size(size, c);
            let (child, tail) = std::mem::take(&mut rest).split_at_mut(n);
            let (child_scratch, scratch_tail) = std::mem::take(&mut rest_scratch).split_at_mut(n);
            self.encode(child, child_scratch, seed, epoch, out);
            rest = tail;
            rest_scratch = scratch_tail;
        }
    }

    /// Encodes sibling subtrees into private buffers, halving the sibling
    /// list at every fork, and concatenates them in order.
    fn encode_children<K>(
        &self,
        children: &mut [Child<'_, '_, K>],
        start: u64,
        epoch: u64,
    ) -> BitBuffer
    where
        K: ?Sized + Sync,
        H: UniversalHash<K> + Sync,
    {
        match children {
            [] => BitBuffer::new(),
            [only] => {
                let mut out = BitBuffer::new();
                self.encode(only.entries, only.scratch, start, epoch, &mut out);
                out
            }
            _ => {
                let (left, right) = children.split_at_mut(children.len() / 2);
                let (mut out, tail) = self.processor.split(
                    || self.encode_children(left, start, epoch),
                    || self.encode_children(right, start, epoch),
                );
                out.append(&tail);
                out
            }
        }
    }
}

#[inline]
fn is_bijection<K: ?Sized>(entries: &[Entry<'_, K>], seed: u64) -> bool {
    let size = entries.len() as u64;
    let mut used = 0u32;
    for e in entries {
        let bit = 1u32 << scale(supplemental_hash(e.hash, seed), size);
        if used & bit != 0 {
            return false;
        }
        used |= bit;
    }
    true
}

#[inline]
fn matches_plan<K: ?Sized>(entries: &[Entry<'_, K>], seed: u64, plan: SplitPlan) -> bool {
    let size = entries.len() as u64;
    match plan {
        SplitPlan::Leaf => false,
        SplitPlan::Even { part, .. } => {
            let mut counts = [0usize; MAX_FANOUT];
            for e in entries {
                let c = plan.child_of(scale(supplemental_hash(e.hash, seed), size));
                counts[c] += 1;
                if counts[c] > part {
                    return false;
                }
            }
            true
        }
        SplitPlan::Uneven { first } => {
            let first = first as u64;
            let mut left = 0;
            for e in entries {
                if scale(supplemental_hash(e.hash, seed), size) < first {
                    left += 1;
                    if left > first {
                        return false;
                    }
                }
            }
            left == first
        }
    }
}

/// Makes every child contiguous, in child order.
fn reorder<'k, K: ?Sized>(
    entries: &mut [Entry<'k, K>],
    scratch: &mut [Entry<'k, K>],
    seed: u64,
    plan: SplitPlan,
) {
    let size = entries.len();
    let mut next = [0usize; MAX_FANOUT];
    for (c, slot) in next.iter_mut().enumerate().take(plan.fanout()) {
        *slot = plan.child_start(c);
    }
    for e in entries.iter() {
        let c = plan.child_of(scale(supplemental_hash(e.hash, seed), size as u64));
        scratch[next[c]] = *e;
        next[c] += 1;
    }
    for (c, &end) in next.iter().enumerate().take(plan.fanout()) {
        assert_eq!(
            end,
            plan.child_start(c) + plan.child_size(size, c),
            "split seed {seed} produced a child of the wrong size"
        );
    }
    entries.copy_from_slice(scratch);
}
