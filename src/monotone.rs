//! Compact non-decreasing integer sequences embedded in a [`BitBuffer`].
//!
//! Values are predicted by the straight line from 0 to the last value. The
//! deviation from that line is stored in two stages: a fixed-width base per
//! group of [`GROUP_SIZE`] entries, then a fixed-width residual per entry.
//! Any entry is two fixed-width reads away, so `get` is O(1).
//!
//! Layout at the embedding position:
//!
//! ```text
//! EliasDelta(count + 1)
//! -- only when count > 0 --
//! EliasDelta(last + 1)
//! EliasDelta(fold(min group base) + 1)
//! EliasDelta(group width + 1)
//! EliasDelta(entry width + 1)
//! group bases   ceil(count / GROUP_SIZE) x group width
//! residuals     count x entry width
//! ```

use crate::bits::{BitBuffer, bit_width, fold_signed, unfold_signed};

pub const GROUP_SIZE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct MonotoneList<'a> {
    buf: &'a BitBuffer,
    count: u64,
    last: u64,
    base: i64,
    group_width: u32,
    entry_width: u32,
    groups_pos: u64,
    entries_pos: u64,
    end: u64,
}

#[inline]
fn predicted(i: u64, count: u64, last: u64) -> i64 {
    if count < 2 {
        return 0;
    }
    (i as u128 * last as u128 / (count - 1) as u128) as i64
}

impl<'a> MonotoneList<'a> {
    /// Appends `values` to `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `values` is not non-decreasing.
    pub fn write(buf: &mut BitBuffer, values: &[u64]) {
        assert!(
            values.windows(2).all(|w| w[0] <= w[1]),
            "monotone list values must be non-decreasing"
        );
        let count = values.len() as u64;
        buf.write_elias_delta(count + 1);
        let Some(&last) = values.last() else {
            return;
        };
        let deviations: Vec<i64> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| v as i64 - predicted(i as u64, count, last))
            .collect();
        let group_bases: Vec<i64> = deviations
            .chunks(GROUP_SIZE)
            .map(|g| g.iter().copied().min().unwrap_or(0))
            .collect();
        let base = group_bases.iter().copied().min().unwrap_or(0);
        let group_width = group_bases
            .iter()
            .map(|&g| bit_width((g - base) as u64))
            .max()
            .unwrap_or(0);
        let entry_width = deviations
            .iter()
            .enumerate()
            .map(|(i, &d)| bit_width((d - group_bases[i / GROUP_SIZE]) as u64))
            .max()
            .unwrap_or(0);

        buf.write_elias_delta(last + 1);
        buf.write_elias_delta(fold_signed(base) + 1);
        buf.write_elias_delta(group_width as u64 + 1);
        buf.write_elias_delta(entry_width as u64 + 1);
        for &g in &group_bases {
            buf.write_bits((g - base) as u64, group_width);
        }
        for (i, &d) in deviations.iter().enumerate() {
            buf.write_bits((d - group_bases[i / GROUP_SIZE]) as u64, entry_width);
        }
    }

    /// Reads the header of a list written at `pos`.
    pub fn load(buf: &'a BitBuffer, mut pos: u64) -> Self {
        let count = buf.read_elias_delta(&mut pos) - 1;
        let mut list = Self {
            buf,
            count,
            last: 0,
            base: 0,
            group_width: 0,
            entry_width: 0,
            groups_pos: pos,
            entries_pos: pos,
            end: pos,
        };
        if count == 0 {
            return list;
        }
        list.last = buf.read_elias_delta(&mut pos) - 1;
        list.base = unfold_signed(buf.read_elias_delta(&mut pos) - 1);
        list.group_width = (buf.read_elias_delta(&mut pos) - 1) as u32;
        list.entry_width = (buf.read_elias_delta(&mut pos) - 1) as u32;
        list.groups_pos = pos;
        list.entries_pos = pos + count.div_ceil(GROUP_SIZE as u64) * list.group_width as u64;
        list.end = list.entries_pos + count * list.entry_width as u64;
        list
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bit position just past the list.
    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    pub fn get(&self, i: u64) -> u64 {
        debug_assert!(i < self.count);
        let group = i / GROUP_SIZE as u64;
        let group_base = self
            .buf
            .read_bits(self.groups_pos + group * self.group_width as u64, self.group_width);
        let residual = self
            .buf
            .read_bits(self.entries_pos + i * self.entry_width as u64, self.entry_width);
        (predicted(i, self.count, self.last) + self.base + group_base as i64 + residual as i64)
            as u64
    }

    /// Entries `i` and `i + 1`.
    #[inline]
    pub fn get_pair(&self, i: u64) -> (u64, u64) {
        (self.get(i), self.get(i + 1))
    }
}
