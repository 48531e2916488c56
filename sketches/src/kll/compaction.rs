// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Randomized compaction primitives operating on the flat level buffer.

use std::cmp::Ordering;

use super::helper::compute_total_capacity;
use super::helper::level_capacity;
use super::sketch::KllItem;
use crate::common::RandomSource;

/// Keeps every other element of `buf[start..start + length)`, chosen by one
/// random bit, compacted into the lower half of the range. The upper half
/// becomes dead space. `length` must be even.
pub(crate) fn randomly_halve_down<T, R>(buf: &mut [T], start: usize, length: usize, rng: &mut R)
where
    T: Clone,
    R: RandomSource,
{
    debug_assert_eq!(length % 2, 0, "length must be even");
    let half = length / 2;
    let offset = rng.next_bit() as usize;
    for i in 0..half {
        let survivor = buf[start + offset + 2 * i].clone();
        buf[start + i] = survivor;
    }
}

/// Mirror of [`randomly_halve_down`]: survivors land in the upper half of
/// the range and the lower half becomes dead space.
pub(crate) fn randomly_halve_up<T, R>(buf: &mut [T], start: usize, length: usize, rng: &mut R)
where
    T: Clone,
    R: RandomSource,
{
    debug_assert_eq!(length % 2, 0, "length must be even");
    let half = length / 2;
    let offset = rng.next_bit() as usize;
    for i in 0..half {
        let survivor = buf[start + length - 1 - offset - 2 * i].clone();
        buf[start + length - 1 - i] = survivor;
    }
}

/// Merges the sorted ranges `buf[start_a..start_a + len_a)` and
/// `buf[start_b..start_b + len_b)` into the range starting at `start_c`,
/// writing strictly left to right.
///
/// The output range may overlap range B, so this cannot defer to a library
/// merge. Requires `start_a + len_a <= start_c` and
/// `start_c + len_a <= start_b`, which guarantees the write cursor never
/// overtakes an unread element.
pub(crate) fn merge_overlap<T: KllItem>(
    buf: &mut [T],
    start_a: usize,
    len_a: usize,
    start_b: usize,
    len_b: usize,
    start_c: usize,
) {
    let lim_a = start_a + len_a;
    let lim_b = start_b + len_b;
    debug_assert!(lim_a <= start_c);
    debug_assert!(start_c + len_a <= start_b);
    let mut a = start_a;
    let mut b = start_b;
    let mut c = start_c;
    while a < lim_a && b < lim_b {
        let src = if T::compare(&buf[a], &buf[b]) == Ordering::Less {
            let src = a;
            a += 1;
            src
        } else {
            let src = b;
            b += 1;
            src
        };
        let value = buf[src].clone();
        buf[c] = value;
        c += 1;
    }
    while a < lim_a {
        let value = buf[a].clone();
        buf[c] = value;
        c += 1;
        a += 1;
    }
    while b < lim_b {
        let value = buf[b].clone();
        buf[c] = value;
        c += 1;
        b += 1;
    }
}

/// Outcome of [`general_compress`].
pub(crate) struct CompressResult {
    pub num_levels: usize,
    pub capacity: usize,
    pub num_items: usize,
}

/// Rebalances a possibly over-full multi-level configuration into a valid
/// one, rearranging item data in place.
///
/// For each level, bottom up: a level that fits (or a sketch that is no
/// longer over-full) is carried over unchanged, never moving data upward.
/// Otherwise the level is compacted: an odd population leaves its lowest
/// element behind as a carry-over, level zero is sorted on demand, and the
/// remainder is halved up into an empty level above, or halved down and
/// merged into a nonempty one. Compacting the top level grows the sketch
/// by one level, which also raises the capacity target.
///
/// `in_levels` and `out_levels` must both have room for two entries past
/// the final number of levels. All levels except level zero must be sorted
/// on entry and remain sorted on return; level zero's sortedness matches
/// `is_level_zero_sorted`.
pub(crate) fn general_compress<T, R>(
    k: u16,
    num_levels_in: usize,
    items: &mut [T],
    in_levels: &mut [usize],
    out_levels: &mut [usize],
    is_level_zero_sorted: bool,
    rng: &mut R,
) -> CompressResult
where
    T: KllItem,
    R: RandomSource,
{
    debug_assert!(num_levels_in > 0);
    let mut current_num_levels = num_levels_in;
    // Shrinks with every compaction.
    let mut current_item_count = in_levels[num_levels_in] - in_levels[0];
    // Grows when a level is added.
    let mut target_item_count = compute_total_capacity(k, current_num_levels) as usize;
    out_levels[0] = 0;
    let mut level = 0;
    while level < current_num_levels {
        // At the current top level, pretend an empty level sits above it;
        // current_num_levels is only incremented if we compact into it.
        if level == current_num_levels - 1 {
            in_levels[level + 2] = in_levels[level + 1];
        }
        let raw_beg = in_levels[level];
        let raw_lim = in_levels[level + 1];
        let raw_pop = raw_lim - raw_beg;
        if current_item_count < target_item_count
            || raw_pop < level_capacity(k, current_num_levels, level) as usize
        {
            // Carry the level over unchanged. Data never moves upward here.
            debug_assert!(raw_beg >= out_levels[level]);
            let out_beg = out_levels[level];
            items[out_beg..raw_lim].rotate_left(raw_beg - out_beg);
            out_levels[level + 1] = out_beg + raw_pop;
        } else {
            // The sketch is over-full and so is this level: compact it.
            let pop_above = in_levels[level + 2] - raw_lim;
            let odd_pop = raw_pop % 2 == 1;
            let adj_beg = raw_beg + usize::from(odd_pop);
            let adj_pop = raw_pop - usize::from(odd_pop);
            let half_adj_pop = adj_pop / 2;

            if odd_pop {
                // The lowest element survives untouched as a carry-over.
                let orphan = items[raw_beg].clone();
                items[out_levels[level]] = orphan;
                out_levels[level + 1] = out_levels[level] + 1;
            } else {
                out_levels[level + 1] = out_levels[level];
            }

            if level == 0 && !is_level_zero_sorted {
                items[adj_beg..adj_beg + adj_pop].sort_by(T::compare);
            }

            if pop_above == 0 {
                // Survivors stay in place, ready to become the new
                // contents of the level above.
                randomly_halve_up(items, adj_beg, adj_pop, rng);
            } else {
                randomly_halve_down(items, adj_beg, adj_pop, rng);
                merge_overlap(
                    items,
                    adj_beg,
                    half_adj_pop,
                    raw_lim,
                    pop_above,
                    adj_beg + half_adj_pop,
                );
            }

            current_item_count -= half_adj_pop;
            // The lower boundary of the level above moves down over the
            // merged data.
            in_levels[level + 1] -= half_adj_pop;

            if level == current_num_levels - 1 {
                current_num_levels += 1;
                target_item_count += level_capacity(k, current_num_levels, 0) as usize;
            }
        }
        level += 1;
    }
    debug_assert_eq!(out_levels[current_num_levels] - out_levels[0], current_item_count);
    CompressResult {
        num_levels: current_num_levels,
        capacity: target_item_count,
        num_items: current_item_count,
    }
}
