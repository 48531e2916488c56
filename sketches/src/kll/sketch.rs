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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::DEFAULT_K;
use super::MAX_K;
use super::MIN_K;
use super::compaction::general_compress;
use super::compaction::merge_overlap;
use super::compaction::randomly_halve_down;
use super::compaction::randomly_halve_up;
use super::helper::floor_log2;
use super::helper::level_capacity;
use super::helper::sum_sample_weights;
use crate::common::XorShift64;
use crate::error::Error;
use crate::error::ErrorKind;

const RANK_ERROR_COEFFICIENT: f64 = 2.296;
const RANK_ERROR_EXPONENT: f64 = 0.9723;

/// Trait implemented by item types supported by [`KllSketch`].
///
/// `compare` must define a total order; it is the comparator the sketch is
/// parameterized by, so two sketches are merge-compatible exactly when they
/// share the same item type. `Default` supplies placeholder values for the
/// dead slots of the backing buffer; those values are never observed.
pub trait KllItem: Clone + Default {
    /// Compare two items.
    fn compare(a: &Self, b: &Self) -> Ordering;
}

/// KLL sketch for estimating quantiles of a stream.
///
/// Items live in one flat buffer split into levels by a boundary vector:
/// level `i` occupies `items[levels[i]..levels[i + 1])` and each of its
/// items represents `2^i` stream values. Free space sits at the low end of
/// the buffer, so level zero grows downward and compaction opens new slots
/// by shifting the levels below it upward.
///
/// See the [kll module level documentation](crate::kll) for more.
#[derive(Debug, Clone, PartialEq)]
pub struct KllSketch<T: KllItem> {
    k: u16,
    n: u64,
    min_value: Option<T>,
    max_value: Option<T>,
    items: Vec<T>,
    levels: Vec<usize>,
    is_level_zero_sorted: bool,
    random_bit: XorShift64,
}

impl<T: KllItem> Default for KllSketch<T> {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl<T: KllItem> KllSketch<T> {
    /// Creates a new sketch with the given value of k and a seed derived
    /// from the environment.
    ///
    /// # Panics
    ///
    /// Panics if k is not in [MIN_K, MAX_K].
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches::kll::KllSketch;
    /// let sketch = KllSketch::<f64>::new(200);
    /// assert_eq!(sketch.k(), 200);
    /// ```
    pub fn new(k: u16) -> Self {
        Self::make(k, XorShift64::default())
    }

    /// Creates a new sketch with the given value of k and an explicit seed
    /// for the compaction bit source.
    ///
    /// Two sketches built with the same k and seed and fed the same values
    /// in the same order end up with identical state.
    ///
    /// # Panics
    ///
    /// Panics if k is not in [MIN_K, MAX_K].
    pub fn with_seed(k: u16, seed: u64) -> Self {
        Self::make(k, XorShift64::seeded(seed))
    }

    fn make(k: u16, random_bit: XorShift64) -> Self {
        assert!(
            (MIN_K..=MAX_K).contains(&k),
            "k must be in [{MIN_K}, {MAX_K}], got {k}"
        );
        Self {
            k,
            n: 0,
            min_value: None,
            max_value: None,
            items: vec![T::default(); k as usize],
            levels: vec![k as usize; 2],
            is_level_zero_sorted: false,
            random_bit,
        }
    }

    /// Returns parameter k used to configure this sketch.
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Returns the total number of values the sketch has seen, including
    /// values folded in by merges.
    pub fn total_count(&self) -> u64 {
        self.n
    }

    /// Returns true if the sketch has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Returns the number of retained items.
    pub fn num_retained(&self) -> usize {
        self.items.len() - self.levels[0]
    }

    /// Returns true if the sketch has started compacting, i.e. quantile
    /// answers are approximate rather than exact.
    pub fn is_estimation_mode(&self) -> bool {
        self.num_levels() > 1
    }

    /// Returns the smallest value seen by the sketch.
    pub fn min_value(&self) -> Option<&T> {
        self.min_value.as_ref()
    }

    /// Returns the largest value seen by the sketch.
    pub fn max_value(&self) -> Option<&T> {
        self.max_value.as_ref()
    }

    /// Returns the a-priori normalized rank error for the configured k.
    pub fn normalized_rank_error(&self) -> f64 {
        RANK_ERROR_COEFFICIENT / (self.k as f64).powf(RANK_ERROR_EXPONENT)
    }

    /// Inserts a value into the sketch.
    pub fn insert(&mut self, value: T) {
        self.update_min_max(&value);
        let position = self.insert_position();
        self.items[position] = value;
        self.check_invariants();
    }

    /// Merges a sequence of peer sketches into this one.
    ///
    /// Peers must share this sketch's k; the comparator is already shared
    /// through the item type. Merging does not consume the peers, and the
    /// result answers quantile queries over the combined stream.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches::kll::KllSketch;
    /// let mut left = KllSketch::<i64>::with_seed(200, 1);
    /// let mut right = KllSketch::<i64>::with_seed(200, 2);
    /// for i in 0..500 {
    ///     left.insert(i);
    ///     right.insert(500 + i);
    /// }
    /// left.merge([&right]).unwrap();
    /// assert_eq!(left.total_count(), 1000);
    /// ```
    pub fn merge<'a, I>(&mut self, others: I) -> Result<(), Error>
    where
        T: 'a,
        I: IntoIterator<Item = &'a KllSketch<T>>,
    {
        let others: Vec<&KllSketch<T>> = others.into_iter().collect();
        for other in &others {
            if other.k != self.k {
                return Err(Error::new(
                    ErrorKind::IncompatibleParameters,
                    "cannot merge sketches with different values of k",
                )
                .with_context("k", self.k)
                .with_context("other_k", other.k));
            }
        }

        let mut new_n = self.n;
        for other in &others {
            if other.n == 0 {
                continue;
            }
            self.update_min_max_from(other);
            new_n += other.n;
        }
        if new_n == self.n {
            return Ok(());
        }

        // Level-zero residues of every peer enter through the regular
        // insert path; this is the only way they get into this sketch.
        for other in &others {
            for j in other.levels[0]..other.levels[1] {
                let position = self.insert_position();
                self.items[position] = other.items[j].clone();
            }
        }

        let mut tmp_num_items = self.num_retained();
        let mut provisional_num_levels = self.num_levels();
        for other in &others {
            if other.num_levels() >= 2 {
                tmp_num_items += other.levels[other.num_levels()] - other.levels[1];
                provisional_num_levels = provisional_num_levels.max(other.num_levels());
            }
        }

        if tmp_num_items > self.num_retained() {
            let mut workbuf = vec![T::default(); tmp_num_items];
            let ub = 1 + floor_log2(new_n, 1) as usize;
            let work_levels_size = ub + 2;
            let mut worklevels = vec![0usize; work_levels_size];
            let mut outlevels = vec![0usize; work_levels_size];

            let bottom = self.safe_level_size(0);
            workbuf[..bottom].clone_from_slice(&self.items[self.levels[0]..self.levels[1]]);
            worklevels[1] = bottom;

            // Levels above zero are sorted in every sketch, so a k-way
            // merge over the per-sketch runs keeps them sorted.
            for level in 1..provisional_num_levels {
                let mut heap = BinaryHeap::new();
                let size = self.safe_level_size(level);
                if size > 0 {
                    let begin = self.levels[level];
                    heap.push(Run(&self.items[begin..begin + size]));
                }
                for other in &others {
                    let size = other.safe_level_size(level);
                    if size > 0 {
                        let begin = other.levels[level];
                        heap.push(Run(&other.items[begin..begin + size]));
                    }
                }
                let mut out = worklevels[level];
                while let Some(Run(run)) = heap.pop() {
                    workbuf[out] = run[0].clone();
                    out += 1;
                    if run.len() > 1 {
                        heap.push(Run(&run[1..]));
                    }
                }
                worklevels[level + 1] = out;
            }

            let result = general_compress(
                self.k,
                provisional_num_levels,
                &mut workbuf,
                &mut worklevels,
                &mut outlevels,
                self.is_level_zero_sorted,
                &mut self.random_bit,
            );
            debug_assert!(result.num_levels <= ub);

            // Transfer the compressed configuration back, leaving the free
            // space at the low end of the buffer.
            self.items.resize(result.capacity, T::default());
            let free_space_at_bottom = result.capacity - result.num_items;
            self.items[free_space_at_bottom..free_space_at_bottom + result.num_items]
                .clone_from_slice(&workbuf[outlevels[0]..outlevels[0] + result.num_items]);
            self.levels.resize(result.num_levels + 1, 0);
            let offset = free_space_at_bottom - outlevels[0];
            for (level, boundary) in self.levels.iter_mut().enumerate() {
                *boundary = outlevels[level] + offset;
            }
        }

        self.n = new_n;
        self.check_invariants();
        Ok(())
    }

    /// Returns the approximate value at the given quantile fraction.
    ///
    /// Fraction 0.0 returns the exact minimum and 1.0 the exact maximum.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches::kll::KllSketch;
    /// let mut sketch = KllSketch::<i64>::with_seed(200, 7);
    /// for i in 1..=100 {
    ///     sketch.insert(i);
    /// }
    /// let median = sketch.estimate_quantile(0.5).unwrap();
    /// assert!((40..=60).contains(&median));
    /// ```
    pub fn estimate_quantile(&mut self, fraction: f64) -> Result<T, Error> {
        let values = self.estimate_quantiles(std::slice::from_ref(&fraction))?;
        debug_assert_eq!(values.len(), 1);
        match values.into_iter().next() {
            Some(value) => Ok(value),
            None => Err(Error::new(
                ErrorKind::EmptySketch,
                "quantile estimation produced no value",
            )),
        }
    }

    /// Returns the approximate values at the given quantile fractions.
    ///
    /// Sorts level zero in place if it is not sorted already, which is why
    /// this takes `&mut self`.
    pub fn estimate_quantiles(&mut self, fractions: &[f64]) -> Result<Vec<T>, Error> {
        let (min_value, max_value) = match (self.min_value.clone(), self.max_value.clone()) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                return Err(Error::new(
                    ErrorKind::EmptySketch,
                    "cannot estimate quantiles of an empty sketch",
                ));
            }
        };
        for &fraction in fractions {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(Error::new(
                    ErrorKind::InvalidFraction,
                    "quantile fraction must be in [0.0, 1.0]",
                )
                .with_context("fraction", fraction));
            }
        }

        if !self.is_level_zero_sorted {
            let bottom = self.levels[0];
            let top = self.levels[1];
            self.items[bottom..top].sort_by(T::compare);
            self.is_level_zero_sorted = true;
        }

        // One entry per retained item, weighted by its level.
        let mut entries: Vec<(T, u64)> = Vec::with_capacity(self.num_retained());
        for level in 0..self.num_levels() {
            let weight = 1u64 << level;
            for i in self.levels[level]..self.levels[level + 1] {
                entries.push((self.items[i].clone(), weight));
            }
        }
        entries.sort_by(|x, y| T::compare(&x.0, &y.0));

        // Rewrite each weight to the cumulative weight strictly below the
        // entry, so quantile lookup is a lower bound on the prefix weight.
        let mut total_weight = 0u64;
        for entry in &mut entries {
            let weight = entry.1;
            entry.1 = total_weight;
            total_weight += weight;
        }

        let mut out = Vec::with_capacity(fractions.len());
        for &fraction in fractions {
            if fraction == 0.0 {
                out.push(min_value.clone());
            } else if fraction == 1.0 {
                out.push(max_value.clone());
            } else {
                let max_weight = (fraction * total_weight as f64) as u64;
                let index = entries.partition_point(|entry| entry.1 < max_weight);
                match entries.get(index).or_else(|| entries.last()) {
                    Some((value, _)) => out.push(value.clone()),
                    None => {
                        return Err(Error::new(
                            ErrorKind::EmptySketch,
                            "sketch retains no items",
                        ));
                    }
                }
            }
        }
        Ok(out)
    }

    fn num_levels(&self) -> usize {
        self.levels.len() - 1
    }

    fn safe_level_size(&self, level: usize) -> usize {
        if level >= self.num_levels() {
            return 0;
        }
        self.levels[level + 1] - self.levels[level]
    }

    fn update_min_max(&mut self, value: &T) {
        match (&self.min_value, &self.max_value) {
            (Some(min), Some(max)) => {
                if T::compare(value, min) == Ordering::Less {
                    self.min_value = Some(value.clone());
                }
                if T::compare(max, value) == Ordering::Less {
                    self.max_value = Some(value.clone());
                }
            }
            _ => {
                self.min_value = Some(value.clone());
                self.max_value = Some(value.clone());
            }
        }
    }

    fn update_min_max_from(&mut self, other: &KllSketch<T>) {
        match (&self.min_value, &self.max_value) {
            (Some(min), Some(max)) => {
                if let Some(other_min) = &other.min_value {
                    if T::compare(other_min, min) == Ordering::Less {
                        self.min_value = Some(other_min.clone());
                    }
                }
                if let Some(other_max) = &other.max_value {
                    if T::compare(max, other_max) == Ordering::Less {
                        self.max_value = Some(other_max.clone());
                    }
                }
            }
            _ => {
                self.min_value = other.min_value.clone();
                self.max_value = other.max_value.clone();
            }
        }
    }

    /// Reserves one slot at the low end of level zero and returns its
    /// index, compacting first if level zero has no free slot.
    fn insert_position(&mut self) -> usize {
        if self.levels[0] == 0 {
            self.compress_while_updating();
        }
        self.n += 1;
        self.is_level_zero_sorted = false;
        self.levels[0] -= 1;
        self.levels[0]
    }

    /// In-place compaction of a single over-full level, opening free slots
    /// at the low end of level zero.
    fn compress_while_updating(&mut self) {
        let level = self.find_level_to_compact();

        // Growing must happen before the boundaries below are read: it
        // resizes the buffer and shifts both the data and the boundaries.
        if level == self.num_levels() - 1 {
            self.add_empty_top_level();
        }

        let raw_beg = self.levels[level];
        let raw_lim = self.levels[level + 1];
        // +2 is in bounds because the top level was just added if needed.
        let pop_above = self.levels[level + 2] - raw_lim;
        let raw_pop = raw_lim - raw_beg;
        let odd_pop = raw_pop % 2 == 1;
        let adj_beg = raw_beg + usize::from(odd_pop);
        let adj_pop = raw_pop - usize::from(odd_pop);
        let half_adj_pop = adj_pop / 2;

        if level == 0 && !self.is_level_zero_sorted {
            self.items[adj_beg..adj_beg + adj_pop].sort_by(T::compare);
        }
        if pop_above == 0 {
            randomly_halve_up(&mut self.items, adj_beg, adj_pop, &mut self.random_bit);
        } else {
            randomly_halve_down(&mut self.items, adj_beg, adj_pop, &mut self.random_bit);
            merge_overlap(
                &mut self.items,
                adj_beg,
                half_adj_pop,
                raw_lim,
                pop_above,
                adj_beg + half_adj_pop,
            );
        }
        // The lower boundary of the level above moves down over the
        // promoted data.
        self.levels[level + 1] -= half_adj_pop;
        if odd_pop {
            // The compacted level keeps exactly one item: the orphan that
            // sat at its low end.
            self.levels[level] = self.levels[level + 1] - 1;
            if self.levels[level] != raw_beg {
                let orphan = self.items[raw_beg].clone();
                self.items[self.levels[level]] = orphan;
            }
        } else {
            self.levels[level] = self.levels[level + 1];
        }
        debug_assert_eq!(self.levels[level], raw_beg + half_adj_pop);

        // Shift the data below the compacted level upward so the freed
        // slots end up at the low end of level zero.
        if level > 0 {
            let bottom = self.levels[0];
            self.items[bottom..raw_beg + half_adj_pop].rotate_right(half_adj_pop);
            for lvl in 0..level {
                self.levels[lvl] += half_adj_pop;
            }
        }
    }

    /// Returns the lowest level at or over its capacity. The caller only
    /// invokes this on a sketch with no free space, so a level must
    /// qualify before the scan runs off the top.
    fn find_level_to_compact(&self) -> usize {
        let num_levels = self.num_levels();
        for level in 0..num_levels {
            let pop = self.levels[level + 1] - self.levels[level];
            let cap = level_capacity(self.k, num_levels, level) as usize;
            if pop >= cap {
                return level;
            }
        }
        panic!("no level to compact");
    }

    /// Grows a completely full sketch by one level: the buffer grows by the
    /// capacity of the new bottom level, existing contents move to the new
    /// high end, and every boundary is rebased.
    fn add_empty_top_level(&mut self) {
        let cur_total_cap = self.levels[self.num_levels()];
        debug_assert_eq!(self.levels[0], 0);
        debug_assert_eq!(self.items.len(), cur_total_cap);

        let delta_cap = level_capacity(self.k, self.num_levels() + 1, 0) as usize;
        let new_total_cap = cur_total_cap + delta_cap;
        self.items.resize(new_total_cap, T::default());
        self.items.rotate_right(delta_cap);

        // This rebase includes the old "extra" boundary at the top.
        for boundary in self.levels.iter_mut() {
            *boundary += delta_cap;
        }
        debug_assert_eq!(self.levels[self.num_levels()], new_total_cap);
        self.levels.push(new_total_cap);
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.levels[self.num_levels()], self.items.len());
        debug_assert!(self.levels.windows(2).all(|pair| pair[0] <= pair[1]));
        debug_assert_eq!(sum_sample_weights(self.num_levels(), &self.levels), self.n);
    }
}

/// Returns a value of k whose a-priori normalized rank error is closest to
/// `epsilon`, clamped to [MIN_K, MAX_K].
///
/// # Panics
///
/// Panics if epsilon is not in (0, 1).
pub fn k_from_epsilon(epsilon: f64) -> u16 {
    assert!(
        epsilon > 0.0 && epsilon < 1.0,
        "epsilon must be in (0, 1), got {epsilon}"
    );
    let k = (RANK_ERROR_COEFFICIENT / epsilon).powf(1.0 / RANK_ERROR_EXPONENT);
    k.round().clamp(MIN_K as f64, MAX_K as f64) as u16
}

/// Sorted run feeding the k-way merge; ordered by its head, reversed so the
/// smallest head pops first from a max-heap. Runs are never empty.
struct Run<'a, T: KllItem>(&'a [T]);

impl<T: KllItem> PartialEq for Run<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        T::compare(&self.0[0], &other.0[0]) == Ordering::Equal
    }
}

impl<T: KllItem> Eq for Run<'_, T> {}

impl<T: KllItem> PartialOrd for Run<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: KllItem> Ord for Run<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        T::compare(&other.0[0], &self.0[0])
    }
}

impl KllItem for f32 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.total_cmp(b)
    }
}

impl KllItem for f64 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.total_cmp(b)
    }
}

impl KllItem for i32 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl KllItem for i64 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl KllItem for u32 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl KllItem for u64 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl KllItem for String {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}
