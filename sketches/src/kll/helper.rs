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

//! Level geometry: pure capacity arithmetic shared by the sketch and the
//! compaction engine.
//!
//! Level capacities follow a geometric schedule `k * (2/3)^depth` floored
//! at [`MIN_K`], where depth is counted down from the top level. The
//! schedule is evaluated in exact integer arithmetic (powers of three) so
//! results are deterministic and free of floating-point drift.

use super::MIN_K;

const POWERS_OF_THREE: [u64; 31] = [
    1,
    3,
    9,
    27,
    81,
    243,
    729,
    2187,
    6561,
    19683,
    59049,
    177147,
    531441,
    1594323,
    4782969,
    14348907,
    43046721,
    129140163,
    387420489,
    1162261467,
    3486784401,
    10460353203,
    31381059609,
    94143178827,
    282429536481,
    847288609443,
    2541865828329,
    7625597484987,
    22876792454961,
    68630377364883,
    205891132094649,
];

/// Sum of level capacities across `height` in `[0, num_levels)`.
pub fn compute_total_capacity(k: u16, num_levels: usize) -> u32 {
    let mut total: u32 = 0;
    for height in 0..num_levels {
        total += level_capacity(k, num_levels, height);
    }
    total
}

/// Capacity of the level at `height` in a sketch that currently has
/// `num_levels` levels. The top level carries the full `k`; capacity decays
/// by a factor of 2/3 per level going down, floored at [`MIN_K`].
pub fn level_capacity(k: u16, num_levels: usize, height: usize) -> u32 {
    assert!(height < num_levels, "height must be < num_levels");
    let depth = num_levels - height - 1;
    std::cmp::max(MIN_K as u32, depth_capacity(k, depth as u8) as u32)
}

// Nearest integer to k * (2/3)^depth. Split the exponent above 30 so the
// intermediate products stay within u64.
fn depth_capacity(k: u16, depth: u8) -> u16 {
    assert!(depth <= 60, "depth must be <= 60");
    if depth <= 30 {
        return depth_capacity_exact(k, depth);
    }
    let half = depth / 2;
    let rest = depth - half;
    let tmp = depth_capacity_exact(k, half);
    depth_capacity_exact(tmp, rest)
}

fn depth_capacity_exact(k: u16, depth: u8) -> u16 {
    assert!(depth <= 30, "depth must be <= 30");
    let twok = (k as u64) << 1;
    let tmp = (twok << depth) / POWERS_OF_THREE[depth as usize];
    let result = (tmp + 1) >> 1;
    debug_assert!(result <= k as u64, "capacity result exceeds k");
    result as u16
}

/// Effective stream weight described by a boundary array: the population of
/// level `i` counts with weight `2^i`.
pub fn sum_sample_weights(num_levels: usize, levels: &[usize]) -> u64 {
    let mut total = 0u64;
    let mut weight = 1u64;
    for level in 0..num_levels {
        total += weight * (levels[level + 1] - levels[level]) as u64;
        weight <<= 1;
    }
    total
}

/// Returns `floor(log2(p / q))`. Requires `p >= q > 0`.
pub fn floor_log2(p: u64, q: u64) -> u32 {
    debug_assert!(q > 0 && p >= q);
    (p / q).ilog2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_level_capacity_is_k() {
        assert_eq!(level_capacity(200, 1, 0), 200);
        assert_eq!(level_capacity(8, 1, 0), 8);
    }

    #[test]
    fn test_capacity_shrinks_with_depth() {
        let num_levels = 10;
        for height in 0..num_levels - 1 {
            assert!(
                level_capacity(200, num_levels, height)
                    <= level_capacity(200, num_levels, height + 1)
            );
        }
        // The top level carries the full k; the bottom floors at MIN_K.
        assert_eq!(level_capacity(200, num_levels, num_levels - 1), 200);
        assert_eq!(level_capacity(200, num_levels, 0), MIN_K as u32);
    }

    #[test]
    fn test_capacity_floors_at_min_k() {
        // Deep enough that the geometric schedule would drop below MIN_K.
        for num_levels in 20..40 {
            assert_eq!(level_capacity(200, num_levels, 0), MIN_K as u32);
        }
    }

    #[test]
    fn test_two_thirds_schedule() {
        // depth 1: 200 * 2/3 = 133.3 -> 133, depth 2: 88.9 -> 89.
        assert_eq!(level_capacity(200, 2, 0), 133);
        assert_eq!(level_capacity(200, 3, 0), 89);
    }

    #[test]
    fn test_total_capacity_is_sum_of_levels() {
        for num_levels in 1..12 {
            let total: u32 = (0..num_levels)
                .map(|height| level_capacity(200, num_levels, height))
                .sum();
            assert_eq!(compute_total_capacity(200, num_levels), total);
        }
    }

    #[test]
    fn test_deep_capacity_split_matches_schedule() {
        // Depths above 30 go through the split path and must stay monotone.
        for depth in 31..=60u8 {
            assert!(depth_capacity(u16::MAX, depth) <= depth_capacity(u16::MAX, depth - 1));
        }
    }

    #[test]
    fn test_sum_sample_weights() {
        // Levels: pop 3 at weight 1, pop 2 at weight 2, pop 1 at weight 4.
        let levels = [0usize, 3, 5, 6];
        assert_eq!(sum_sample_weights(3, &levels), 3 + 4 + 4);
        assert_eq!(sum_sample_weights(1, &[5, 9]), 4);
        assert_eq!(sum_sample_weights(1, &[9, 9]), 0);
    }

    #[test]
    fn test_floor_log2() {
        assert_eq!(floor_log2(1, 1), 0);
        assert_eq!(floor_log2(2, 1), 1);
        assert_eq!(floor_log2(1023, 1), 9);
        assert_eq!(floor_log2(1024, 1), 10);
        assert_eq!(floor_log2(1_000_000, 1), 19);
        assert_eq!(floor_log2(12, 3), 2);
    }
}
