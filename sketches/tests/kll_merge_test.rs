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

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sketches::error::ErrorKind;
use sketches::kll::DEFAULT_K;
use sketches::kll::KllSketch;

#[test]
fn test_merge_split_stream() {
    let mut low = KllSketch::<i64>::with_seed(200, 41);
    let mut high = KllSketch::<i64>::with_seed(200, 42);
    for i in 1..=500_000 {
        low.insert(i);
        high.insert(500_000 + i);
    }

    low.merge([&high]).unwrap();

    assert_eq!(low.total_count(), 1_000_000);
    assert_eq!(low.min_value(), Some(&1));
    assert_eq!(low.max_value(), Some(&1_000_000));
    let median = low.estimate_quantile(0.5).unwrap();
    assert!(
        (490_000..=510_000).contains(&median),
        "median {median}"
    );
}

#[test]
fn test_merge_incompatible_k() {
    let mut target = KllSketch::<i64>::with_seed(200, 1);
    let mut peer = KllSketch::<i64>::with_seed(128, 2);
    target.insert(1);
    peer.insert(2);

    let err = target.merge([&peer]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleParameters);
    // The failed merge must not have touched the target.
    assert_eq!(target.total_count(), 1);
    assert_eq!(target.max_value(), Some(&1));
}

#[test]
fn test_merge_incompatible_peer_rejected_before_any_work() {
    let mut target = KllSketch::<i64>::with_seed(200, 1);
    let mut compatible = KllSketch::<i64>::with_seed(200, 2);
    let mut incompatible = KllSketch::<i64>::with_seed(64, 3);
    for i in 0..1000 {
        target.insert(i);
        compatible.insert(1000 + i);
        incompatible.insert(2000 + i);
    }

    let before = target.clone();
    let err = target.merge([&compatible, &incompatible]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleParameters);
    assert_eq!(target, before);
}

#[test]
fn test_merge_empty_peer_is_noop() {
    let mut target = KllSketch::<i64>::with_seed(200, 5);
    for i in 0..10_000 {
        target.insert(i);
    }
    let empty = KllSketch::<i64>::with_seed(200, 6);

    let before = target.clone();
    target.merge([&empty]).unwrap();
    assert_eq!(target, before);
}

#[test]
fn test_merge_into_empty_target() {
    let mut target = KllSketch::<i64>::with_seed(200, 7);
    let mut peer = KllSketch::<i64>::with_seed(200, 8);
    for i in 1..=100_000 {
        peer.insert(i);
    }

    target.merge([&peer]).unwrap();

    assert_eq!(target.total_count(), 100_000);
    assert_eq!(target.estimate_quantile(0.0).unwrap(), 1);
    assert_eq!(target.estimate_quantile(1.0).unwrap(), 100_000);
    let median = target.estimate_quantile(0.5).unwrap();
    let tolerance = (3.0 * peer.normalized_rank_error() * 100_000.0) as i64;
    assert!((median - 50_000).abs() <= tolerance, "median {median}");
}

#[test]
fn test_merge_does_not_mutate_peers() {
    let mut target = KllSketch::<i64>::with_seed(200, 9);
    let mut peer = KllSketch::<i64>::with_seed(200, 10);
    for i in 0..50_000 {
        target.insert(i);
        peer.insert(50_000 + i);
    }

    let peer_before = peer.clone();
    target.merge([&peer]).unwrap();
    assert_eq!(peer, peer_before);
}

#[test]
fn test_merge_matches_direct_insertion() {
    // Fan-out then merge must be statistically indistinguishable from
    // feeding one sketch directly.
    let n = 30_000i64;
    let mut direct = KllSketch::<i64>::with_seed(200, 11);
    let mut parts = [
        KllSketch::<i64>::with_seed(200, 12),
        KllSketch::<i64>::with_seed(200, 13),
        KllSketch::<i64>::with_seed(200, 14),
    ];
    let mut rng = StdRng::seed_from_u64(15);
    for i in 0..n {
        let value = rng.random_range(0..n);
        direct.insert(value);
        parts[(i % 3) as usize].insert(value);
    }

    let mut merged = KllSketch::<i64>::with_seed(200, 16);
    merged.merge(&parts).unwrap();
    assert_eq!(merged.total_count(), direct.total_count());

    let tolerance = (3.0 * direct.normalized_rank_error() * n as f64) as i64;
    for q in [0.1, 0.25, 0.5, 0.75, 0.9] {
        let from_merged = merged.estimate_quantile(q).unwrap();
        let from_direct = direct.estimate_quantile(q).unwrap();
        let expected = (q * n as f64) as i64;
        assert!(
            (from_merged - expected).abs() <= tolerance,
            "q {q}: merged {from_merged} vs expected {expected}"
        );
        assert!(
            (from_direct - expected).abs() <= tolerance,
            "q {q}: direct {from_direct} vs expected {expected}"
        );
    }
}

#[test]
fn test_merge_many_small_peers() {
    let mut target = KllSketch::<i64>::with_seed(DEFAULT_K, 20);
    let peers: Vec<KllSketch<i64>> = (0..10)
        .map(|part| {
            let mut sketch = KllSketch::<i64>::with_seed(DEFAULT_K, 21 + part);
            for i in 0..1000 {
                sketch.insert(part as i64 * 1000 + i);
            }
            sketch
        })
        .collect();

    target.merge(&peers).unwrap();

    assert_eq!(target.total_count(), 10_000);
    assert_eq!(target.estimate_quantile(0.0).unwrap(), 0);
    assert_eq!(target.estimate_quantile(1.0).unwrap(), 9999);
}

#[test]
fn test_repeated_merges_accumulate() {
    let mut target = KllSketch::<i64>::with_seed(200, 30);
    let mut total = 0u64;
    for round in 0..20 {
        let mut peer = KllSketch::<i64>::with_seed(200, 31 + round);
        for i in 0..5000 {
            peer.insert(round as i64 * 5000 + i);
        }
        target.merge([&peer]).unwrap();
        total += 5000;
        assert_eq!(target.total_count(), total);
    }
    assert_eq!(target.estimate_quantile(0.0).unwrap(), 0);
    assert_eq!(target.estimate_quantile(1.0).unwrap(), 99_999);
}
