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

//! KLL sketch for estimating quantiles of a stream.
//!
//! KLL (Karnin-Lang-Liberty) is a compact, mergeable quantiles sketch with
//! lazy randomized compaction and provable rank-error bounds. Memory is
//! `O(k * log(n / k))` and rank error scales as `O(1 / k)`.
//!
//! Items are kept in a single flat buffer divided into levels: an item at
//! level `i` stands for `2^i` values of the original stream. Inserts land
//! in level zero; when the buffer fills up, the lowest full level is
//! randomly halved and its survivors are promoted one level up.
//!
//! Sketches fed from disjoint partitions of a stream can be merged, and the
//! merged sketch answers quantile queries over the combined stream.
//!
//! # Usage
//!
//! ```rust
//! # use sketches::kll::KllSketch;
//! let mut sketch = KllSketch::<f64>::with_seed(200, 42);
//! for i in 0..1000 {
//!     sketch.insert(i as f64);
//! }
//! let median = sketch.estimate_quantile(0.5).unwrap();
//! assert!(median > 400.0 && median < 600.0);
//! ```

mod compaction;
mod helper;
mod sketch;

pub use self::sketch::k_from_epsilon;
pub use self::sketch::KllItem;
pub use self::sketch::KllSketch;

/// Default value of parameter k.
pub const DEFAULT_K: u16 = 200;
/// Minimum value of parameter k. Also the smallest capacity a level can have.
pub const MIN_K: u16 = 8;
/// Maximum value of parameter k.
pub const MAX_K: u16 = u16::MAX;
