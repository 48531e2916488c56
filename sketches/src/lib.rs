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

//! # Streaming Sketches
//!
//! Stochastic streaming algorithms for summarizing massive data with small,
//! mergeable state. The centerpiece is the [`kll`] module: a KLL quantile
//! sketch that estimates quantiles of an unbounded stream with bounded rank
//! error and sublinear memory.
//!
//! Sketches here are built for the parallel fan-out pattern: feed many
//! independent sketches from disjoint partitions of the input, then reduce
//! them into one with `merge`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub mod common;
pub mod error;
pub mod kll;
