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
//! In-memory hash-join engine for a columnar analytical database.
//!
//! Right-side chunks are hashed into a method-dispatched table
//! ([`exec::join::HashJoin::add_block`]); left-side chunks are then probed
//! concurrently ([`exec::join::HashJoin::join_block`]), with a post-probe
//! scan emitting unmatched right rows for RIGHT/FULL output.

pub mod common;
pub mod exec;
pub mod runtime;

pub use common::config as chunkjoin_config;
pub use common::logging as chunkjoin_logging;

pub use exec::chunk::Chunk;
pub use exec::join::{
    AsofInequality, CrossJoinContinuation, DictionaryLookup, DictionaryReader, HashJoin,
    JoinDescriptor, JoinError, JoinErrorKind, JoinKind, JoinMethod, JoinResult, JoinStrictness,
    NotJoinedReader, OverflowMode, RowRef, SizeLimits,
};
