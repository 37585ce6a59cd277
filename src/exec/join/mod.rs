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
//! In-memory hash join: build/probe engine, strategy dispatch, asof index,
//! cross-join streaming and the non-joined scan.

pub mod asof;
pub mod cross;
pub mod descriptor;
pub mod dict;
pub mod engine;
pub mod error;
pub mod method;
pub mod not_joined;
pub mod row_refs;
pub mod used_flags;

pub(crate) mod probe;
pub(crate) mod table;

pub use asof::AsofInequality;
pub use cross::CrossJoinContinuation;
pub use descriptor::{JoinDescriptor, JoinKind, JoinStrictness, OverflowMode, SizeLimits};
pub use dict::{DictionaryLookup, DictionaryReader};
pub use engine::HashJoin;
pub use error::{JoinError, JoinErrorKind, JoinResult};
pub use method::JoinMethod;
pub use not_joined::NotJoinedReader;
pub use row_refs::RowRef;
