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
use arrow::array::ArrayRef;

use crate::exec::chunk::Chunk;
use crate::exec::join::error::JoinResult;

/// Attribute rows read from an external dictionary for one probe key column.
///
/// `chunk` must follow the join's columns-to-add layout; `found[i]` tells
/// whether probe row `i` hit a dictionary key, and `positions[i]` is its row
/// in `chunk` when it did.
pub struct DictionaryLookup {
    pub chunk: Chunk,
    pub found: Vec<bool>,
    pub positions: Vec<u32>,
}

/// External dictionary access used as an alternative probe source: the probe
/// contract stays the same, only key lookup is delegated.
pub trait DictionaryReader: Send + Sync {
    fn read_keys(&self, keys: &ArrayRef) -> JoinResult<DictionaryLookup>;
}
