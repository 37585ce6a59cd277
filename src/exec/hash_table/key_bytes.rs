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
//! Byte storage behind string-shaped and serialized join keys.
//!
//! A join table keys its varlen entries by location, not by copy: keys whose
//! bytes already sit in a stored build chunk are referenced in place, while
//! keys without another stable home (serialized rows, string keys of layouts
//! that drop the key columns) are interned into a [`KeyHeap`].

const MIN_CHUNK: usize = 4 * 1024;

/// Location of one varlen key.
///
/// `Shared` points into an Arrow data buffer of a chunk the engine stores for
/// its whole lifetime, which bounds the validity of the reference. `Interned`
/// addresses the heap by chunk index; heap chunks are never reallocated, so
/// the location stays valid until the heap drops.
#[derive(Clone, Copy, Debug)]
pub(crate) enum KeyBytes {
    Shared { ptr: usize, len: usize },
    Interned { chunk: u32, offset: usize, len: usize },
}

impl KeyBytes {
    pub(crate) fn shared(bytes: &[u8]) -> Self {
        Self::Shared {
            ptr: bytes.as_ptr() as usize,
            len: bytes.len(),
        }
    }

    pub(crate) fn resolve<'a>(&self, heap: &'a KeyHeap) -> &'a [u8] {
        match self {
            Self::Shared { ptr, len } => unsafe {
                std::slice::from_raw_parts(*ptr as *const u8, *len)
            },
            Self::Interned { chunk, offset, len } => {
                &heap.chunks[*chunk as usize][*offset..*offset + *len]
            }
        }
    }
}

/// Append-only bump storage for interned key bytes. Chunks grow
/// geometrically and are never moved or freed before the heap drops.
pub(crate) struct KeyHeap {
    chunks: Vec<Box<[u8]>>,
    used: usize,
    reserved: usize,
}

impl KeyHeap {
    pub(crate) fn new() -> Self {
        Self {
            chunks: Vec::new(),
            used: 0,
            reserved: 0,
        }
    }

    pub(crate) fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    pub(crate) fn intern(&mut self, bytes: &[u8]) -> KeyBytes {
        let room = self
            .chunks
            .last()
            .map_or(0, |chunk| chunk.len() - self.used);
        if self.chunks.is_empty() || bytes.len() > room {
            let grown = self
                .chunks
                .last()
                .map_or(MIN_CHUNK, |chunk| chunk.len().saturating_mul(2))
                .clamp(MIN_CHUNK, MIN_CHUNK * 256)
                .max(bytes.len());
            self.chunks.push(vec![0u8; grown].into_boxed_slice());
            self.used = 0;
            self.reserved += grown;
        }
        let chunk_index = self.chunks.len() - 1;
        let offset = self.used;
        self.used += bytes.len();
        self.chunks[chunk_index][offset..offset + bytes.len()].copy_from_slice(bytes);
        KeyBytes::Interned {
            chunk: chunk_index as u32,
            offset,
            len: bytes.len(),
        }
    }
}
