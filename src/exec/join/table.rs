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
//! Variant hash tables for join key indexing.
//!
//! Responsibilities:
//! - One table shape per key method, unified behind `PackedKey` emplace/find
//!   with stable slot offsets.
//! - Payload disciplines for ANY (single row), ALL (row chains) and ASOF
//!   (ordered per-key index) strictness families.
//!
//! Key exported interfaces:
//! - Types: `JoinHashTable`, `PackedKey`, `Payloads`, `MapsKind`.
//! - Functions: `pack_key`.

use std::hash::BuildHasher;

use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::raw::RawTable;

use crate::exec::hash_table::key_bytes::{KeyBytes, KeyHeap};
use crate::exec::hash_table::key_view::KeyColumnView;
use crate::exec::join::asof::{AsofIndex, AsofInequality, AsofType, AsofValue};
use crate::exec::join::error::{JoinError, JoinResult};
use crate::exec::join::method::JoinMethod;
use crate::exec::join::row_refs::{RowRef, RowRefArena, RowRefList, RowRefListIter};

#[derive(Clone, Copy)]
struct FixedEntry<K> {
    key: K,
    hash: u64,
    slot: u32,
}

pub(crate) struct FixedKeyMap<K> {
    table: RawTable<FixedEntry<K>>,
}

impl<K: Copy + PartialEq> FixedKeyMap<K> {
    fn new() -> Self {
        Self {
            table: RawTable::new(),
        }
    }

    fn emplace(&mut self, key: K, hash: u64, next_slot: u32) -> (u32, bool) {
        match self
            .table
            .find_or_find_insert_slot(hash, |entry| entry.key == key, |entry| entry.hash)
        {
            Ok(bucket) => (unsafe { bucket.as_ref().slot }, false),
            Err(insert_slot) => {
                let entry = FixedEntry {
                    key,
                    hash,
                    slot: next_slot,
                };
                unsafe {
                    self.table.insert_in_slot(hash, insert_slot, entry);
                }
                (next_slot, true)
            }
        }
    }

    fn find(&self, key: K, hash: u64) -> Option<u32> {
        self.table
            .get(hash, |entry| entry.key == key)
            .map(|entry| entry.slot)
    }

    fn allocated_bytes(&self) -> usize {
        self.table.capacity() * std::mem::size_of::<FixedEntry<K>>()
    }
}

struct BytesEntry {
    key: KeyBytes,
    hash: u64,
    slot: u32,
}

/// Table for string-shaped and serialized keys. Entries hold key locations,
/// either referencing a stored chunk buffer in place or interned in the
/// table's key heap; see [`KeyBytes`].
pub(crate) struct BytesKeyMap {
    table: RawTable<BytesEntry>,
}

impl BytesKeyMap {
    fn new() -> Self {
        Self {
            table: RawTable::new(),
        }
    }

    fn emplace(
        &mut self,
        bytes: &[u8],
        hash: u64,
        next_slot: u32,
        heap: &mut KeyHeap,
        copy: bool,
    ) -> (u32, bool) {
        let result = self.table.find_or_find_insert_slot(
            hash,
            |entry| entry.key.resolve(heap) == bytes,
            |entry| entry.hash,
        );
        match result {
            Ok(bucket) => (unsafe { bucket.as_ref().slot }, false),
            Err(insert_slot) => {
                let key = if copy {
                    heap.intern(bytes)
                } else {
                    KeyBytes::shared(bytes)
                };
                let entry = BytesEntry {
                    key,
                    hash,
                    slot: next_slot,
                };
                unsafe {
                    self.table.insert_in_slot(hash, insert_slot, entry);
                }
                (next_slot, true)
            }
        }
    }

    fn find(&self, bytes: &[u8], hash: u64, heap: &KeyHeap) -> Option<u32> {
        self.table
            .get(hash, |entry| entry.key.resolve(heap) == bytes)
            .map(|entry| entry.slot)
    }

    fn allocated_bytes(&self) -> usize {
        self.table.capacity() * std::mem::size_of::<BytesEntry>()
    }
}

/// One packed probe/build key, produced by [`pack_key`] for the table's
/// method.
pub(crate) enum PackedKey<'a> {
    Fixed8(u8),
    Fixed16(u16),
    Fixed32(u32),
    Fixed64(u64),
    Fixed128(u128),
    Fixed256([u8; 32]),
    /// String-shaped key borrowing the column's data buffer.
    Bytes(&'a [u8]),
    /// Serialized fallback key; always interned into the key heap on insert.
    Serialized(&'a [u8]),
}

impl PackedKey<'_> {
    /// Seeded hash of the packed key. Build and probe share the table's seed,
    /// so equal keys land in the same bucket across both phases.
    pub(crate) fn hash(&self, seed: u64) -> u64 {
        match self {
            Self::Fixed8(k) => mix_key_bits(seed, *k as u64),
            Self::Fixed16(k) => mix_key_bits(seed, *k as u64),
            Self::Fixed32(k) => mix_key_bits(seed, *k as u64),
            Self::Fixed64(k) => mix_key_bits(seed, *k),
            Self::Fixed128(k) => {
                let low = mix_key_bits(seed, *k as u64);
                mix_key_bits(low, (*k >> 64) as u64)
            }
            Self::Fixed256(k) => hash_key_bytes(seed, k),
            Self::Bytes(bytes) | Self::Serialized(bytes) => hash_key_bytes(seed, bytes),
        }
    }
}

/// Per-table random seed so distinct tables never share a hash schedule.
fn random_hash_seed() -> u64 {
    DefaultHashBuilder::default().hash_one(0x9e3779b97f4a7c15u64)
}

/// Murmur-style finalizer over the seeded key bits.
fn mix_key_bits(seed: u64, bits: u64) -> u64 {
    let mut mixed = seed ^ bits;
    mixed ^= mixed >> 33;
    mixed = mixed.wrapping_mul(0xff51afd7ed558ccd);
    mixed ^= mixed >> 33;
    mixed = mixed.wrapping_mul(0xc4ceb9fe1a85ec53);
    mixed ^ (mixed >> 33)
}

/// Word-at-a-time hash for byte-shaped keys. The length is mixed in first so
/// a zero-padded tail cannot collide with a shorter key.
fn hash_key_bytes(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = mix_key_bits(seed, bytes.len() as u64);
    for chunk in bytes.chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        hash = mix_key_bits(hash, u64::from_le_bytes(word));
    }
    hash
}

pub(crate) enum KeySpace {
    Empty,
    Cross,
    Dict,
    Key8(FixedKeyMap<u8>),
    Key16(FixedKeyMap<u16>),
    Key32(FixedKeyMap<u32>),
    Key64(FixedKeyMap<u64>),
    Keys128(FixedKeyMap<u128>),
    Keys256(FixedKeyMap<[u8; 32]>),
    KeyString(BytesKeyMap),
    KeyFixedString(BytesKeyMap),
    Hashed(BytesKeyMap),
}

impl KeySpace {
    fn for_method(method: JoinMethod) -> Self {
        match method {
            JoinMethod::Empty => Self::Empty,
            JoinMethod::Cross => Self::Cross,
            JoinMethod::Dict => Self::Dict,
            JoinMethod::Key8 => Self::Key8(FixedKeyMap::new()),
            JoinMethod::Key16 => Self::Key16(FixedKeyMap::new()),
            JoinMethod::Key32 => Self::Key32(FixedKeyMap::new()),
            JoinMethod::Key64 => Self::Key64(FixedKeyMap::new()),
            JoinMethod::Keys128 => Self::Keys128(FixedKeyMap::new()),
            JoinMethod::Keys256 => Self::Keys256(FixedKeyMap::new()),
            JoinMethod::KeyString => Self::KeyString(BytesKeyMap::new()),
            JoinMethod::KeyFixedString => Self::KeyFixedString(BytesKeyMap::new()),
            JoinMethod::Hashed => Self::Hashed(BytesKeyMap::new()),
        }
    }

    fn allocated_bytes(&self) -> usize {
        match self {
            Self::Empty | Self::Cross | Self::Dict => 0,
            Self::Key8(map) => map.allocated_bytes(),
            Self::Key16(map) => map.allocated_bytes(),
            Self::Key32(map) => map.allocated_bytes(),
            Self::Key64(map) => map.allocated_bytes(),
            Self::Keys128(map) => map.allocated_bytes(),
            Self::Keys256(map) => map.allocated_bytes(),
            Self::KeyString(map) | Self::KeyFixedString(map) | Self::Hashed(map) => {
                map.allocated_bytes()
            }
        }
    }
}

/// Payload shape: a single row, a row chain, or a per-key asof index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MapsKind {
    One,
    All,
    Asof,
}

pub(crate) enum Payloads {
    One(Vec<RowRef>),
    All(Vec<RowRefList>),
    Asof(Vec<AsofIndex>),
}

impl Payloads {
    fn len(&self) -> usize {
        match self {
            Self::One(rows) => rows.len(),
            Self::All(lists) => lists.len(),
            Self::Asof(indexes) => indexes.len(),
        }
    }

    fn allocated_bytes(&self) -> usize {
        match self {
            Self::One(rows) => rows.capacity() * std::mem::size_of::<RowRef>(),
            Self::All(lists) => lists.capacity() * std::mem::size_of::<RowRefList>(),
            Self::Asof(indexes) => indexes
                .iter()
                .map(|index| index.len() * (std::mem::size_of::<RowRef>() + 16))
                .sum(),
        }
    }
}

pub(crate) struct JoinHashTable {
    keys: KeySpace,
    payloads: Payloads,
    arena: RowRefArena,
    key_heap: KeyHeap,
    asof_type: Option<AsofType>,
    /// String keys borrow the stored chunk buffers unless the stored layout
    /// drops the key columns, in which case they are interned into the heap.
    copy_string_keys: bool,
    hash_seed: u64,
    total_rows: usize,
}

impl JoinHashTable {
    pub(crate) fn new(
        method: JoinMethod,
        maps: MapsKind,
        asof_type: Option<AsofType>,
        copy_string_keys: bool,
    ) -> Self {
        let payloads = match maps {
            MapsKind::One => Payloads::One(Vec::new()),
            MapsKind::All => Payloads::All(Vec::new()),
            MapsKind::Asof => Payloads::Asof(Vec::new()),
        };
        Self {
            keys: KeySpace::for_method(method),
            payloads,
            arena: RowRefArena::new(),
            key_heap: KeyHeap::new(),
            asof_type,
            copy_string_keys,
            hash_seed: random_hash_seed(),
            total_rows: 0,
        }
    }

    pub(crate) fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    /// Slot count; slots are stable offsets indexing the used-flags vector.
    pub(crate) fn buffer_size_in_cells(&self) -> usize {
        self.payloads.len()
    }

    pub(crate) fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.keys.allocated_bytes()
            + self.payloads.allocated_bytes()
            + self.arena.allocated_bytes()
            + self.key_heap.reserved_bytes()
    }

    pub(crate) fn payloads(&self) -> &Payloads {
        &self.payloads
    }

    pub(crate) fn arena(&self) -> &RowRefArena {
        &self.arena
    }

    /// Insert one build row under the packed key, applying the payload
    /// discipline of this table's maps kind.
    pub(crate) fn insert_row(
        &mut self,
        key: &PackedKey<'_>,
        hash: u64,
        row: RowRef,
        asof: Option<AsofValue>,
        any_take_last_row: bool,
    ) -> JoinResult<()> {
        let (slot, inserted) = self.emplace(key, hash)?;
        let slot = slot as usize;
        let Self {
            payloads,
            arena,
            asof_type,
            total_rows,
            ..
        } = self;
        match payloads {
            Payloads::One(rows) => {
                if inserted {
                    rows.push(row);
                    *total_rows += 1;
                } else if any_take_last_row {
                    rows[slot] = row;
                }
            }
            Payloads::All(lists) => {
                if inserted {
                    lists.push(RowRefList::new(row));
                } else {
                    let list = lists
                        .get_mut(slot)
                        .ok_or_else(|| JoinError::logic("row chain slot out of bounds"))?;
                    list.push(arena, row).map_err(JoinError::logic)?;
                }
                *total_rows += 1;
            }
            Payloads::Asof(indexes) => {
                if inserted {
                    let asof_type = asof_type
                        .ok_or_else(|| JoinError::logic("asof type not resolved at build"))?;
                    indexes.push(AsofIndex::new(asof_type));
                }
                let value =
                    asof.ok_or_else(|| JoinError::logic("asof value missing on insert"))?;
                let index = indexes
                    .get_mut(slot)
                    .ok_or_else(|| JoinError::logic("asof slot out of bounds"))?;
                index.insert(value, row).map_err(JoinError::logic)?;
                *total_rows += 1;
            }
        }
        Ok(())
    }

    fn emplace(&mut self, key: &PackedKey<'_>, hash: u64) -> JoinResult<(u32, bool)> {
        let next_slot = u32::try_from(self.payloads.len())
            .map_err(|_| JoinError::not_implemented("too many entries in join hash table"))?;
        let Self {
            keys,
            key_heap,
            copy_string_keys,
            ..
        } = self;
        let result = match (keys, key) {
            (KeySpace::Key8(map), PackedKey::Fixed8(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::Key16(map), PackedKey::Fixed16(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::Key32(map), PackedKey::Fixed32(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::Key64(map), PackedKey::Fixed64(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::Keys128(map), PackedKey::Fixed128(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::Keys256(map), PackedKey::Fixed256(k)) => map.emplace(*k, hash, next_slot),
            (KeySpace::KeyString(map), PackedKey::Bytes(bytes))
            | (KeySpace::KeyFixedString(map), PackedKey::Bytes(bytes)) => {
                map.emplace(bytes, hash, next_slot, key_heap, *copy_string_keys)
            }
            (KeySpace::Hashed(map), PackedKey::Serialized(bytes)) => {
                map.emplace(bytes, hash, next_slot, key_heap, true)
            }
            _ => {
                return Err(JoinError::logic(
                    "packed key representation does not match the table variant",
                ));
            }
        };
        Ok(result)
    }

    pub(crate) fn find_slot(&self, key: &PackedKey<'_>, hash: u64) -> JoinResult<Option<usize>> {
        let slot = match (&self.keys, key) {
            (KeySpace::Key8(map), PackedKey::Fixed8(k)) => map.find(*k, hash),
            (KeySpace::Key16(map), PackedKey::Fixed16(k)) => map.find(*k, hash),
            (KeySpace::Key32(map), PackedKey::Fixed32(k)) => map.find(*k, hash),
            (KeySpace::Key64(map), PackedKey::Fixed64(k)) => map.find(*k, hash),
            (KeySpace::Keys128(map), PackedKey::Fixed128(k)) => map.find(*k, hash),
            (KeySpace::Keys256(map), PackedKey::Fixed256(k)) => map.find(*k, hash),
            (KeySpace::KeyString(map), PackedKey::Bytes(bytes))
            | (KeySpace::KeyFixedString(map), PackedKey::Bytes(bytes)) => {
                map.find(bytes, hash, &self.key_heap)
            }
            (KeySpace::Hashed(map), PackedKey::Serialized(bytes)) => {
                map.find(bytes, hash, &self.key_heap)
            }
            (KeySpace::Empty | KeySpace::Cross | KeySpace::Dict, _) => {
                return Err(JoinError::unsupported_keys(
                    "table variant does not support key lookup",
                ));
            }
            _ => {
                return Err(JoinError::logic(
                    "packed key representation does not match the table variant",
                ));
            }
        };
        Ok(slot.map(|s| s as usize))
    }

    pub(crate) fn one_ref(&self, slot: usize) -> JoinResult<RowRef> {
        match &self.payloads {
            Payloads::One(rows) => rows
                .get(slot)
                .copied()
                .ok_or_else(|| JoinError::logic("payload slot out of bounds")),
            _ => Err(JoinError::logic("payload is not a single row")),
        }
    }

    pub(crate) fn list_rows(&self, slot: usize) -> JoinResult<RowRefListIter<'_>> {
        match &self.payloads {
            Payloads::All(lists) => lists
                .get(slot)
                .map(|list| list.iter(&self.arena))
                .ok_or_else(|| JoinError::logic("payload slot out of bounds")),
            _ => Err(JoinError::logic("payload is not a row chain")),
        }
    }

    pub(crate) fn asof_find(
        &self,
        slot: usize,
        inequality: AsofInequality,
        value: AsofValue,
    ) -> JoinResult<Option<RowRef>> {
        match &self.payloads {
            Payloads::Asof(indexes) => indexes
                .get(slot)
                .map(|index| index.find(inequality, value))
                .ok_or_else(|| JoinError::logic("payload slot out of bounds")),
            _ => Err(JoinError::logic("payload is not an asof index")),
        }
    }
}

/// Pack the key columns of one row into the method's representation.
/// `scratch` backs the serialized fallback and is clobbered per call.
pub(crate) fn pack_key<'a>(
    method: JoinMethod,
    views: &[KeyColumnView<'a>],
    row: usize,
    scratch: &'a mut Vec<u8>,
) -> JoinResult<PackedKey<'a>> {
    let key = match method {
        JoinMethod::Key8 | JoinMethod::Key16 | JoinMethod::Key32 | JoinMethod::Key64 => {
            let view = views
                .first()
                .ok_or_else(|| JoinError::logic("single numeric key view missing"))?;
            let bits = view.bits_u64(row).map_err(JoinError::logic)?;
            match method {
                JoinMethod::Key8 => PackedKey::Fixed8(bits as u8),
                JoinMethod::Key16 => PackedKey::Fixed16(bits as u16),
                JoinMethod::Key32 => PackedKey::Fixed32(bits as u32),
                _ => PackedKey::Fixed64(bits),
            }
        }
        JoinMethod::Keys128 => {
            scratch.clear();
            for view in views {
                view.write_fixed_le(row, scratch).map_err(JoinError::logic)?;
            }
            if scratch.len() > 16 {
                return Err(JoinError::logic("packed key exceeds 128 bits"));
            }
            let mut buf = [0u8; 16];
            buf[..scratch.len()].copy_from_slice(&scratch[..]);
            PackedKey::Fixed128(u128::from_le_bytes(buf))
        }
        JoinMethod::Keys256 => {
            scratch.clear();
            for view in views {
                view.write_fixed_le(row, scratch).map_err(JoinError::logic)?;
            }
            if scratch.len() > 32 {
                return Err(JoinError::logic("packed key exceeds 256 bits"));
            }
            let mut buf = [0u8; 32];
            buf[..scratch.len()].copy_from_slice(&scratch[..]);
            PackedKey::Fixed256(buf)
        }
        JoinMethod::KeyString | JoinMethod::KeyFixedString => {
            let view = views
                .first()
                .ok_or_else(|| JoinError::logic("string key view missing"))?;
            PackedKey::Bytes(view.bytes(row).map_err(JoinError::logic)?)
        }
        JoinMethod::Hashed => {
            scratch.clear();
            for view in views {
                view.serialize_value(row, scratch)
                    .map_err(JoinError::logic)?;
            }
            PackedKey::Serialized(&scratch[..])
        }
        JoinMethod::Empty | JoinMethod::Cross | JoinMethod::Dict => {
            return Err(JoinError::logic(format!(
                "method {} has no key representation",
                method.as_str()
            )));
        }
    };
    Ok(key)
}
