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
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-table-slot atomic used markers shared by concurrent probers and the
/// non-joined scanner.
///
/// Flags exist only for (kind, strictness) combinations that track unmatched
/// build rows; for the rest `get_used` is constant-true and `set_used` is a
/// no-op. Internally flag index = slot + 1; index 0 is the reserved sentinel
/// for the zero/null key storage.
pub(crate) struct UsedFlags {
    flags: Vec<AtomicBool>,
    need_flags: bool,
}

impl UsedFlags {
    pub(crate) fn new() -> Self {
        Self {
            flags: Vec::new(),
            need_flags: false,
        }
    }

    /// Grow to cover `cells` table slots. Only called between build and probe
    /// phases; already-set bits are preserved.
    pub(crate) fn reinit(&mut self, flagged: bool, cells: usize) {
        if !flagged {
            return;
        }
        self.need_flags = true;
        while self.flags.len() < cells + 1 {
            self.flags.push(AtomicBool::new(false));
        }
    }

    #[allow(dead_code)]
    pub(crate) fn get_used(&self, slot: usize) -> bool {
        if !self.need_flags {
            return true;
        }
        self.flags[slot + 1].load(Ordering::Acquire)
    }

    /// Version of `get_used` tolerating an absent flag vector.
    pub(crate) fn get_used_safe(&self, slot: usize) -> bool {
        if self.flags.is_empty() {
            return !self.need_flags;
        }
        self.flags[slot + 1].load(Ordering::Acquire)
    }

    pub(crate) fn set_used(&self, slot: usize) {
        if !self.need_flags {
            return;
        }
        // Could be set simultaneously from different threads.
        self.flags[slot + 1].store(true, Ordering::Relaxed);
    }

    /// At-most-one winner across all probers for this slot.
    pub(crate) fn set_used_once(&self, slot: usize) -> bool {
        if !self.need_flags {
            return true;
        }
        let flag = &self.flags[slot + 1];
        // Fast check to avoid the CAS on already-claimed slots.
        if flag.load(Ordering::Relaxed) {
            return false;
        }
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}
