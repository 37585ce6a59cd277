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
pub(crate) const NO_LINK: u32 = u32::MAX;

/// Back-reference into the stored build chunk list. Row indices are 32-bit
/// for cell memory efficiency; build chunks larger than that are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRef {
    pub block: u32,
    pub row: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RowRefLink {
    row: RowRef,
    next: u32,
}

/// Append-only arena holding the tail links of every [`RowRefList`] chain.
pub(crate) struct RowRefArena {
    links: Vec<RowRefLink>,
}

impl RowRefArena {
    pub(crate) fn new() -> Self {
        Self { links: Vec::new() }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.links.capacity() * std::mem::size_of::<RowRefLink>()
    }

    fn alloc(&mut self, row: RowRef) -> Result<u32, String> {
        let index =
            u32::try_from(self.links.len()).map_err(|_| "row ref arena overflow".to_string())?;
        if index == NO_LINK {
            return Err("row ref arena overflow".to_string());
        }
        self.links.push(RowRefLink { row, next: NO_LINK });
        Ok(index)
    }
}

/// Chain of build rows sharing one key. The head is embedded in the table
/// payload; tail links live in the arena. Appending at the tail preserves
/// encounter order.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowRefList {
    head: RowRef,
    first: u32,
    last: u32,
}

impl RowRefList {
    pub(crate) fn new(head: RowRef) -> Self {
        Self {
            head,
            first: NO_LINK,
            last: NO_LINK,
        }
    }

    pub(crate) fn push(&mut self, arena: &mut RowRefArena, row: RowRef) -> Result<(), String> {
        let link = arena.alloc(row)?;
        if self.first == NO_LINK {
            self.first = link;
        } else {
            let last = self
                .last
                .try_into()
                .ok()
                .and_then(|idx: usize| arena.links.get_mut(idx))
                .ok_or_else(|| "row ref chain link out of bounds".to_string())?;
            last.next = link;
        }
        self.last = link;
        Ok(())
    }

    pub(crate) fn iter<'a>(&self, arena: &'a RowRefArena) -> RowRefListIter<'a> {
        RowRefListIter {
            arena,
            head: Some(self.head),
            next: self.first,
        }
    }
}

pub(crate) struct RowRefListIter<'a> {
    arena: &'a RowRefArena,
    head: Option<RowRef>,
    next: u32,
}

impl<'a> Iterator for RowRefListIter<'a> {
    type Item = RowRef;

    fn next(&mut self) -> Option<RowRef> {
        if let Some(head) = self.head.take() {
            return Some(head);
        }
        if self.next == NO_LINK {
            return None;
        }
        let link = self.arena.links.get(self.next as usize)?;
        self.next = link.next;
        Some(link.row)
    }
}
